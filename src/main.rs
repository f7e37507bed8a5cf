use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use stock_watcher::config::{AppConfig, SessionMode};
use stock_watcher::plugins::ProviderRegistry;
use stock_watcher::plugins::notifiers::TwilioGateway;
use stock_watcher::session::{ChromeLauncher, HttpLauncher, SessionLauncher};
use stock_watcher::utils::logging::init_tracing;
use stock_watcher::StockScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _guard = init_tracing()?;

    info!("Starting stock watcher...");

    let config = AppConfig::from_env()?;
    let registry = Arc::new(ProviderRegistry::with_default_providers());
    info!("Watching {} providers: {}", registry.len(), registry.ids().join(", "));

    let attempt_timeout = config.checker.attempt_timeout();
    let launcher: Arc<dyn SessionLauncher> = match config.sessions.mode {
        SessionMode::Chrome => Arc::new(ChromeLauncher::new(config.sessions.clone(), attempt_timeout)),
        SessionMode::Http => Arc::new(HttpLauncher::new(config.sessions.user_agent.clone(), attempt_timeout)),
    };
    let gateway = Arc::new(TwilioGateway::new(config.notifications.twilio.clone()));

    StockScheduler::from_config(&config, registry, launcher, gateway)
        .run()
        .await;

    Ok(())
}
