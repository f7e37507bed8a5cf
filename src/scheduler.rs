use rand::Rng;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

use crate::catalog::Catalog;
use crate::checker::{CheckSettings, StockChecker, StockSummary};
use crate::config::{AppConfig, SchedulerConfig};
use crate::diff::{StockDiff, diff};
use crate::dispatcher::{DispatchReport, NotificationDispatcher};
use crate::models::{Product, RecipientMessage, admin_ids};
use crate::plugins::manager::{ProviderRegistry, StockProviderRef};
use crate::plugins::traits::SmsGateway;
use crate::session::{SessionLauncher, SessionManager};
use crate::snapshot::SnapshotStore;
use crate::utils::error::Result;

/// What a completed cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub summary: StockSummary,
    pub messages: usize,
    pub error_delta: u32,
    /// `None` when nothing needed sending or the dispatch failed.
    pub dispatch: Option<DispatchReport>,
}

/// Drives check cycles and the hourly error alert. The rolling error counter lives here and
/// is only touched from the scheduler's own task.
pub struct StockScheduler {
    catalog: Catalog,
    snapshots: SnapshotStore,
    registry: Arc<ProviderRegistry>,
    sessions: SessionManager,
    checker: StockChecker,
    dispatcher: NotificationDispatcher,
    config: SchedulerConfig,
    errors_in_last_hour: u32,
}

impl StockScheduler {
    pub fn from_config(
        config: &AppConfig,
        registry: Arc<ProviderRegistry>,
        launcher: Arc<dyn SessionLauncher>,
        gateway: Arc<dyn SmsGateway>,
    ) -> Self {
        Self {
            catalog: Catalog::new(&config.data.products_path, &config.data.recipients_path),
            snapshots: SnapshotStore::new(&config.data.snapshot_path),
            sessions: SessionManager::new(launcher, Duration::from_millis(config.sessions.setup_timeout_ms)),
            checker: StockChecker::new(Arc::clone(&registry), CheckSettings::from(&config.checker)),
            dispatcher: NotificationDispatcher::new(gateway, &config.notifications),
            registry,
            config: config.scheduler.clone(),
            errors_in_last_hour: 0,
        }
    }

    pub fn errors_in_last_hour(&self) -> u32 {
        self.errors_in_last_hour
    }

    /// Run forever: a cycle now, then one after every jittered delay, with the error alert
    /// flushed on its own interval in between.
    pub async fn run(mut self) {
        let mut alerts = tokio::time::interval(Duration::from_secs(self.config.alert_interval_secs));
        alerts.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let next_cycle = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(next_cycle);

        loop {
            tokio::select! {
                _ = &mut next_cycle => {
                    // Failures are logged and counted inside; the loop always reschedules.
                    let _ = self.run_cycle().await;

                    let delay = self.next_delay();
                    tracing::info!("Scheduling stock recheck in {}", format_delay(delay));
                    next_cycle.as_mut().reset(Instant::now() + delay);
                }
                _ = alerts.tick() => {
                    if let Err(e) = self.flush_error_alert().await {
                        tracing::error!("Failed to send error alert: {}", e);
                    }
                }
            }
        }
    }

    /// One full cycle. Any error here aborts the cycle before the snapshot is written or
    /// anyone is notified, and counts once against the error budget.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        tracing::info!("Starting stock check cycle");
        match self.check_cycle().await {
            Ok(report) => {
                tracing::info!(
                    "Stock check cycle complete: {} messages, {} errors in the last hour",
                    report.messages,
                    self.errors_in_last_hour
                );
                Ok(report)
            }
            Err(e) => {
                self.errors_in_last_hour += 1;
                tracing::error!("Unexpected error during stock check cycle: {}", e);
                Err(e)
            }
        }
    }

    async fn check_cycle(&mut self) -> Result<CycleReport> {
        let recipients = self.catalog.recipients().await?;
        let products = self.catalog.products().await?;
        let mut previous = self.snapshots.load().await?;
        previous.retain_catalog(&products);

        let providers = self.providers_for(&products);
        let sessions = self.sessions.acquire_all(&providers).await?;
        let checked = self.checker.check(&products, &sessions).await;
        sessions.release_all().await;
        let report = checked?;

        let summary = report.summary();
        tracing::info!("Current product stock status: {}", summary);

        let StockDiff {
            next,
            messages,
            error_delta,
        } = diff(&previous, &products, &report, &self.registry);
        self.errors_in_last_hour += error_delta;

        self.snapshots.persist(&next).await?;

        let message_count = messages.len();
        let dispatch = if messages.is_empty() {
            None
        } else {
            match self.dispatcher.dispatch(&recipients, messages).await {
                Ok(dispatched) => {
                    self.errors_in_last_hour += (dispatched.failed + dispatched.unresolved) as u32;
                    Some(dispatched)
                }
                Err(e) => {
                    self.errors_in_last_hour += 1;
                    tracing::error!("Failed to notify recipients: {}", e);
                    None
                }
            }
        };

        Ok(CycleReport {
            summary,
            messages: message_count,
            error_delta,
            dispatch,
        })
    }

    /// Known providers the catalog refers to, each once.
    fn providers_for(&self, products: &[Product]) -> Vec<StockProviderRef> {
        let ids: BTreeSet<&str> = products.iter().map(|product| product.provider_id.as_str()).collect();
        ids.into_iter()
            .filter_map(|id| self.registry.get(id).cloned())
            .collect()
    }

    /// Tell the admins how many errors piled up since the last flush. The counter is only
    /// cleared once the alert went out, so a failed alert is retried next time.
    pub async fn flush_error_alert(&mut self) -> Result<Option<DispatchReport>> {
        let errors = self.errors_in_last_hour;
        if errors == 0 {
            return Ok(None);
        }

        tracing::warn!(
            "Sending alert notification as there {} been {} {} in the last hour",
            if errors == 1 { "has" } else { "have" },
            errors,
            if errors == 1 { "error" } else { "errors" }
        );

        let recipients = self.catalog.recipients().await?;
        let text = alert_text(errors);
        let messages: Vec<RecipientMessage> = admin_ids(&recipients)
            .into_iter()
            .map(|admin| RecipientMessage::new(admin, text.clone()))
            .collect();

        let report = self.dispatcher.dispatch(&recipients, messages).await?;
        self.errors_in_last_hour = 0;
        Ok(Some(report))
    }

    /// Uniformly drawn from the configured recheck window.
    pub fn next_delay(&self) -> Duration {
        let min = self.config.min_recheck_secs.saturating_mul(1000);
        let max = self.config.max_recheck_secs.saturating_mul(1000);
        Duration::from_millis(rand::rng().random_range(min..=max.max(min)))
    }
}

pub fn alert_text(errors: u32) -> String {
    format!(
        "⚠️ There {} been {} {} in the last hour checking stocks. Please investigate.",
        if errors == 1 { "has" } else { "have" },
        errors,
        if errors == 1 { "error" } else { "errors" }
    )
}

/// `"4m 7s"`
pub fn format_delay(delay: Duration) -> String {
    let secs = delay.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}
