use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub checker: CheckerConfig,
    pub sessions: SessionConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub products_path: PathBuf,
    pub recipients_path: PathBuf,
    pub snapshot_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            products_path: PathBuf::from("data/products.toml"),
            recipients_path: PathBuf::from("data/recipients.toml"),
            snapshot_path: PathBuf::from("data/lastStockMap.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    pub max_concurrency: usize,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub attempt_timeout_ms: u64,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_attempts: 3,
            retry_base_delay_ms: 1500,
            attempt_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// One headless Chrome tab per provider.
    Chrome,
    /// Plain HTTP with a browser-like header set per provider.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: SessionMode,
    pub setup_timeout_ms: u64,
    pub chrome_path: Option<String>,
    pub chrome_args: Vec<String>,
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::Chrome,
            setup_timeout_ms: 5000,
            chrome_path: None,
            chrome_args: vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-gpu".to_string(),
            ],
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub min_recheck_secs: u64,
    pub max_recheck_secs: u64,
    pub alert_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_recheck_secs: 3 * 60,
            max_recheck_secs: 10 * 60,
            alert_interval_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub twilio: TwilioConfig,
    pub max_concurrency: usize,
    pub reconcile: ReconcileConfig,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            twilio: TwilioConfig::default(),
            max_concurrency: 4,
            reconcile: ReconcileConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub api_key_sid: String,
    pub api_key_secret: String,
    /// Messaging service used as the sender.
    pub service_sid: String,
    pub api_base_url: String,
    pub lookups_base_url: String,
    pub pricing_base_url: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            api_key_sid: String::new(),
            api_key_secret: String::new(),
            service_sid: String::new(),
            api_base_url: "https://api.twilio.com".to_string(),
            lookups_base_url: "https://lookups.twilio.com".to_string(),
            pricing_base_url: "https://pricing.twilio.com".to_string(),
        }
    }
}

/// Bounds on delivery-cost polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub max_polls: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_polls: 12,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
        }
    }
}

impl CheckerConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "STOCK_WATCHER_"
            .add_source(Environment::with_prefix("STOCK_WATCHER").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Add Chrome path from environment if not set
        if config.sessions.chrome_path.is_none() {
            config.sessions.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate checker configuration
        if self.checker.max_concurrency == 0 {
            return Err(ConfigError::Message("Checker max_concurrency must be greater than 0".into()));
        }

        if self.checker.max_attempts == 0 {
            return Err(ConfigError::Message("Checker max_attempts must be greater than 0".into()));
        }

        if self.checker.attempt_timeout_ms == 0 {
            return Err(ConfigError::Message("Checker attempt_timeout_ms must be greater than 0".into()));
        }

        // Validate session configuration
        if self.sessions.setup_timeout_ms == 0 {
            return Err(ConfigError::Message("Session setup_timeout_ms must be greater than 0".into()));
        }

        // Validate scheduler configuration
        if self.scheduler.min_recheck_secs > self.scheduler.max_recheck_secs {
            return Err(ConfigError::Message("Scheduler min_recheck_secs cannot exceed max_recheck_secs".into()));
        }

        if self.scheduler.alert_interval_secs == 0 {
            return Err(ConfigError::Message("Scheduler alert_interval_secs must be greater than 0".into()));
        }

        // Validate notification configuration
        let twilio = &self.notifications.twilio;
        if twilio.account_sid.is_empty()
            || twilio.api_key_sid.is_empty()
            || twilio.api_key_secret.is_empty()
            || twilio.service_sid.is_empty()
        {
            return Err(ConfigError::Message("Twilio account_sid, api_key_sid, api_key_secret and service_sid are required".into()));
        }

        for base_url in [&twilio.api_base_url, &twilio.lookups_base_url, &twilio.pricing_base_url] {
            if Url::parse(base_url).is_err() {
                return Err(ConfigError::Message(format!("Invalid Twilio base URL: {}", base_url)));
            }
        }

        if self.notifications.max_concurrency == 0 {
            return Err(ConfigError::Message("Notifications max_concurrency must be greater than 0".into()));
        }

        if self.notifications.reconcile.max_polls == 0 {
            return Err(ConfigError::Message("Reconcile max_polls must be greater than 0".into()));
        }

        Ok(())
    }
}
