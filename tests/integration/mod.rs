// Shared fixtures for the integration tests: an in-memory web of scripted product pages
// served through fake sessions, and an SMS gateway that records what it was asked to send.

pub mod cycle_tests;
pub mod dispatch_tests;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

use stock_watcher::AppConfig;
use stock_watcher::config::TwilioConfig;
use stock_watcher::models::StockResult;
use stock_watcher::plugins::ProviderRegistry;
use stock_watcher::plugins::traits::{
    CarrierPrice, CountryPricing, DeliveryState, NumberLookup, NumberTypePrice, SmsGateway,
    StockProvider,
};
use stock_watcher::session::{PageResponse, Session, SessionHost, SessionLauncher};
use stock_watcher::utils::error::{FetchError, GatewayError, SessionError};

pub const IN_STOCK_PAGE: &str = "<html><body>in stock</body></html>";
pub const OUT_OF_STOCK_PAGE: &str = "<html><body>out of stock</body></html>";

/// Provider whose pages say plainly whether they are in stock.
pub struct KeywordProvider {
    id: String,
    base_url: String,
}

impl KeywordProvider {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            base_url: format!("https://{}.test/", id.to_lowercase()),
        }
    }
}

impl StockProvider for KeywordProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn parse(&self, page: &str) -> StockResult {
        if page.contains("out of stock") {
            StockResult::OutOfStock
        } else if page.contains("in stock") {
            StockResult::InStock
        } else {
            StockResult::error("Stock marker missing")
        }
    }
}

pub fn keyword_registry(ids: &[&str]) -> Arc<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    for id in ids {
        registry.register(Arc::new(KeywordProvider::new(id)));
    }
    Arc::new(registry)
}

pub fn product_url(provider_id: &str, path: &str) -> String {
    KeywordProvider::new(provider_id).product_url(path)
}

/// One scripted reaction to a fetch.
#[derive(Debug, Clone)]
pub enum Step {
    Page(u16, &'static str),
    Fail(FetchError),
    /// Never answers; only a timeout gets the caller out.
    Hang,
}

/// Scripted pages keyed by URL, plus instrumentation of every fetch made against them.
#[derive(Default)]
pub struct FakeWeb {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<HashMap<String, Vec<Instant>>>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeWeb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script the responses for a URL. The last step repeats once the others are used up.
    pub fn script(&self, url: &str, steps: Vec<Step>) {
        self.scripts.lock().unwrap().insert(url.to_string(), steps.into());
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn calls(&self, url: &str) -> Vec<Instant> {
        self.calls.lock().unwrap().get(url).cloned().unwrap_or_default()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().map(Vec::len).sum()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, url: &str) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap(),
            Some(steps) => steps.front().cloned().unwrap_or(Step::Page(404, "")),
            None => Step::Page(404, ""),
        }
    }
}

struct InFlight<'a>(&'a FakeWeb);

impl<'a> InFlight<'a> {
    fn enter(web: &'a FakeWeb) -> Self {
        let now = web.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        web.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(web)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Open/close bookkeeping across launcher, host and sessions.
#[derive(Default)]
pub struct SessionCounters {
    pub launched: AtomicUsize,
    pub opened: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub hosts_closed: AtomicUsize,
}

impl SessionCounters {
    pub fn all_released(&self) -> bool {
        self.opened.load(Ordering::SeqCst) == self.sessions_closed.load(Ordering::SeqCst)
            && self.launched.load(Ordering::SeqCst) == self.hosts_closed.load(Ordering::SeqCst)
    }
}

pub struct FakeLauncher {
    pub web: Arc<FakeWeb>,
    pub counters: Arc<SessionCounters>,
    open_delay: Duration,
}

impl FakeLauncher {
    pub fn new(web: Arc<FakeWeb>) -> Self {
        Self {
            web,
            counters: Arc::new(SessionCounters::default()),
            open_delay: Duration::ZERO,
        }
    }

    pub fn with_open_delay(mut self, open_delay: Duration) -> Self {
        self.open_delay = open_delay;
        self
    }
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn SessionHost>, SessionError> {
        self.counters.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeHost {
            web: Arc::clone(&self.web),
            counters: Arc::clone(&self.counters),
            open_delay: self.open_delay,
        }))
    }
}

struct FakeHost {
    web: Arc<FakeWeb>,
    counters: Arc<SessionCounters>,
    open_delay: Duration,
}

#[async_trait]
impl SessionHost for FakeHost {
    async fn open_session(&self, _provider: &dyn StockProvider) -> Result<Arc<dyn Session>, SessionError> {
        tokio::time::sleep(self.open_delay).await;
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession {
            web: Arc::clone(&self.web),
            counters: Arc::clone(&self.counters),
        }))
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.counters.hosts_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeSession {
    web: Arc<FakeWeb>,
    counters: Arc<SessionCounters>,
}

#[async_trait]
impl Session for FakeSession {
    async fn fetch(&self, url: &str) -> Result<PageResponse, FetchError> {
        self.web
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push(Instant::now());

        let _in_flight = InFlight::enter(&self.web);
        let latency = *self.web.latency.lock().unwrap();
        tokio::time::sleep(latency).await;

        match self.web.next_step(url) {
            Step::Page(status, body) => Ok(PageResponse {
                status,
                status_text: stock_watcher::session::status_text(status),
                body: body.to_string(),
            }),
            Step::Fail(error) => Err(error),
            Step::Hang => std::future::pending().await,
        }
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.counters.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Gateway with one Australian carrier at 0.01 per segment; every message bills one segment.
#[derive(Default)]
pub struct FakeGateway {
    pub sent: Mutex<Vec<(String, String)>>,
    pub lookups: AtomicUsize,
    pub fail_lookups: bool,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_lookups() -> Arc<Self> {
        Arc::new(Self {
            fail_lookups: true,
            ..Self::default()
        })
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsGateway for FakeGateway {
    async fn lookup_number(&self, _phone: &str) -> Result<NumberLookup, GatewayError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups {
            return Err(GatewayError::InvalidResponse("lookup unavailable".to_string()));
        }
        Ok(NumberLookup {
            country_code: "AU".to_string(),
            mcc: "505".to_string(),
            mnc: "01".to_string(),
        })
    }

    async fn fetch_pricing(&self, country_code: &str) -> Result<CountryPricing, GatewayError> {
        Ok(CountryPricing {
            country_code: country_code.to_string(),
            carriers: vec![CarrierPrice {
                mcc: "505".to_string(),
                mnc: "01".to_string(),
                prices: vec![NumberTypePrice {
                    number_type: "mobile".to_string(),
                    current_price: Decimal::new(1, 2),
                }],
            }],
        })
    }

    async fn send_message(&self, to: &str, body: &str) -> Result<String, GatewayError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), body.to_string()));
        Ok(format!("SM{}", sent.len()))
    }

    async fn delivery_state(&self, _message_id: &str) -> Result<DeliveryState, GatewayError> {
        Ok(DeliveryState::Final { segments: 1 })
    }
}

/// Test configuration rooted in a temp directory, with short timings.
pub fn get_test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.data.products_path = dir.join("products.toml");
    config.data.recipients_path = dir.join("recipients.toml");
    config.data.snapshot_path = dir.join("lastStockMap.json");

    config.checker.max_concurrency = 2;
    config.checker.max_attempts = 3;
    config.checker.retry_base_delay_ms = 1500;
    config.checker.attempt_timeout_ms = 1000;
    config.sessions.setup_timeout_ms = 5000;

    config.notifications.twilio = TwilioConfig {
        account_sid: "AC123".to_string(),
        api_key_sid: "SK123".to_string(),
        api_key_secret: "secret".to_string(),
        service_sid: "MG123".to_string(),
        ..TwilioConfig::default()
    };
    config.notifications.reconcile.max_polls = 3;
    config
}

pub const RECIPIENTS_TOML: &str = r#"
[recipients.alice]
phone = "+61400000001"
is_admin = true

[recipients.bob]
phone = "+61400000002"
"#;

/// Temp directory holding recipients plus the given products file.
pub fn create_test_workspace(products_toml: &str) -> (TempDir, AppConfig) {
    let dir = TempDir::new().unwrap();
    let config = get_test_config(dir.path());
    std::fs::write(&config.data.recipients_path, RECIPIENTS_TOML).unwrap();
    std::fs::write(&config.data.products_path, products_toml).unwrap();
    (dir, config)
}
