use futures::{StreamExt, TryStreamExt, stream};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CheckerConfig;
use crate::models::{Product, ProductKey, StockResult, StockStatus};
use crate::plugins::manager::{ProviderRegistry, StockProviderRef};
use crate::retry::RetryPolicy;
use crate::session::{Session, SessionSet};
use crate::utils::error::{CheckError, FetchError};

/// Outcome of one check pass, keyed by product identity.
///
/// Products that could not be checked at all (unknown provider, no session) have no entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockReport {
    results: HashMap<ProductKey, StockResult>,
}

impl StockReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ProductKey, result: StockResult) {
        self.results.insert(key, result);
    }

    pub fn get(&self, key: &ProductKey) -> Option<&StockResult> {
        self.results.get(key)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProductKey, &StockResult)> {
        self.results.iter()
    }

    pub fn summary(&self) -> StockSummary {
        let mut summary = StockSummary::default();
        for result in self.results.values() {
            match result.status() {
                Some(StockStatus::InStock) => summary.in_stock += 1,
                Some(StockStatus::OutOfStock) => summary.out_of_stock += 1,
                None => summary.errors += 1,
            }
        }
        summary
    }
}

impl FromIterator<(ProductKey, StockResult)> for StockReport {
    fn from_iter<I: IntoIterator<Item = (ProductKey, StockResult)>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StockSummary {
    pub in_stock: usize,
    pub out_of_stock: usize,
    pub errors: usize,
}

impl fmt::Display for StockSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors == 0 {
            return write!(f, "{} in stock and {} out of stock", self.in_stock, self.out_of_stock);
        }
        write!(
            f,
            "{} in stock, {} out of stock and {} {}",
            self.in_stock,
            self.out_of_stock,
            self.errors,
            if self.errors == 1 { "error" } else { "errors" }
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CheckSettings {
    /// Providers checked at the same time. Products of one provider share a session and run
    /// one after another.
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
    pub attempt_timeout: Duration,
}

impl From<&CheckerConfig> for CheckSettings {
    fn from(config: &CheckerConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            retry: RetryPolicy::new(config.max_attempts, config.retry_base_delay()),
            attempt_timeout: config.attempt_timeout(),
        }
    }
}

pub struct StockChecker {
    registry: Arc<ProviderRegistry>,
    settings: CheckSettings,
}

impl StockChecker {
    pub fn new(registry: Arc<ProviderRegistry>, settings: CheckSettings) -> Self {
        Self { registry, settings }
    }

    pub fn settings(&self) -> &CheckSettings {
        &self.settings
    }

    /// Check every product through its provider's session.
    ///
    /// Per-product failures end up as `ERROR` entries in the report. Losing a session aborts
    /// the whole pass, cancelling the providers still in flight.
    pub async fn check(&self, products: &[Product], sessions: &SessionSet) -> Result<StockReport, CheckError> {
        let mut groups: BTreeMap<&str, Vec<&Product>> = BTreeMap::new();
        let mut seen = HashSet::new();
        for product in products {
            // One fetch per key; the report is keyed the same way.
            if seen.insert(product.key()) {
                groups.entry(product.provider_id.as_str()).or_default().push(product);
            }
        }

        let mut jobs = Vec::with_capacity(groups.len());
        for (provider_id, group) in groups {
            let Some(provider) = self.registry.get(provider_id) else {
                tracing::warn!("Unknown provider {}, skipping {} products", provider_id, group.len());
                continue;
            };
            let Some(session) = sessions.get(provider_id) else {
                tracing::warn!("No session open for {}, skipping {} products", provider_id, group.len());
                continue;
            };
            jobs.push((Arc::clone(provider), session, group));
        }

        tracing::info!("Checking {} products across {} providers", products.len(), jobs.len());

        let checked: Vec<Vec<(ProductKey, StockResult)>> = stream::iter(
            jobs.into_iter()
                .map(|(provider, session, group)| self.check_provider(provider, session, group)),
        )
        .buffer_unordered(self.settings.max_concurrency.max(1))
        .try_collect()
        .await?;

        Ok(checked.into_iter().flatten().collect())
    }

    async fn check_provider(
        &self,
        provider: StockProviderRef,
        session: Arc<dyn Session>,
        products: Vec<&Product>,
    ) -> Result<Vec<(ProductKey, StockResult)>, CheckError> {
        let mut results = Vec::with_capacity(products.len());
        for product in products {
            let result = self.check_product(&provider, session.as_ref(), product).await?;
            results.push((product.key(), result));
        }
        Ok(results)
    }

    async fn check_product(
        &self,
        provider: &StockProviderRef,
        session: &dyn Session,
        product: &Product,
    ) -> Result<StockResult, CheckError> {
        let url = provider.product_url(&product.url_path);
        let attempt_timeout = self.settings.attempt_timeout;
        let timeout_ms = attempt_timeout.as_millis() as u64;

        let outcome = self
            .settings
            .retry
            .run(
                || fetch_page(session, &url, attempt_timeout, timeout_ms),
                |error: &FetchError| {
                    tracing::debug!("Attempt for {} at {} failed: {}", product.name, provider.id(), error);
                    error.is_retryable()
                },
            )
            .await;

        match outcome {
            Ok(body) => Ok(provider.parse(&body)),
            Err(FetchError::SessionLost(message)) => Err(CheckError::SessionLost {
                provider: provider.id().to_string(),
                message,
            }),
            Err(error) => {
                tracing::debug!("Giving up on {} at {}: {}", product.name, provider.id(), error);
                Ok(StockResult::error(error.to_string()))
            }
        }
    }
}

/// One attempt: load the page within the timeout and insist on a success status.
async fn fetch_page(
    session: &dyn Session,
    url: &str,
    attempt_timeout: Duration,
    timeout_ms: u64,
) -> Result<String, FetchError> {
    let page = tokio::time::timeout(attempt_timeout, session.fetch(url))
        .await
        .map_err(|_| FetchError::Timeout { timeout_ms })??;

    if !page.is_success() {
        return Err(FetchError::Status {
            code: page.status,
            text: page.status_text,
        });
    }
    Ok(page.body)
}
