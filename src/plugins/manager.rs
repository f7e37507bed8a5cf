use std::collections::HashMap;
use std::sync::Arc;

use super::providers::{
    BpcTechProvider, MwaveProvider, PcCaseGearProvider, PleProvider, ScorptecProvider,
    UmartProvider,
};
use super::traits::StockProvider;

pub type StockProviderRef = Arc<dyn StockProvider>;

/// Provider id -> provider definition.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, StockProviderRef>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Registry holding every built-in retailer.
    pub fn with_default_providers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ScorptecProvider));
        registry.register(Arc::new(MwaveProvider));
        registry.register(Arc::new(PcCaseGearProvider));
        registry.register(Arc::new(PleProvider));
        registry.register(Arc::new(UmartProvider));
        registry.register(Arc::new(BpcTechProvider));
        registry
    }

    /// Register a provider, replacing any existing one with the same id
    pub fn register(&mut self, provider: StockProviderRef) {
        let id = provider.id().to_string();
        if self.providers.insert(id.clone(), provider).is_some() {
            tracing::warn!("Replaced existing provider definition for {}", id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&StockProviderRef> {
        self.providers.get(id)
    }

    pub fn has_provider(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Provider ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Display name for a provider, falling back to the raw id for unknown providers.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.providers.get(id).map(|p| p.name()).unwrap_or(id)
    }

    /// Full product page address, or the bare path when the provider is unknown.
    pub fn product_url(&self, provider_id: &str, url_path: &str) -> String {
        match self.providers.get(provider_id) {
            Some(provider) => provider.product_url(url_path),
            None => url_path.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
