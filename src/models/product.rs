use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A watched product on one retailer.
///
/// Identity is the `(provider, url)` pair, see [`ProductKey`]. Two catalog entries with the
/// same pair are the same product as far as checks and snapshots are concerned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub name: String,
    #[serde(rename = "provider")]
    pub provider_id: String,
    /// Path relative to the provider's base address.
    #[serde(rename = "url")]
    pub url_path: String,
    #[serde(default)]
    pub watchers: BTreeSet<String>,
}

impl Product {
    pub fn new(
        name: impl Into<String>,
        provider_id: impl Into<String>,
        url_path: impl Into<String>,
        watchers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            provider_id: provider_id.into(),
            url_path: url_path.into(),
            watchers: watchers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn key(&self) -> ProductKey {
        ProductKey {
            url: self.url_path.clone(),
            provider: self.provider_id.clone(),
        }
    }
}

/// Collapse entries sharing a [`ProductKey`] into the first one, which keeps its name and
/// gains the watchers of the others. Catalog order is otherwise preserved.
pub fn merge_duplicates(products: impl IntoIterator<Item = Product>) -> Vec<Product> {
    let mut merged: Vec<Product> = Vec::new();
    let mut index: HashMap<ProductKey, usize> = HashMap::new();
    for product in products {
        match index.get(&product.key()) {
            Some(&at) => {
                tracing::warn!(
                    "Product '{}' duplicates '{}' at {}, merging watchers",
                    product.name,
                    merged[at].name,
                    product.key()
                );
                merged[at].watchers.extend(product.watchers);
            }
            None => {
                index.insert(product.key(), merged.len());
                merged.push(product);
            }
        }
    }
    merged
}

/// Composite product identity used for every lookup: report entries, snapshot entries and
/// the persisted file keys.
///
/// Field order matters: the canonical form is the compact JSON object `{"url":..,"provider":..}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductKey {
    pub url: String,
    pub provider: String,
}

impl ProductKey {
    pub fn new(provider: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            provider: provider.into(),
        }
    }

    pub fn to_canonical(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_canonical(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl std::fmt::Display for ProductKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.provider, self.url)
    }
}
