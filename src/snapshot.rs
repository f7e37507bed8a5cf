use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::models::{Product, ProductKey, StockStatus};
use crate::utils::error::Result;

/// Last known good status per product. Only definite statuses are representable, so an error
/// result can never be recorded here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: HashMap<ProductKey, StockStatus>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ProductKey) -> Option<StockStatus> {
        self.entries.get(key).copied()
    }

    pub fn set(&mut self, key: ProductKey, status: StockStatus) {
        self.entries.insert(key, status);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProductKey, &StockStatus)> {
        self.entries.iter()
    }

    /// Drop entries for products no longer in the catalog.
    pub fn retain_catalog(&mut self, products: &[Product]) {
        let live: HashSet<ProductKey> = products.iter().map(Product::key).collect();
        self.entries.retain(|key, _| live.contains(key));
    }
}

impl FromIterator<(ProductKey, StockStatus)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (ProductKey, StockStatus)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// JSON file holding the snapshot between cycles.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. A missing or unreadable file is an empty snapshot; malformed entries
    /// are skipped.
    pub async fn load(&self) -> Result<Snapshot> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No snapshot at {}, starting empty", self.path.display());
                return Ok(Snapshot::new());
            }
            Err(e) => return Err(e.into()),
        };

        let raw: HashMap<String, serde_json::Value> = match serde_json::from_slice(&bytes) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Ignoring invalid snapshot {}: {}", self.path.display(), e);
                return Ok(Snapshot::new());
            }
        };

        let mut snapshot = Snapshot::new();
        for (key, value) in raw {
            let entry = ProductKey::from_canonical(&key)
                .and_then(|key| serde_json::from_value::<StockStatus>(value).map(|status| (key, status)));
            match entry {
                Ok((key, status)) => snapshot.set(key, status),
                Err(e) => tracing::warn!("Skipping snapshot entry {}: {}", key, e),
            }
        }

        tracing::debug!("Loaded {} snapshot entries", snapshot.len());
        Ok(snapshot)
    }

    /// Write the snapshot atomically (temp file, then rename).
    pub async fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let mut raw = BTreeMap::new();
        for (key, status) in snapshot.iter() {
            raw.insert(key.to_canonical()?, *status);
        }
        let bytes = serde_json::to_vec(&raw)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!("Persisted {} snapshot entries to {}", snapshot.len(), self.path.display());
        Ok(())
    }
}
