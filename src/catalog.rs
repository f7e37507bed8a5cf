use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::{Product, Recipients, merge_duplicates};
use crate::utils::error::Result;

#[derive(Debug, Deserialize)]
struct ProductsFile {
    #[serde(default)]
    products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
struct RecipientsFile {
    #[serde(default)]
    recipients: Recipients,
}

/// Product and recipient files, re-read whenever they are needed so edits apply without a
/// restart.
#[derive(Debug, Clone)]
pub struct Catalog {
    products_path: PathBuf,
    recipients_path: PathBuf,
}

impl Catalog {
    pub fn new(products_path: impl Into<PathBuf>, recipients_path: impl Into<PathBuf>) -> Self {
        Self {
            products_path: products_path.into(),
            recipients_path: recipients_path.into(),
        }
    }

    pub async fn products(&self) -> Result<Vec<Product>> {
        let file: ProductsFile = read_toml(&self.products_path).await?;
        tracing::debug!("Loaded {} products from {}", file.products.len(), self.products_path.display());
        Ok(merge_duplicates(file.products))
    }

    pub async fn recipients(&self) -> Result<Recipients> {
        let file: RecipientsFile = read_toml(&self.recipients_path).await?;
        tracing::debug!("Loaded {} recipients from {}", file.recipients.len(), self.recipients_path.display());
        Ok(file.recipients)
    }
}

async fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(toml::from_str(&raw)?)
}
