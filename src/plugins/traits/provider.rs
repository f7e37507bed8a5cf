use crate::models::StockResult;

/// A retailer definition: where its product pages live and how to read stock off them.
pub trait StockProvider: Send + Sync {
    /// Plugin metadata
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn base_url(&self) -> &str;

    /// Classify a product page.
    ///
    /// Must be total: a page whose shape is ambiguous (key element missing, or present more
    /// than once) is reported as [`StockResult::Error`] with a short description, never guessed.
    fn parse(&self, page: &str) -> StockResult;

    fn product_url(&self, url_path: &str) -> String {
        product_url(self.base_url(), url_path)
    }
}

/// Join a base address and a product path with exactly one slash between them.
pub fn product_url(base_url: &str, url_path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        url_path.trim_start_matches('/')
    )
}
