//! Compares a check report against the previous snapshot and decides who hears about it.

use crate::checker::StockReport;
use crate::models::{Product, RecipientMessage, StockResult, StockStatus, merge_duplicates};
use crate::plugins::manager::ProviderRegistry;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockDiff {
    pub next: Snapshot,
    pub messages: Vec<RecipientMessage>,
    /// Products that errored or are missing from the report.
    pub error_delta: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    BackInStock,
    OutOfStock,
}

fn transition(previous: Option<StockStatus>, current: StockStatus) -> Option<Transition> {
    match (previous, current) {
        (None | Some(StockStatus::OutOfStock), StockStatus::InStock) => Some(Transition::BackInStock),
        (Some(StockStatus::InStock), StockStatus::OutOfStock) => Some(Transition::OutOfStock),
        _ => None,
    }
}

fn message_text(transition: Transition, product: &Product, provider_name: &str, url: &str) -> String {
    match transition {
        Transition::BackInStock => format!(
            "🎉 {} from {} is now back in stock!\n{}",
            product.name, provider_name, url
        ),
        Transition::OutOfStock => format!(
            "😞 {} from {} has gone out of stock!\n{}",
            product.name, provider_name, url
        ),
    }
}

/// Single sequential pass over the catalog. `previous` is never modified; the returned
/// snapshot starts as a copy of it. Entries sharing a key are judged once, for the union of
/// their watchers.
pub fn diff(previous: &Snapshot, products: &[Product], report: &StockReport, registry: &ProviderRegistry) -> StockDiff {
    let mut result = StockDiff {
        next: previous.clone(),
        ..StockDiff::default()
    };

    for product in &merge_duplicates(products.iter().cloned()) {
        let key = product.key();
        let status = match report.get(&key) {
            None => {
                tracing::error!(
                    "Missing product '{}' from provider {} in stock report",
                    product.name,
                    product.provider_id
                );
                result.error_delta += 1;
                continue;
            }
            Some(StockResult::Error { message }) => {
                match message {
                    Some(message) => tracing::warn!(
                        "Failed to check stock for product '{}' from provider {}: {}",
                        product.name,
                        product.provider_id,
                        message
                    ),
                    None => tracing::warn!(
                        "Failed to check stock for product '{}' from provider {}",
                        product.name,
                        product.provider_id
                    ),
                }
                result.error_delta += 1;
                continue;
            }
            Some(StockResult::InStock) => StockStatus::InStock,
            Some(StockResult::OutOfStock) => StockStatus::OutOfStock,
        };

        if let Some(transition) = transition(previous.get(&key), status) {
            let provider_name = registry.display_name(&product.provider_id);
            let url = registry.product_url(&product.provider_id, &product.url_path);
            let text = message_text(transition, product, &provider_name, &url);

            tracing::info!("{} at {} changed: {:?}", product.name, product.provider_id, transition);
            result.messages.extend(
                product
                    .watchers
                    .iter()
                    .map(|watcher| RecipientMessage::new(watcher.clone(), text.clone())),
            );
        }

        result.next.set(key, status);
    }

    result
}
