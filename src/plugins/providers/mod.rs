//! Built-in retailer classifiers.
//!
//! Every classifier follows the same rule: find the page's key element, refuse to guess when it
//! is missing or duplicated, then read availability off it.

pub mod bpc_tech;
pub mod mwave;
pub mod pc_case_gear;
pub mod ple;
pub mod scorptec;
pub mod umart;

pub use bpc_tech::BpcTechProvider;
pub use mwave::MwaveProvider;
pub use pc_case_gear::PcCaseGearProvider;
pub use ple::PleProvider;
pub use scorptec::ScorptecProvider;
pub use umart::UmartProvider;

use scraper::{ElementRef, Selector};

use crate::models::{StockResult, StockStatus};

/// Page classification: a known status, or a description of why the page could not be read.
type Classification = Result<StockStatus, String>;

fn into_result(classification: Classification) -> StockResult {
    match classification {
        Ok(status) => status.into(),
        Err(message) => StockResult::error(message),
    }
}

fn select<'a>(scope: ElementRef<'a>, css: &str) -> Result<Vec<ElementRef<'a>>, String> {
    let selector =
        Selector::parse(css).map_err(|e| format!("Invalid selector '{}': {:?}", css, e))?;
    Ok(scope.select(&selector).collect())
}

/// The single element matching `css`, or the matching error message.
fn select_one<'a>(
    scope: ElementRef<'a>,
    css: &str,
    missing: &str,
    multiple: &str,
) -> Result<ElementRef<'a>, String> {
    let mut elements = select(scope, css)?;
    match elements.len() {
        0 => Err(missing.to_string()),
        1 => Ok(elements.remove(0)),
        _ => Err(multiple.to_string()),
    }
}

fn contains(scope: ElementRef<'_>, css: &str) -> Result<bool, String> {
    Ok(!select(scope, css)?.is_empty())
}

fn available_if(in_stock: bool) -> StockStatus {
    if in_stock {
        StockStatus::InStock
    } else {
        StockStatus::OutOfStock
    }
}
