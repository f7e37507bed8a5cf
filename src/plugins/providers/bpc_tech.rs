use scraper::Html;

use super::{available_if, into_result, select_one, Classification};
use crate::models::StockResult;
use crate::plugins::traits::StockProvider;

pub struct BpcTechProvider;

impl BpcTechProvider {
    fn classify(&self, page: &str) -> Classification {
        let document = Html::parse_document(page);
        let status = select_one(
            document.root_element(),
            ".productStockStatus",
            "Product stock status missing",
            "Multiple product stock statuses found",
        )?;

        Ok(available_if(
            status.value().classes().any(|class| class == "stockInBPCT"),
        ))
    }
}

impl StockProvider for BpcTechProvider {
    fn id(&self) -> &str {
        "BPC_TECH"
    }

    fn name(&self) -> &str {
        "BPC Tech"
    }

    fn base_url(&self) -> &str {
        "https://www.bpctech.com.au/"
    }

    fn parse(&self, page: &str) -> StockResult {
        into_result(self.classify(page))
    }
}
