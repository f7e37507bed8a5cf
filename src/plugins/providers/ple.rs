use scraper::Html;

use super::{available_if, contains, into_result, select, select_one, Classification};
use crate::models::StockResult;
use crate::plugins::traits::StockProvider;

pub struct PleProvider;

impl PleProvider {
    fn classify(&self, page: &str) -> Classification {
        let document = Html::parse_document(page);
        let container = select_one(
            document.root_element(),
            ".availabilityContainerWrapper",
            "Availability container missing",
            "Multiple availability containers found",
        )?;

        if select(container, ".viewItemStoreAvailability")?.is_empty() {
            return Err("Availability information missing".to_string());
        }

        // Stores without stock are greyed out; any store not greyed out has it.
        Ok(available_if(contains(
            container,
            ".viewItemStoreAvailability:not(.viewItemDarkGrayText)",
        )?))
    }
}

impl StockProvider for PleProvider {
    fn id(&self) -> &str {
        "PLE"
    }

    fn name(&self) -> &str {
        "PLE Computers"
    }

    fn base_url(&self) -> &str {
        "https://www.ple.com.au/"
    }

    fn parse(&self, page: &str) -> StockResult {
        into_result(self.classify(page))
    }
}
