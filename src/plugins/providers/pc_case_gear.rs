use scraper::Html;

use super::{available_if, into_result, select_one, Classification};
use crate::models::StockResult;
use crate::plugins::traits::StockProvider;

pub struct PcCaseGearProvider;

impl PcCaseGearProvider {
    fn classify(&self, page: &str) -> Classification {
        let document = Html::parse_document(page);
        let button = select_one(
            document.root_element(),
            "button.add-to-cart",
            "'Add to cart' button missing",
            "Multiple 'Add to cart' buttons found",
        )?;

        Ok(available_if(button.value().attr("disabled").is_none()))
    }
}

impl StockProvider for PcCaseGearProvider {
    fn id(&self) -> &str {
        "PC_CASE_GEAR"
    }

    fn name(&self) -> &str {
        "PC Case Gear"
    }

    fn base_url(&self) -> &str {
        "https://www.pccasegear.com/"
    }

    fn parse(&self, page: &str) -> StockResult {
        into_result(self.classify(page))
    }
}
