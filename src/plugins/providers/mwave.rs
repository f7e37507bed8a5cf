use scraper::Html;

use super::{available_if, contains, into_result, select_one, Classification};
use crate::models::StockResult;
use crate::plugins::traits::StockProvider;

pub struct MwaveProvider;

impl MwaveProvider {
    fn classify(&self, page: &str) -> Classification {
        let document = Html::parse_document(page);
        let add_to_cart = select_one(
            document.root_element(),
            ".divAddCart .addToCarts",
            "'Add to cart' section missing",
            "Multiple 'Add to cart' sections found",
        )?;

        Ok(available_if(contains(add_to_cart, "button")?))
    }
}

impl StockProvider for MwaveProvider {
    fn id(&self) -> &str {
        "MWAVE"
    }

    fn name(&self) -> &str {
        "Mwave"
    }

    fn base_url(&self) -> &str {
        "https://www.mwave.com.au/"
    }

    fn parse(&self, page: &str) -> StockResult {
        into_result(self.classify(page))
    }
}
