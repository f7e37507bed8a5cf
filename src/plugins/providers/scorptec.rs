use scraper::Html;

use super::{available_if, contains, into_result, select_one, Classification};
use crate::models::StockResult;
use crate::plugins::traits::StockProvider;

pub struct ScorptecProvider;

impl ScorptecProvider {
    fn classify(&self, page: &str) -> Classification {
        let document = Html::parse_document(page);
        let add_to_cart = select_one(
            document.root_element(),
            "#price-addcart",
            "'Add to cart' button missing",
            "Multiple 'Add to cart' buttons found",
        )?;

        // The block keeps its id when sold out but loses the purchase link.
        Ok(available_if(contains(add_to_cart, "a")?))
    }
}

impl StockProvider for ScorptecProvider {
    fn id(&self) -> &str {
        "SCORPTEC"
    }

    fn name(&self) -> &str {
        "Scorptec"
    }

    fn base_url(&self) -> &str {
        "https://www.scorptec.com.au/"
    }

    fn parse(&self, page: &str) -> StockResult {
        into_result(self.classify(page))
    }
}
