use scraper::Html;

use super::{into_result, select, Classification};
use crate::models::{StockResult, StockStatus};
use crate::plugins::traits::StockProvider;

pub struct UmartProvider;

impl UmartProvider {
    fn classify(&self, page: &str) -> Classification {
        let document = Html::parse_document(page);
        let root = document.root_element();

        let add_to_cart = select(root, "form .goods_info .addtocart_btn:not(.lmn)")?;
        match add_to_cart.len() {
            0 => {}
            1 => return Ok(StockStatus::InStock),
            _ => return Err("Multiple 'Add to cart' buttons found".to_string()),
        }

        // Sold out pages swap the cart button for a "Let me know" button.
        let let_me_know = select(root, "form .goods_info .addtocart_btn.lmn")?;
        match let_me_know.len() {
            0 => Err("Checkout buttons missing".to_string()),
            1 => Ok(StockStatus::OutOfStock),
            _ => Err("Multiple 'Let me know' buttons found".to_string()),
        }
    }
}

impl StockProvider for UmartProvider {
    fn id(&self) -> &str {
        "UMART"
    }

    fn name(&self) -> &str {
        "Umart"
    }

    fn base_url(&self) -> &str {
        "https://www.umart.com.au/"
    }

    fn parse(&self, page: &str) -> StockResult {
        into_result(self.classify(page))
    }
}
