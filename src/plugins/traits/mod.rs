pub mod provider;
pub mod notifier;

pub use provider::{StockProvider, product_url};
pub use notifier::{
    CarrierPrice, CountryPricing, DeliveryState, NumberLookup, NumberTypePrice, SmsGateway,
};
#[cfg(test)]
pub use notifier::MockSmsGateway;
