pub mod traits;
pub mod manager;
pub mod providers;
pub mod notifiers;

pub use manager::ProviderRegistry;
pub use traits::{SmsGateway, StockProvider};
