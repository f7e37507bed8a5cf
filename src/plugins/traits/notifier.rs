use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::utils::error::GatewayError;

/// Carrier details for a phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberLookup {
    pub country_code: String,
    pub mcc: String,
    pub mnc: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberTypePrice {
    pub number_type: String,
    pub current_price: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CarrierPrice {
    pub mcc: String,
    pub mnc: String,
    pub prices: Vec<NumberTypePrice>,
}

/// Outbound SMS prices for one country, per carrier.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryPricing {
    pub country_code: String,
    pub carriers: Vec<CarrierPrice>,
}

impl CountryPricing {
    /// Per-segment price of sending to a mobile number on the given carrier.
    pub fn mobile_price(&self, mcc: &str, mnc: &str) -> Option<Decimal> {
        self.carriers
            .iter()
            .find(|carrier| same_code(&carrier.mcc, mcc) && same_code(&carrier.mnc, mnc))?
            .prices
            .iter()
            .find(|price| price.number_type == "mobile")
            .map(|price| price.current_price)
    }
}

// Network codes come back as strings with inconsistent zero padding ("05" vs "5").
fn same_code(a: &str, b: &str) -> bool {
    match (a.trim().parse::<u32>(), b.trim().parse::<u32>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.trim() == b.trim(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Billing is not settled yet.
    Pending,
    /// Handed to the carrier, no delivery receipt yet. Billed at this many segments unless a
    /// final state arrives while polling.
    Sent { segments: u32 },
    /// Delivery reached a final state and was billed for this many segments.
    Final { segments: u32 },
}

/// The SMS provider: number lookup, pricing, sending and delivery status.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn lookup_number(&self, phone: &str) -> Result<NumberLookup, GatewayError>;

    async fn fetch_pricing(&self, country_code: &str) -> Result<CountryPricing, GatewayError>;

    /// Send a message and return the provider's message id. Segment count is not known yet.
    async fn send_message(&self, to: &str, body: &str) -> Result<String, GatewayError>;

    async fn delivery_state(&self, message_id: &str) -> Result<DeliveryState, GatewayError>;
}
