use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::str::FromStr;
use url::Url;

use crate::config::TwilioConfig;
use crate::plugins::traits::{
    CarrierPrice, CountryPricing, DeliveryState, NumberLookup, NumberTypePrice, SmsGateway,
};
use crate::utils::error::GatewayError;

#[derive(Debug, Deserialize)]
struct LookupResponse {
    country_code: String,
    carrier: Option<LookupCarrier>,
}

#[derive(Debug, Deserialize)]
struct LookupCarrier {
    mobile_country_code: Option<String>,
    mobile_network_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PricingResponse {
    iso_country: String,
    #[serde(default)]
    outbound_sms_prices: Vec<PricingCarrier>,
}

#[derive(Debug, Deserialize)]
struct PricingCarrier {
    mcc: String,
    mnc: String,
    #[serde(default)]
    prices: Vec<PricingEntry>,
}

#[derive(Debug, Deserialize)]
struct PricingEntry {
    number_type: String,
    current_price: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
    status: String,
    num_segments: Option<String>,
}

/// Twilio REST client for lookups, pricing and messaging.
pub struct TwilioGateway {
    client: Client,
    config: TwilioConfig,
}

impl TwilioGateway {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn with_client(client: Client, config: TwilioConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(base_url: &str, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = Url::parse(base_url)
            .map_err(|e| GatewayError::InvalidResponse(format!("bad base URL {}: {}", base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidResponse(format!("base URL {} cannot hold a path", base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn messages_endpoint(&self, tail: &[&str]) -> Result<Url, GatewayError> {
        let mut segments = vec!["2010-04-01", "Accounts", self.config.account_sid.as_str()];
        segments.extend_from_slice(tail);
        Self::endpoint(&self.config.api_base_url, &segments)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.config.api_key_sid, Some(&self.config.api_key_secret))
    }

    async fn read_json<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                operation,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }

    fn parse_price(raw: &str) -> Result<Decimal, GatewayError> {
        Decimal::from_str(raw.trim())
            .map_err(|e| GatewayError::InvalidResponse(format!("bad price '{}': {}", raw, e)))
    }

    fn segments_of(message: &MessageResponse) -> Result<u32, GatewayError> {
        message
            .num_segments
            .as_deref()
            .ok_or_else(|| {
                GatewayError::InvalidResponse(format!(
                    "message {} is {} without a segment count",
                    message.sid, message.status
                ))
            })?
            .trim()
            .parse::<u32>()
            .map_err(|e| {
                GatewayError::InvalidResponse(format!(
                    "bad segment count for message {}: {}",
                    message.sid, e
                ))
            })
    }

    fn delivery_state_of(message: &MessageResponse) -> Result<DeliveryState, GatewayError> {
        match message.status.as_str() {
            "delivered" | "undelivered" | "failed" | "read" => Ok(DeliveryState::Final {
                segments: Self::segments_of(message)?,
            }),
            // Many carriers never send a receipt, so "sent" may be as far as it gets.
            "sent" => match Self::segments_of(message) {
                Ok(segments) => Ok(DeliveryState::Sent { segments }),
                Err(_) => Ok(DeliveryState::Pending),
            },
            // Canceled before leaving the queue, nothing billed.
            "canceled" => Ok(DeliveryState::Final { segments: 0 }),
            _ => Ok(DeliveryState::Pending),
        }
    }
}

#[async_trait]
impl SmsGateway for TwilioGateway {
    async fn lookup_number(&self, phone: &str) -> Result<NumberLookup, GatewayError> {
        let url = Self::endpoint(&self.config.lookups_base_url, &["v1", "PhoneNumbers", phone])?;
        let response = self
            .authorized(self.client.get(url).query(&[("Type", "carrier")]))
            .send()
            .await?;
        let lookup: LookupResponse = Self::read_json("lookup", response).await?;

        let carrier = lookup.carrier.ok_or_else(|| {
            GatewayError::InvalidResponse(format!("no carrier details for {}", phone))
        })?;
        match (carrier.mobile_country_code, carrier.mobile_network_code) {
            (Some(mcc), Some(mnc)) => Ok(NumberLookup {
                country_code: lookup.country_code,
                mcc,
                mnc,
            }),
            _ => Err(GatewayError::InvalidResponse(format!(
                "{} is not on a mobile network",
                phone
            ))),
        }
    }

    async fn fetch_pricing(&self, country_code: &str) -> Result<CountryPricing, GatewayError> {
        let url = Self::endpoint(
            &self.config.pricing_base_url,
            &["v1", "Messaging", "Countries", country_code],
        )?;
        let response = self.authorized(self.client.get(url)).send().await?;
        let pricing: PricingResponse = Self::read_json("pricing", response).await?;

        let mut carriers = Vec::with_capacity(pricing.outbound_sms_prices.len());
        for carrier in pricing.outbound_sms_prices {
            let mut prices = Vec::with_capacity(carrier.prices.len());
            for price in carrier.prices {
                prices.push(NumberTypePrice {
                    current_price: Self::parse_price(&price.current_price)?,
                    number_type: price.number_type,
                });
            }
            carriers.push(CarrierPrice {
                mcc: carrier.mcc,
                mnc: carrier.mnc,
                prices,
            });
        }

        Ok(CountryPricing {
            country_code: pricing.iso_country,
            carriers,
        })
    }

    async fn send_message(&self, to: &str, body: &str) -> Result<String, GatewayError> {
        let url = self.messages_endpoint(&["Messages.json"])?;
        let form = [
            ("To", to),
            ("MessagingServiceSid", self.config.service_sid.as_str()),
            ("Body", body),
        ];
        let response = self.authorized(self.client.post(url).form(&form)).send().await?;
        let message: MessageResponse = Self::read_json("send", response).await?;

        tracing::debug!("Queued message {} to {} ({})", message.sid, to, message.status);
        Ok(message.sid)
    }

    async fn delivery_state(&self, message_id: &str) -> Result<DeliveryState, GatewayError> {
        let resource = format!("{}.json", message_id);
        let url = self.messages_endpoint(&["Messages", resource.as_str()])?;
        let response = self.authorized(self.client.get(url)).send().await?;
        let message: MessageResponse = Self::read_json("status", response).await?;

        Self::delivery_state_of(&message)
    }
}
