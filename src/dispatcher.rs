use futures::{StreamExt, TryStreamExt, stream};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::config::NotificationsConfig;
use crate::models::{RecipientMessage, Recipients};
use crate::plugins::traits::{CountryPricing, DeliveryState, NumberLookup, SmsGateway};
use crate::retry::RetryPolicy;
use crate::utils::error::DispatchError;

/// Charged by the gateway for every carrier lookup that misses the cache.
pub const LOOKUP_UNIT_COST: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

type Cache<T> = Mutex<HashMap<String, Arc<OnceCell<T>>>>;

// One cell per key so concurrent requests for the same key share a single gateway call.
fn cache_cell<T>(cache: &Cache<T>, key: &str) -> Arc<OnceCell<T>> {
    let mut cells = cache.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(cells.entry(key.to_string()).or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub lookup_cost: Decimal,
    pub message_cost: Decimal,
    pub sent: usize,
    pub failed: usize,
    /// Sent messages whose billing never settled within the polling budget. Not costed.
    pub unresolved: usize,
}

impl DispatchReport {
    pub fn total_cost(&self) -> Decimal {
        self.lookup_cost + self.message_cost
    }
}

/// A sent message waiting for its final segment count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTicket {
    pub message_id: String,
    pub phone: String,
    pub unit_price: Decimal,
    /// Segment count last reported while the message sat at "sent" without a receipt.
    pub sent_segments: Option<u32>,
}

#[derive(Default)]
struct Ledger {
    outstanding: Vec<DeliveryTicket>,
    settled: Decimal,
}

/// Sends recipient messages and accounts for what they cost.
///
/// Lookup and pricing results are cached for the life of the dispatcher.
pub struct NotificationDispatcher {
    gateway: Arc<dyn SmsGateway>,
    lookups: Cache<NumberLookup>,
    pricing: Cache<CountryPricing>,
    max_concurrency: usize,
    reconcile: RetryPolicy,
}

impl NotificationDispatcher {
    pub fn new(gateway: Arc<dyn SmsGateway>, config: &NotificationsConfig) -> Self {
        let reconcile = RetryPolicy::new(
            config.reconcile.max_polls,
            Duration::from_millis(config.reconcile.base_delay_ms),
        )
        .with_max_delay(Duration::from_millis(config.reconcile.max_delay_ms));

        Self {
            gateway,
            lookups: Mutex::new(HashMap::new()),
            pricing: Mutex::new(HashMap::new()),
            max_concurrency: config.max_concurrency.max(1),
            reconcile,
        }
    }

    /// Send every message and return what the batch cost.
    ///
    /// Every number is looked up and priced before anything is sent; a lookup or pricing
    /// failure aborts the batch with nothing sent. Failed sends are counted, not billed.
    pub async fn dispatch(
        &self,
        recipients: &Recipients,
        messages: Vec<RecipientMessage>,
    ) -> Result<DispatchReport, DispatchError> {
        let mut report = DispatchReport::default();

        let addressed: Vec<(String, String)> = messages
            .into_iter()
            .filter_map(|message| match recipients.get(&message.recipient) {
                Some(recipient) => Some((recipient.phone.clone(), message.text)),
                None => {
                    tracing::warn!("Dropping message for unknown recipient {}", message.recipient);
                    None
                }
            })
            .collect();

        if addressed.is_empty() {
            return Ok(report);
        }

        let phones: BTreeSet<&str> = addressed.iter().map(|(phone, _)| phone.as_str()).collect();
        let resolved: Vec<(&str, NumberLookup, bool)> = stream::iter(phones.into_iter().map(|phone| async move {
            let (lookup, missed) = self.lookup(phone).await?;
            Ok::<_, DispatchError>((phone, lookup, missed))
        }))
        .buffer_unordered(self.max_concurrency)
        .try_collect()
        .await?;

        let misses = resolved.iter().filter(|(_, _, missed)| *missed).count();
        report.lookup_cost = LOOKUP_UNIT_COST * Decimal::from(misses);

        let countries: BTreeSet<&str> = resolved.iter().map(|(_, lookup, _)| lookup.country_code.as_str()).collect();
        let prices: HashMap<String, CountryPricing> = stream::iter(countries.into_iter().map(|country_code| async move {
            let pricing = self.pricing(country_code).await?;
            Ok::<_, DispatchError>((country_code.to_string(), pricing))
        }))
        .buffer_unordered(self.max_concurrency)
        .try_collect()
        .await?;

        let mut unit_prices: HashMap<&str, Decimal> = HashMap::new();
        for (phone, lookup, _) in &resolved {
            let price = prices
                .get(&lookup.country_code)
                .and_then(|pricing| pricing.mobile_price(&lookup.mcc, &lookup.mnc))
                .ok_or_else(|| DispatchError::PriceUnavailable {
                    phone: phone.to_string(),
                    country_code: lookup.country_code.clone(),
                    mcc: lookup.mcc.clone(),
                    mnc: lookup.mnc.clone(),
                })?;
            unit_prices.insert(*phone, price);
        }

        let mut tickets = Vec::with_capacity(addressed.len());
        for (phone, text) in &addressed {
            match self.gateway.send_message(phone, text).await {
                Ok(message_id) => {
                    tracing::debug!("Sent message {} to {}", message_id, phone);
                    report.sent += 1;
                    tickets.push(DeliveryTicket {
                        message_id,
                        phone: phone.clone(),
                        unit_price: unit_prices.get(phone.as_str()).copied().unwrap_or_default(),
                        sent_segments: None,
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to send message to {}: {}", phone, e);
                    report.failed += 1;
                }
            }
        }

        let (message_cost, unresolved) = self.reconcile(tickets).await;
        report.message_cost = message_cost;
        report.unresolved = unresolved;

        tracing::info!(
            "Sent {} messages ({} failed, {} unresolved) costing ${} (lookups ${}, messages ${})",
            report.sent,
            report.failed,
            report.unresolved,
            report.total_cost(),
            report.lookup_cost,
            report.message_cost
        );
        Ok(report)
    }

    /// Cached carrier lookup; the flag is set when this call hit the gateway.
    async fn lookup(&self, phone: &str) -> Result<(NumberLookup, bool), DispatchError> {
        let cell = cache_cell(&self.lookups, phone);
        let mut missed = false;
        let lookup = cell
            .get_or_try_init(|| {
                missed = true;
                self.gateway.lookup_number(phone)
            })
            .await
            .map_err(|source| DispatchError::Lookup {
                phone: phone.to_string(),
                source,
            })?;
        Ok((lookup.clone(), missed))
    }

    async fn pricing(&self, country_code: &str) -> Result<CountryPricing, DispatchError> {
        let cell = cache_cell(&self.pricing, country_code);
        let pricing = cell
            .get_or_try_init(|| self.gateway.fetch_pricing(country_code))
            .await
            .map_err(|source| DispatchError::Pricing {
                country_code: country_code.to_string(),
                source,
            })?;
        Ok(pricing.clone())
    }

    /// Poll delivery status until every ticket settles or the polling budget runs out.
    /// Returns the settled cost and how many tickets never settled.
    async fn reconcile(&self, tickets: Vec<DeliveryTicket>) -> (Decimal, usize) {
        if tickets.is_empty() {
            return (Decimal::ZERO, 0);
        }

        let ledger = Mutex::new(Ledger {
            outstanding: tickets,
            settled: Decimal::ZERO,
        });
        let outcome = self
            .reconcile
            .run(|| self.poll_round(&ledger), |_: &usize| true)
            .await;

        let mut ledger = ledger.into_inner().unwrap_or_else(PoisonError::into_inner);
        if let Err(remaining) = outcome {
            tracing::warn!("{} deliveries still unsettled after {} polls", remaining, self.reconcile.max_attempts);

            // Sent without a receipt is as settled as those messages will get; bill what the
            // carrier reported and leave only the truly unknown ones unresolved.
            let Ledger { outstanding, settled } = &mut ledger;
            outstanding.retain(|ticket| match ticket.sent_segments {
                Some(segments) => {
                    tracing::info!(
                        "Billing {} to {} at {} segments without a delivery receipt",
                        ticket.message_id,
                        ticket.phone,
                        segments
                    );
                    *settled += ticket.unit_price * Decimal::from(segments);
                    false
                }
                None => true,
            });
            for ticket in &ledger.outstanding {
                tracing::warn!("Delivery of {} to {} unresolved", ticket.message_id, ticket.phone);
            }
        }
        (ledger.settled, ledger.outstanding.len())
    }

    /// One polling round over the outstanding tickets. `Err` carries how many remain.
    async fn poll_round(&self, ledger: &Mutex<Ledger>) -> Result<(), usize> {
        let outstanding = ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .outstanding
            .clone();

        let states: HashMap<String, DeliveryState> = stream::iter(outstanding.into_iter().map(|ticket| async move {
            match self.gateway.delivery_state(&ticket.message_id).await {
                Ok(DeliveryState::Pending) => None,
                Ok(state) => Some((ticket.message_id, state)),
                Err(e) => {
                    tracing::warn!("Could not fetch delivery status of {}: {}", ticket.message_id, e);
                    None
                }
            }
        }))
        .buffer_unordered(self.max_concurrency)
        .filter_map(|state| async move { state })
        .collect()
        .await;

        let mut ledger = ledger.lock().unwrap_or_else(PoisonError::into_inner);
        let Ledger { outstanding, settled: cost } = &mut *ledger;
        outstanding.retain_mut(|ticket| match states.get(&ticket.message_id) {
            Some(DeliveryState::Final { segments }) => {
                *cost += ticket.unit_price * Decimal::from(*segments);
                false
            }
            Some(DeliveryState::Sent { segments }) => {
                ticket.sent_segments = Some(*segments);
                true
            }
            _ => true,
        });

        if outstanding.is_empty() { Ok(()) } else { Err(outstanding.len()) }
    }
}
