use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stock_watcher::config::NotificationsConfig;
use stock_watcher::dispatcher::NotificationDispatcher;
use stock_watcher::models::{Recipient, RecipientMessage, Recipients};
use stock_watcher::plugins::notifiers::TwilioGateway;
use stock_watcher::utils::error::DispatchError;

use super::*;

const ALICE: &str = "+61400000001";
const MESSAGES_PATH: &str = "/2010-04-01/Accounts/AC123/Messages.json";

fn notifications(server: &MockServer) -> NotificationsConfig {
    let dir = std::env::temp_dir();
    let mut notifications = get_test_config(&dir).notifications;
    notifications.twilio.api_base_url = server.uri();
    notifications.twilio.lookups_base_url = server.uri();
    notifications.twilio.pricing_base_url = server.uri();
    notifications.reconcile.base_delay_ms = 10;
    notifications.reconcile.max_delay_ms = 50;
    notifications
}

fn dispatcher(server: &MockServer) -> NotificationDispatcher {
    let config = notifications(server);
    let gateway = TwilioGateway::new(config.twilio.clone());
    NotificationDispatcher::new(Arc::new(gateway), &config)
}

fn alice() -> Recipients {
    Recipients::from([(
        "alice".to_string(),
        Recipient {
            phone: ALICE.to_string(),
            is_admin: true,
        },
    )])
}

async fn mount_lookup_and_pricing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/PhoneNumbers/{}", ALICE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "country_code": "AU",
            "phone_number": ALICE,
            "carrier": { "mobile_country_code": "505", "mobile_network_code": "01" }
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/Messaging/Countries/AU"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "iso_country": "AU",
            "outbound_sms_prices": [{
                "mcc": "505",
                "mnc": "01",
                "prices": [
                    { "number_type": "landline", "current_price": "0.05" },
                    { "number_type": "mobile", "current_price": "0.01" }
                ]
            }]
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_dispatch_through_twilio_bills_settled_segments() {
    let server = MockServer::start().await;
    mount_lookup_and_pricing(&server).await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "sid": "SM001",
            "status": "queued",
            "num_segments": "0"
        })))
        .expect(1)
        .mount(&server)
        .await;
    // Still in flight on the first poll, delivered as two segments on the next.
    Mock::given(method("GET"))
        .and(path("/2010-04-01/Accounts/AC123/Messages/SM001.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sid": "SM001",
            "status": "sending",
            "num_segments": "2"
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2010-04-01/Accounts/AC123/Messages/SM001.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sid": "SM001",
            "status": "delivered",
            "num_segments": "2"
        })))
        .mount(&server)
        .await;

    let report = dispatcher(&server)
        .dispatch(&alice(), vec![RecipientMessage::new("alice", "🎉 back in stock")])
        .await
        .unwrap();

    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.unresolved, 0);
    assert_eq!(report.lookup_cost, Decimal::new(5, 3));
    assert_eq!(report.message_cost, Decimal::new(2, 2));
    assert_eq!(report.total_cost(), Decimal::new(25, 3));
}

#[tokio::test]
async fn test_rejected_send_costs_only_the_lookup() {
    let server = MockServer::start().await;
    mount_lookup_and_pricing(&server).await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("unreachable destination"))
        .expect(1)
        .mount(&server)
        .await;

    let report = dispatcher(&server)
        .dispatch(&alice(), vec![RecipientMessage::new("alice", "😞 sold out")])
        .await
        .unwrap();

    assert_eq!(report.sent, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(report.total_cost(), Decimal::new(5, 3));
}

#[tokio::test]
async fn test_lookup_rejection_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/PhoneNumbers/{}", ALICE)))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let result = dispatcher(&server)
        .dispatch(&alice(), vec![RecipientMessage::new("alice", "🎉 back in stock")])
        .await;

    match result {
        Err(DispatchError::Lookup { phone, .. }) => assert_eq!(phone, ALICE),
        other => panic!("expected lookup failure, got {:?}", other),
    }
}
