use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use stock_watcher::StockScheduler;
use stock_watcher::models::{ProductKey, StockStatus};
use stock_watcher::snapshot::{Snapshot, SnapshotStore};

use super::*;

const CATALOG: &str = r#"
[[products]]
name = "RTX 3080"
provider = "ALPHA"
url = "gpu/3080"
watchers = ["alice"]
"#;

fn gpu_key() -> ProductKey {
    ProductKey::new("ALPHA", "gpu/3080")
}

async fn seed_snapshot(config: &AppConfig, entries: &[(ProductKey, StockStatus)]) {
    let snapshot: Snapshot = entries.iter().cloned().collect();
    SnapshotStore::new(&config.data.snapshot_path)
        .persist(&snapshot)
        .await
        .unwrap();
}

async fn stored_snapshot(config: &AppConfig) -> Snapshot {
    SnapshotStore::new(&config.data.snapshot_path).load().await.unwrap()
}

fn scheduler(config: &AppConfig, launcher: FakeLauncher, gateway: Arc<FakeGateway>) -> StockScheduler {
    StockScheduler::from_config(config, keyword_registry(&["ALPHA", "BRAVO"]), Arc::new(launcher), gateway)
}

#[tokio::test(start_paused = true)]
async fn test_back_in_stock_cycle() {
    let (_dir, config) = create_test_workspace(CATALOG);
    seed_snapshot(&config, &[(gpu_key(), StockStatus::OutOfStock)]).await;

    let web = FakeWeb::new();
    web.script(&product_url("ALPHA", "gpu/3080"), vec![Step::Page(200, IN_STOCK_PAGE)]);
    let gateway = FakeGateway::new();
    let launcher = FakeLauncher::new(web);
    let counters = Arc::clone(&launcher.counters);

    let mut scheduler = scheduler(&config, launcher, Arc::clone(&gateway));
    let report = scheduler.run_cycle().await.unwrap();

    assert_eq!(report.messages, 1);
    assert_eq!(report.error_delta, 0);
    assert_eq!(
        gateway.sent(),
        vec![(
            "+61400000001".to_string(),
            "🎉 RTX 3080 from ALPHA is now back in stock!\nhttps://alpha.test/gpu/3080".to_string()
        )]
    );

    let dispatch = report.dispatch.unwrap();
    assert_eq!(dispatch.total_cost(), Decimal::new(15, 3));

    assert_eq!(stored_snapshot(&config).await.get(&gpu_key()), Some(StockStatus::InStock));
    assert_eq!(scheduler.errors_in_last_hour(), 0);
    assert!(counters.all_released());
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_leave_snapshot_unchanged() {
    let (_dir, config) = create_test_workspace(CATALOG);
    seed_snapshot(&config, &[(gpu_key(), StockStatus::OutOfStock)]).await;
    let before = std::fs::read_to_string(&config.data.snapshot_path).unwrap();

    let web = FakeWeb::new();
    web.script(&product_url("ALPHA", "gpu/3080"), vec![Step::Hang]);
    let gateway = FakeGateway::new();

    let mut scheduler = scheduler(&config, FakeLauncher::new(Arc::clone(&web)), Arc::clone(&gateway));
    let report = scheduler.run_cycle().await.unwrap();

    assert_eq!(web.calls(&product_url("ALPHA", "gpu/3080")).len(), 3);
    assert_eq!(report.error_delta, 1);
    assert_eq!(report.messages, 0);
    assert!(report.dispatch.is_none());
    assert!(gateway.sent().is_empty());
    assert_eq!(std::fs::read_to_string(&config.data.snapshot_path).unwrap(), before);
    assert_eq!(scheduler.errors_in_last_hour(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_session_setup_timeout_aborts_cycle() {
    let catalog = r#"
        [[products]]
        name = "RTX 3080"
        provider = "ALPHA"
        url = "gpu/3080"
        watchers = ["alice"]

        [[products]]
        name = "Ryzen 5950X"
        provider = "BRAVO"
        url = "cpu/5950x"
        watchers = ["bob"]
    "#;
    let (_dir, config) = create_test_workspace(catalog);
    seed_snapshot(&config, &[(gpu_key(), StockStatus::OutOfStock)]).await;
    let before = std::fs::read_to_string(&config.data.snapshot_path).unwrap();

    let web = FakeWeb::new();
    web.script(&product_url("ALPHA", "gpu/3080"), vec![Step::Page(200, IN_STOCK_PAGE)]);
    let launcher = FakeLauncher::new(Arc::clone(&web)).with_open_delay(Duration::from_secs(3));
    let counters = Arc::clone(&launcher.counters);
    let gateway = FakeGateway::new();

    let mut scheduler = scheduler(&config, launcher, Arc::clone(&gateway));
    let result = scheduler.run_cycle().await;

    assert!(result.is_err());
    assert_eq!(web.total_calls(), 0);
    assert!(gateway.sent().is_empty());
    assert!(counters.all_released());
    assert_eq!(std::fs::read_to_string(&config.data.snapshot_path).unwrap(), before);
    assert_eq!(scheduler.errors_in_last_hour(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_cycles_round_trip_snapshot() {
    let (_dir, config) = create_test_workspace(CATALOG);

    let web = FakeWeb::new();
    web.script(&product_url("ALPHA", "gpu/3080"), vec![Step::Page(200, OUT_OF_STOCK_PAGE)]);
    let gateway = FakeGateway::new();

    let mut scheduler = scheduler(&config, FakeLauncher::new(web), Arc::clone(&gateway));
    scheduler.run_cycle().await.unwrap();
    let first = std::fs::read_to_string(&config.data.snapshot_path).unwrap();
    let first_snapshot = stored_snapshot(&config).await;

    let report = scheduler.run_cycle().await.unwrap();
    let second = std::fs::read_to_string(&config.data.snapshot_path).unwrap();

    assert_eq!(report.messages, 0);
    assert_eq!(first, second);
    assert_eq!(stored_snapshot(&config).await, first_snapshot);
    assert_eq!(first_snapshot.get(&gpu_key()), Some(StockStatus::OutOfStock));
    assert!(gateway.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_removed_products_drop_out_of_snapshot() {
    let (_dir, config) = create_test_workspace(CATALOG);
    let retired = ProductKey::new("BRAVO", "discontinued");
    seed_snapshot(
        &config,
        &[(gpu_key(), StockStatus::InStock), (retired.clone(), StockStatus::InStock)],
    )
    .await;

    let web = FakeWeb::new();
    web.script(&product_url("ALPHA", "gpu/3080"), vec![Step::Page(200, IN_STOCK_PAGE)]);

    let mut scheduler = scheduler(&config, FakeLauncher::new(web), FakeGateway::new());
    let report = scheduler.run_cycle().await.unwrap();

    let stored = stored_snapshot(&config).await;
    assert_eq!(report.messages, 0);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored.get(&retired), None);
}

#[tokio::test(start_paused = true)]
async fn test_failed_dispatch_keeps_snapshot_and_counts_error() {
    let (_dir, config) = create_test_workspace(CATALOG);
    seed_snapshot(&config, &[(gpu_key(), StockStatus::InStock)]).await;

    let web = FakeWeb::new();
    web.script(&product_url("ALPHA", "gpu/3080"), vec![Step::Page(200, OUT_OF_STOCK_PAGE)]);
    let gateway = FakeGateway::failing_lookups();

    let mut scheduler = scheduler(&config, FakeLauncher::new(web), Arc::clone(&gateway));
    let report = scheduler.run_cycle().await.unwrap();

    assert_eq!(report.messages, 1);
    assert!(report.dispatch.is_none());
    assert!(gateway.sent().is_empty());
    assert_eq!(stored_snapshot(&config).await.get(&gpu_key()), Some(StockStatus::OutOfStock));
    assert_eq!(scheduler.errors_in_last_hour(), 1);

    // The alert has the same broken gateway to go through, so the count must survive it.
    assert!(scheduler.flush_error_alert().await.is_err());
    assert_eq!(scheduler.errors_in_last_hour(), 1);
}
