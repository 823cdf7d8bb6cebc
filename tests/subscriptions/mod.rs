use std::time::Duration;

use attribute_db::parse_path;
use attribute_db::Adapter;
use attribute_db::AttributeDbConfig;
use attribute_db::ResultGroup;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::common::build_switch;

const WAIT: Duration = Duration::from_secs(5);

fn frequency(result: &ResultGroup) -> Option<u64> {
    result
        .lookup(&parse_path("cards[0]/frequency").unwrap())
        .and_then(|v| u64::try_from(v.clone()).ok())
}

#[tokio::test]
async fn subscriber_sees_hardware_changes() {
    let switch = build_switch(&[100], AttributeDbConfig::default());
    let adapter = Adapter::new(switch.database.clone());
    let paths = vec![parse_path("cards[0]/frequency").unwrap()];

    let (handle, mut rx) = adapter.subscribe(paths, Some(Duration::from_millis(20))).unwrap();
    assert_eq!(frequency(&timeout(WAIT, rx.recv()).await.unwrap().unwrap()), Some(100));

    switch.cards[0].set_register_frequency(180);
    assert_eq!(frequency(&timeout(WAIT, rx.recv()).await.unwrap().unwrap()), Some(180));

    handle.cancel().await;
    assert_eq!(switch.database.subscription_count(), 0);
}

#[tokio::test]
async fn set_through_the_database_reaches_subscribers() {
    let switch = build_switch(&[100], AttributeDbConfig::default());
    let adapter = Adapter::new(switch.database.clone());
    let (_handle, mut rx) = adapter
        .subscribe(vec![parse_path("cards[@]/frequency").unwrap()], Some(Duration::from_millis(20)))
        .unwrap();
    timeout(WAIT, rx.recv()).await.unwrap().unwrap();

    adapter.set_str(&[("cards[0]/frequency", 333_u64.into())]).unwrap();

    assert_eq!(frequency(&timeout(WAIT, rx.recv()).await.unwrap().unwrap()), Some(333));
}

#[tokio::test]
async fn several_subscribers_of_one_query_are_independent() {
    let switch = build_switch(&[100], AttributeDbConfig::default());
    let query = switch
        .database
        .make_query(vec![parse_path("cards[0]/frequency").unwrap()])
        .unwrap();
    let (tx_a, mut rx_a) = mpsc::channel(4);
    let (tx_b, mut rx_b) = mpsc::channel(4);

    let _a = query.subscribe(tx_a, Duration::from_millis(20)).unwrap();
    let _b = query.subscribe(tx_b, Duration::from_millis(30)).unwrap();

    assert_eq!(frequency(&timeout(WAIT, rx_a.recv()).await.unwrap().unwrap()), Some(100));
    assert_eq!(frequency(&timeout(WAIT, rx_b.recv()).await.unwrap().unwrap()), Some(100));
    assert_eq!(query.subscription_count(), 2);
}

#[tokio::test]
async fn default_interval_comes_from_configuration() {
    let mut config = AttributeDbConfig::default();
    config.subscription.default_polling_interval_ms = 15;
    let switch = build_switch(&[100], config);
    let adapter = Adapter::new(switch.database.clone());

    let (_handle, mut rx) = adapter.subscribe(vec![parse_path("cards[0]/frequency").unwrap()], None).unwrap();
    timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    switch.cards[0].set_register_frequency(101);

    // Well below the one second default.
    let update = timeout(Duration::from_millis(500), rx.recv()).await.unwrap().unwrap();
    assert_eq!(frequency(&update), Some(101));
}

#[tokio::test]
async fn too_fast_polling_is_refused() {
    let switch = build_switch(&[100], AttributeDbConfig::default());
    let adapter = Adapter::new(switch.database.clone());

    let err = adapter
        .subscribe(vec![parse_path("cards[0]/frequency").unwrap()], Some(Duration::from_millis(1)))
        .err()
        .unwrap();
    assert!(err.is_invalid_argument());
}
