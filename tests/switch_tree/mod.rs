use std::time::Duration;

use attribute_db::parse_path;
use attribute_db::Adapter;
use attribute_db::AttributeDbConfig;
use attribute_db::AttributeValue;
use attribute_db::AttributeValueMap;
use attribute_db::TimedCache;

use crate::common::build_switch;
use crate::common::build_switch_with_cards;
use crate::common::SimulatedCard;
use crate::common::CHASSIS_NAME;

fn frequency_of(
    result: &attribute_db::ResultGroup,
    card: i32,
) -> Option<u64> {
    let path = parse_path(&format!("cards[{card}]/frequency")).unwrap();
    result.lookup(&path).and_then(|v| u64::try_from(v.clone()).ok())
}

#[tokio::test]
async fn wildcard_get_reads_every_card() {
    let switch = build_switch(&[100, 200, 300], AttributeDbConfig::default());
    let adapter = Adapter::new(switch.database.clone());

    let result = adapter.get_str(&["cards[@]/frequency", "chassis_name"]).await.unwrap();

    assert_eq!(result.repeated_group_size("cards"), 3);
    assert_eq!(frequency_of(&result, 0), Some(100));
    assert_eq!(frequency_of(&result, 2), Some(300));
    assert_eq!(result.attribute("chassis_name"), Some(&AttributeValue::from(CHASSIS_NAME)));
}

#[tokio::test]
async fn terminal_group_returns_the_whole_card() {
    let switch = build_switch(&[100, 200], AttributeDbConfig::default());
    switch.cards[1].go_down();
    let adapter = Adapter::new(switch.database.clone());

    let result = adapter.get_str(&["cards[1]/"]).await.unwrap();
    let json = result.to_json().unwrap();

    assert_eq!(json["cards"][1]["name"], "card-1");
    assert_eq!(json["cards"][1]["frequency"], 200);
    assert_eq!(json["cards"][1]["state"], "CARD_STATE_DOWN");
    assert_eq!(json["cards"][0], serde_json::json!({}));
}

#[tokio::test]
async fn set_then_get_round_trips() {
    let switch = build_switch(&[100, 200], AttributeDbConfig::default());
    let adapter = Adapter::new(switch.database.clone());

    adapter.set_str(&[("cards[1]/frequency", 250_u64.into())]).unwrap();

    assert_eq!(switch.cards[0].register_frequency(), 100);
    assert_eq!(switch.cards[1].register_frequency(), 250);
    let result = adapter.get_str(&["cards[@]/frequency"]).await.unwrap();
    assert_eq!(frequency_of(&result, 1), Some(250));
}

#[tokio::test]
async fn rejected_flush_reports_an_error_but_other_cards_are_written() {
    let switch = build_switch(&[100, 200], AttributeDbConfig::default());

    let values = AttributeValueMap::from([
        (parse_path("cards[0]/frequency").unwrap(), AttributeValue::Uint64(0)),
        (parse_path("cards[1]/frequency").unwrap(), AttributeValue::Uint64(220)),
    ]);
    let err = switch.database.set(&values).unwrap_err();

    assert!(err.is_invalid_argument());
    assert_eq!(switch.cards[0].register_frequency(), 100);
    assert_eq!(switch.cards[1].register_frequency(), 220);
}

#[tokio::test]
async fn read_only_fields_cannot_be_set() {
    let switch = build_switch(&[100], AttributeDbConfig::default());
    let adapter = Adapter::new(switch.database.clone());

    let err = adapter.set_str(&[("cards[0]/name", "renamed".into())]).unwrap_err();
    assert!(err.is_failed_precondition());
    let err = adapter.set_str(&[("chassis_name", "renamed".into())]).unwrap_err();
    assert!(err.is_failed_precondition());
}

#[tokio::test]
async fn timed_cache_limits_hardware_reads() {
    let card = SimulatedCard::new(100, "card-0", Box::new(TimedCache::new(Duration::from_secs(3600))));
    let switch = build_switch_with_cards(vec![card.clone()], AttributeDbConfig::default());
    let query = switch.database.make_query(vec![parse_path("cards[0]/frequency").unwrap()]).unwrap();

    query.get().await.1.unwrap();
    card.set_register_frequency(999);
    let (result, status) = query.get().await;

    status.unwrap();
    assert_eq!(card.refreshes(), 1);
    assert_eq!(frequency_of(&result, 0), Some(100));
}

#[tokio::test]
async fn cards_added_later_join_existing_queries() {
    let switch = build_switch(&[100], AttributeDbConfig::default());
    let query = switch.database.make_query(vec![parse_path("cards[@]/frequency").unwrap()]).unwrap();
    query.get().await.1.unwrap();

    let late = SimulatedCard::new(400, "card-late", Box::new(attribute_db::NoCache));
    late.install(switch.database.root()).unwrap();

    let (result, status) = query.get().await;
    status.unwrap();
    assert_eq!(frequency_of(&result, 1), Some(400));
}

#[tokio::test]
async fn invalid_queries_are_rejected() {
    let switch = build_switch(&[100], AttributeDbConfig::default());
    let adapter = Adapter::new(switch.database.clone());

    for query in ["cards/frequency", "psu", "chassis_name/", "cards[0]/voltage", "cards[x]"] {
        let err = adapter.get_str(&[query]).await.unwrap_err();
        assert!(err.is_invalid_argument(), "{query}: {err:?}");
    }
}
