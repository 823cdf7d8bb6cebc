use std::io::Write;

use attribute_db::parse_path;
use attribute_db::AttributeDbConfig;
use attribute_db::CachePolicyFactory;
use attribute_db::CachePolicyType;
use serial_test::serial;
use tempfile::NamedTempFile;

use crate::common::build_switch_with_cards;
use crate::common::SimulatedCard;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
#[serial]
async fn cache_policy_from_a_config_file_drives_data_sources() {
    let file = config_file(
        r#"
        [cache]
        policy_type = "fetch_once"

        [executor]
        max_parallel_refreshes = 2
        "#,
    );
    let config = temp_env::with_vars(
        [
            ("CONFIG_PATH", Some(file.path().to_str().unwrap())),
            ("ATTRDB__EXECUTOR__MAX_PARALLEL_REFRESHES", None),
        ],
        || AttributeDbConfig::new().unwrap().validate().unwrap(),
    );
    assert_eq!(config.cache.policy_type, CachePolicyType::FetchOnce);
    assert_eq!(config.executor.max_parallel_refreshes, 2);

    let card = SimulatedCard::new(100, "card-0", CachePolicyFactory::create_instance(&config.cache).unwrap());
    let switch = build_switch_with_cards(vec![card.clone()], config);
    let query = switch
        .database
        .make_query(vec![parse_path("cards[0]/frequency").unwrap()])
        .unwrap();

    query.get().await.1.unwrap();
    query.get().await.1.unwrap();
    assert_eq!(card.refreshes(), 1);
}

#[test]
#[serial]
fn environment_overrides_the_file() {
    let file = config_file(
        r#"
        [subscription]
        min_polling_interval_ms = 50
        default_polling_interval_ms = 500
        "#,
    );
    let config = temp_env::with_vars(
        [
            ("CONFIG_PATH", Some(file.path().to_str().unwrap())),
            ("ATTRDB__SUBSCRIPTION__DEFAULT_POLLING_INTERVAL_MS", Some("200")),
        ],
        || AttributeDbConfig::new().unwrap().validate().unwrap(),
    );

    assert_eq!(config.subscription.min_polling_interval_ms, 50);
    assert_eq!(config.subscription.default_polling_interval_ms, 200);
}

#[test]
#[serial]
fn inconsistent_configuration_fails_validation() {
    let file = config_file(
        r#"
        [cache]
        policy_type = "timed_cache"
        timed_cache_value_secs = 0
        "#,
    );
    let result = temp_env::with_var("CONFIG_PATH", Some(file.path().to_str().unwrap()), || {
        AttributeDbConfig::new().unwrap().validate()
    });

    assert!(matches!(result, Err(attribute_db::Error::Config(_))));
}
