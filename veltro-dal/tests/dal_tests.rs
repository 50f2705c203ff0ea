//! Integration tests covering the DAL's operation contracts and the
//! cross-tier promotion scenario.

use std::sync::Arc;
use std::time::Duration;

use veltro_dal::layers::memory::MemoryLayer;
use veltro_dal::{Dal, DalConfig, DalError, Layer, SetOptions, TierConfig};

fn two_tier(promotion: bool, write_through: bool) -> (Dal<String, i32>, Arc<MemoryLayer<String, i32>>, Arc<MemoryLayer<String, i32>>) {
    let l0 = Arc::new(MemoryLayer::new("l0"));
    let l1 = Arc::new(MemoryLayer::new("l1"));
    let dal = Dal::new(
        vec![
            TierConfig::new("l0", l0.clone()),
            TierConfig::new("l1", l1.clone()),
        ],
        DalConfig {
            enable_promotion: promotion,
            write_through,
            enable_metrics: true,
        },
    )
    .unwrap();
    (dal, l0, l1)
}

// -- Scenario 6: two-tier promotion -----------------------------------------

#[tokio::test]
async fn scenario_6_get_from_slow_tier_promotes_into_fast_tier() {
    let (dal, l0, l1) = two_tier(true, true);
    l1.set("42".to_string(), 100, None).await.unwrap();

    assert_eq!(dal.get(&"42".to_string()).await.unwrap(), 100);
    assert_eq!(l0.get(&"42".to_string()).await.unwrap(), 100);
}

#[tokio::test]
async fn promotion_disabled_leaves_fast_tier_untouched() {
    let (dal, l0, l1) = two_tier(false, true);
    l1.set("42".to_string(), 100, None).await.unwrap();

    assert_eq!(dal.get(&"42".to_string()).await.unwrap(), 100);
    assert_eq!(l0.get(&"42".to_string()).await, Err(DalError::NotFound));
}

// -- get_multi partition invariant -------------------------------------------

#[tokio::test]
async fn get_multi_partitions_the_key_set() {
    let (dal, l0, _l1) = two_tier(true, true);
    l0.set("a".to_string(), 1, None).await.unwrap();
    l0.set("b".to_string(), 2, None).await.unwrap();

    let keys = vec!["a".to_string(), "b".to_string(), "missing".to_string()];
    let (found, errors) = dal.get_multi(&keys).await;

    assert_eq!(found.len() + errors.len(), keys.len());
    assert_eq!(found.get("a"), Some(&1));
    assert_eq!(found.get("b"), Some(&2));
    assert_eq!(errors.get("missing"), Some(&DalError::NotFound));
}

// -- write_through fan-out ----------------------------------------------------

#[tokio::test]
async fn write_through_set_reaches_every_writable_tier() {
    let (dal, l0, l1) = two_tier(true, true);
    dal.set("k".to_string(), 7, SetOptions::default()).await.unwrap();

    assert_eq!(l0.get(&"k".to_string()).await.unwrap(), 7);
    assert_eq!(l1.get(&"k".to_string()).await.unwrap(), 7);
}

#[tokio::test]
async fn non_write_through_set_only_reaches_fastest_tier() {
    let (dal, l0, l1) = two_tier(true, false);
    dal.set("k".to_string(), 7, SetOptions::default()).await.unwrap();

    assert_eq!(l0.get(&"k".to_string()).await.unwrap(), 7);
    assert_eq!(l1.get(&"k".to_string()).await, Err(DalError::NotFound));
}

#[tokio::test]
async fn skip_layers_is_honored_on_writes() {
    let (dal, l0, l1) = two_tier(true, true);
    dal.set("k".to_string(), 7, SetOptions::default().skip("l0"))
        .await
        .unwrap();

    assert_eq!(l0.get(&"k".to_string()).await, Err(DalError::NotFound));
    assert_eq!(l1.get(&"k".to_string()).await.unwrap(), 7);
}

// -- delete semantics ---------------------------------------------------------

#[tokio::test]
async fn delete_of_absent_key_succeeds() {
    let (dal, _l0, _l1) = two_tier(true, true);
    dal.delete(&"missing".to_string()).await.unwrap();
}

#[tokio::test]
async fn delete_removes_from_every_non_read_only_tier() {
    let (dal, l0, l1) = two_tier(true, true);
    l0.set("k".to_string(), 1, None).await.unwrap();
    l1.set("k".to_string(), 1, None).await.unwrap();

    dal.delete(&"k".to_string()).await.unwrap();

    assert_eq!(l0.get(&"k".to_string()).await, Err(DalError::NotFound));
    assert_eq!(l1.get(&"k".to_string()).await, Err(DalError::NotFound));
}

// -- read-only tiers ------------------------------------------------------

#[tokio::test]
async fn read_only_tier_is_skipped_on_writes_but_still_read() {
    let l0 = Arc::new(MemoryLayer::new("l0"));
    let l1 = Arc::new(MemoryLayer::new("l1"));
    l1.set("seed".to_string(), 5, None).await.unwrap();

    let dal = Dal::new(
        vec![
            TierConfig::new("l0", l0.clone()),
            TierConfig::new("l1", l1.clone()).read_only(),
        ],
        DalConfig {
            enable_promotion: false,
            write_through: true,
            enable_metrics: true,
        },
    )
    .unwrap();

    assert_eq!(dal.get(&"seed".to_string()).await.unwrap(), 5);
    dal.set("new".to_string(), 9, SetOptions::default())
        .await
        .unwrap();
    assert_eq!(l1.get(&"new".to_string()).await, Err(DalError::NotFound));
    assert_eq!(l0.get(&"new".to_string()).await.unwrap(), 9);
}

// -- close ------------------------------------------------------------------

#[tokio::test]
async fn close_is_single_use_and_subsequent_ops_fail_closed() {
    let (dal, _l0, _l1) = two_tier(true, true);
    dal.close().await.unwrap();
    assert_eq!(dal.close().await, Err(DalError::Closed));
    assert_eq!(dal.get(&"k".to_string()).await, Err(DalError::Closed));
}

// -- stats --------------------------------------------------------------------

#[tokio::test]
async fn stats_aggregate_hit_rate_across_tiers() {
    let (dal, l0, _l1) = two_tier(true, true);
    l0.set("a".to_string(), 1, None).await.unwrap();
    let _ = dal.get(&"a".to_string()).await;
    let _ = dal.get(&"missing".to_string()).await;

    let stats = dal.stats().await;
    assert!(stats.hit_rate > 0.0 && stats.hit_rate < 1.0);
    assert!(stats.per_layer.contains_key("l0"));
    assert!(stats.per_layer.contains_key("l1"));
}

// -- iteration delegation -----------------------------------------------------

#[tokio::test]
async fn keys_delegates_to_first_iterable_tier() {
    let (dal, l0, _l1) = two_tier(true, true);
    l0.set("a".to_string(), 1, None).await.unwrap();
    l0.set("b".to_string(), 2, None).await.unwrap();

    let mut keys = dal.keys().await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn ttl_zero_means_no_expiration() {
    let (dal, l0, _l1) = two_tier(true, true);
    dal.set(
        "k".to_string(),
        1,
        SetOptions {
            ttl: Some(Duration::ZERO),
            skip_layers: Vec::new(),
        },
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(l0.get(&"k".to_string()).await.unwrap(), 1);
}
