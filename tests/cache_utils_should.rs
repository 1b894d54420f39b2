use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rerng_api::server::utils::cache_utils::{CacheStore, EvictionPolicy, MemoryCacheStore};

#[test]
fn test_policy_from_limits() {
    assert_eq!(EvictionPolicy::from_limits(0, 0), EvictionPolicy::Unbounded);
    assert_eq!(EvictionPolicy::from_limits(10, 0), EvictionPolicy::Capacity(10));
    assert_eq!(
        EvictionPolicy::from_limits(0, 60),
        EvictionPolicy::Ttl(Duration::from_secs(60))
    );
    assert_eq!(
        EvictionPolicy::from_limits(5, 60),
        EvictionPolicy::CapacityAndTtl {
            capacity: 5,
            ttl: Duration::from_secs(60)
        }
    );
}

#[test]
fn test_unbounded_store_keeps_everything() {
    let store = MemoryCacheStore::<String>::new(EvictionPolicy::Unbounded);

    for i in 0..100 {
        store.insert(&format!("k{}", i), format!("v{}", i));
    }

    assert_eq!(store.len(), 100);
    assert_eq!(store.get("k42"), Some("v42".to_string()));
}

#[test]
fn test_insert_overwrites() {
    let store = MemoryCacheStore::<u64>::new(EvictionPolicy::Unbounded);

    store.insert("ip", 1);
    store.insert("ip", 2);

    assert_eq!(store.get("ip"), Some(2));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_capacity_evicts_the_oldest() {
    let store = MemoryCacheStore::<u64>::new(EvictionPolicy::Capacity(2));

    store.insert("a", 1);
    thread::sleep(Duration::from_millis(2));
    store.insert("b", 2);
    thread::sleep(Duration::from_millis(2));
    store.insert("c", 3);

    assert_eq!(store.len(), 2);
    assert_eq!(store.get("a"), None);
    assert_eq!(store.get("b"), Some(2));
    assert_eq!(store.get("c"), Some(3));
}

#[test]
fn test_zero_capacity_stores_nothing() {
    let store = MemoryCacheStore::<u64>::new(EvictionPolicy::Capacity(0));

    store.insert("a", 1);

    assert!(store.is_empty());
}

#[test]
fn test_expired_entries_read_as_missing() {
    let store = MemoryCacheStore::<u64>::new(EvictionPolicy::Ttl(Duration::from_millis(30)));

    store.insert("a", 1);
    assert_eq!(store.get("a"), Some(1));

    thread::sleep(Duration::from_millis(60));

    assert_eq!(store.get("a"), None);
    assert!(store.is_empty());
}

#[test]
fn test_remove_returns_the_value() {
    let store = MemoryCacheStore::<String>::new(EvictionPolicy::Unbounded);
    store.insert("page", "media".to_string());

    assert_eq!(store.remove("page"), Some("media".to_string()));
    assert_eq!(store.remove("page"), None);
}

#[test]
fn test_concurrent_writers_leave_one_value_per_key() {
    let store = Arc::new(MemoryCacheStore::<usize>::new(EvictionPolicy::Unbounded));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    store.insert(&format!("k{}", i % 50), t);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 50);
    assert!(store.get("k0").is_some_and(|v| v < 8));
}
