mod common;

use common::sqlite_harness;
use limber::cache::{CachedResult, QueryCache, QueryKey, ResultShape};
use limber::error::LimberError;
use limber::keys::Key;
use limber::value::Value;

fn key(n: usize) -> QueryKey {
    QueryKey {
        shape: ResultShape::Rows,
        sql: format!("select {}", n),
        params: Vec::new(),
    }
}

fn result(n: i64) -> CachedResult {
    CachedResult::Scalar(Value::Int(n))
}

#[test]
fn eviction_follows_use_not_insertion() {
    let mut cache = QueryCache::new(3);
    cache.put(key(1), result(1));
    cache.put(key(2), result(2));
    cache.put(key(3), result(3));
    // using the oldest key postpones its eviction
    assert!(cache.get(&key(1)).is_some());
    cache.put(key(4), result(4));

    assert!(cache.contains(&key(1)));
    assert!(!cache.contains(&key(2)), "the least recently used went");
    assert!(cache.contains(&key(3)));
    assert!(cache.contains(&key(4)));
}

#[test]
fn re_putting_an_existing_key_promotes_it() {
    let mut cache = QueryCache::new(2);
    cache.put(key(1), result(1));
    cache.put(key(2), result(2));
    cache.put(key(1), result(10));
    cache.put(key(3), result(3));

    assert!(cache.contains(&key(1)));
    assert!(!cache.contains(&key(2)));
    match cache.get(&key(1)) {
        Some(CachedResult::Scalar(Value::Int(10))) => {}
        other => panic!("expected the replaced value, got {other:?}"),
    }
}

#[test]
fn shrinking_capacity_evicts_immediately() {
    let mut cache = QueryCache::new(4);
    for n in 1..=4 {
        cache.put(key(n), result(n as i64));
    }
    cache.set_capacity(2);
    assert_eq!(cache.len(), 2);
    assert!(!cache.contains(&key(1)));
    assert!(!cache.contains(&key(2)));
    assert!(cache.contains(&key(3)));
    assert!(cache.contains(&key(4)));
}

#[test]
fn capacity_zero_disables_caching() {
    let mut cache = QueryCache::new(0);
    cache.put(key(1), result(1));
    assert!(cache.is_empty());
    assert!(cache.get(&key(1)).is_none());
}

#[test]
fn remove_and_clear() {
    let mut cache = QueryCache::new(4);
    cache.put(key(1), result(1));
    cache.put(key(2), result(2));
    cache.remove(&key(1));
    assert!(!cache.contains(&key(1)));
    assert!(cache.contains(&key(2)));
    cache.clear();
    assert!(cache.is_empty());
    // reusable after a clear
    cache.put(key(3), result(3));
    assert!(cache.contains(&key(3)));
}

#[test]
fn the_result_shape_is_part_of_the_key() {
    let mut cache = QueryCache::new(4);
    let scalar = QueryKey {
        shape: ResultShape::Scalar,
        sql: "select 1".to_owned(),
        params: Vec::new(),
    };
    let rows = QueryKey {
        shape: ResultShape::Rows,
        sql: "select 1".to_owned(),
        params: Vec::new(),
    };
    cache.put(scalar.clone(), result(1));
    assert!(!cache.contains(&rows), "same text, different shape");
    cache.put(rows.clone(), CachedResult::Rows(Vec::new()));
    assert_eq!(cache.len(), 2);
}

#[test]
fn repeated_reads_are_served_from_the_cache() {
    let h = sqlite_harness();
    let mut e = h.orchestrator.dispense("foo").expect("dispense");
    e.put("a", 1i64);
    let key = h.orchestrator.store(&mut e).expect("store");

    h.orchestrator.load("foo", &key).expect("load").expect("row");
    let after_first = h.reads.get();
    h.orchestrator.load("foo", &key).expect("load").expect("row");
    assert_eq!(
        h.reads.get(),
        after_first,
        "the second load never reached the driver"
    );
}

#[test]
fn any_write_invalidates_every_cached_read() {
    let h = sqlite_harness();
    let mut e = h.orchestrator.dispense("foo").expect("dispense");
    e.put("a", 1i64);
    let key = h.orchestrator.store(&mut e).expect("store");

    h.orchestrator.load("foo", &key).expect("load").expect("row");
    let warmed = h.reads.get();
    h.orchestrator.load("foo", &key).expect("load").expect("row");
    assert_eq!(h.reads.get(), warmed);

    // a write to a completely different table still clears everything
    h.access
        .execute("create table \"bar\" (\"x\" integer)", &[])
        .expect("create");
    h.orchestrator.load("foo", &key).expect("load").expect("row");
    assert!(h.reads.get() > warmed, "the read went back to the store");
}

#[test]
fn rollback_clears_the_cache() {
    let h = sqlite_harness();
    let mut e = h.orchestrator.dispense("foo").expect("dispense");
    e.put("a", 1i64);
    let key = h.orchestrator.store(&mut e).expect("store");

    h.orchestrator.load("foo", &key).expect("load").expect("row");
    let warmed = h.reads.get();

    let failed: Result<(), LimberError> = h
        .access
        .transaction(|| Err(LimberError::Usage("forced rollback".to_owned())));
    assert!(failed.is_err());

    h.orchestrator.load("foo", &key).expect("load").expect("row");
    assert!(
        h.reads.get() > warmed,
        "uncommitted effects may have been observed, so the cache went"
    );
}

#[test]
fn capacity_zero_on_the_access_layer_disables_read_caching() {
    let h = sqlite_harness();
    h.access.set_cache_capacity(0);
    let mut e = h.orchestrator.dispense("foo").expect("dispense");
    e.put("a", 1i64);
    let key = h.orchestrator.store(&mut e).expect("store");

    h.orchestrator.load("foo", &key).expect("load").expect("row");
    let after_first = h.reads.get();
    h.orchestrator.load("foo", &key).expect("load").expect("row");
    assert!(h.reads.get() > after_first, "every read reaches the driver");
}

#[test]
fn trash_key_roundtrip_uses_the_scalar_key() {
    // a sanity check that the cache key type composes with real keys
    let h = sqlite_harness();
    let mut e = h.orchestrator.dispense("foo").expect("dispense");
    e.put("a", 1i64);
    let key = h.orchestrator.store(&mut e).expect("store");
    assert_eq!(key, Key::Scalar(Value::Int(1)));
    h.orchestrator.trash(&mut e).expect("trash");
    assert!(h.orchestrator.load("foo", &key).expect("load").is_none());
}
