//! Integration Tests for Snapshot Persistence
//!
//! Save/load cycles through real files in a temporary directory.

use std::collections::BTreeMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use lru_cache_server::clock::{ManualClock, TimeSource};
use lru_cache_server::persistence::{SnapshotManager, StringSerializer, SNAPSHOT_MAGIC};
use lru_cache_server::{CacheError, ShardedCache};
use tokio_test::{assert_err, assert_ok};

// == Helper Functions ==

type Cache = ShardedCache<String, String>;

fn cache_on(clock: &Arc<ManualClock>) -> Cache {
    let time: Arc<dyn TimeSource> = clock.clone();
    ShardedCache::with_clock(1024, 8, time).unwrap()
}

fn manager(path: &Path, clock: &Arc<ManualClock>) -> SnapshotManager<String, String> {
    SnapshotManager::new(
        path,
        Arc::new(StringSerializer),
        Arc::new(StringSerializer),
        clock.clone(),
    )
}

fn contents(cache: &Cache) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    cache.for_each(|key, value, _| {
        map.insert(key.clone(), value.clone());
    });
    map
}

// == Round Trip ==

#[test]
fn test_round_trip_excludes_expired_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.dump");
    let clock = Arc::new(ManualClock::new(1_000_000));

    let source = cache_on(&clock);
    for i in 0..20 {
        source.put(format!("key{i}"), format!("value{i}"), 0);
    }
    source.put("short".to_string(), "gone".to_string(), 500);
    source.put("long".to_string(), "kept".to_string(), 60_000);

    let written = assert_ok!(manager(&path, &clock).save(&source));
    assert_eq!(written, 22);

    clock.advance(1_000);
    let target = cache_on(&clock);
    let report = assert_ok!(manager(&path, &clock).load(&target));

    assert_eq!(report.restored, 21);
    assert_eq!(report.expired, 1);
    assert_eq!(report.saved_at_ms, Some(1_000_000));
    assert_eq!(target.get(&"short".to_string()), None);
    assert_eq!(target.get(&"long".to_string()), Some("kept".to_string()));

    let mut expected = contents(&source);
    expected.remove("short");
    assert_eq!(contents(&target), expected);
}

#[test]
fn test_restored_entries_keep_their_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.dump");
    let clock = Arc::new(ManualClock::new(5_000));

    let source = cache_on(&clock);
    source.put("k".to_string(), "v".to_string(), 1_000);
    assert_ok!(manager(&path, &clock).save(&source));

    clock.set(5_400);
    let target = cache_on(&clock);
    assert_ok!(manager(&path, &clock).load(&target));
    assert_eq!(target.get(&"k".to_string()), Some("v".to_string()));

    clock.set(6_000);
    assert_eq!(target.get(&"k".to_string()), None);
}

// == Idempotent Reload ==

#[test]
fn test_idempotent_reload_into_two_caches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.dump");
    let clock = Arc::new(ManualClock::new(0));

    let source = cache_on(&clock);
    for i in 0..40 {
        source.put(format!("k{i}"), format!("v{i}"), 0);
    }
    let snapshots = manager(&path, &clock);
    assert_ok!(snapshots.save(&source));

    let first = cache_on(&clock);
    let second = cache_on(&clock);
    assert_ok!(snapshots.load(&first));
    assert_ok!(snapshots.load(&second));

    assert_eq!(contents(&first), contents(&second));
    assert_eq!(contents(&first), contents(&source));
}

// == Concurrent Mutation ==

#[test]
fn test_save_during_concurrent_writes_is_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("busy.dump");
    let clock = Arc::new(ManualClock::new(0));
    let time: Arc<dyn TimeSource> = clock.clone();
    // Small enough that writers keep evicting.
    let source: Cache = ShardedCache::with_clock(256, 8, time).unwrap();
    let snapshots = manager(&path, &clock);
    let running = AtomicBool::new(true);

    thread::scope(|scope| {
        for writer in 0..4 {
            let source = &source;
            let running = &running;
            scope.spawn(move || {
                let mut i = 0u64;
                while running.load(Ordering::Relaxed) {
                    let key = format!("w{writer}-{}", i % 1_000);
                    source.put(key.clone(), format!("value-of-{key}"), 0);
                    i += 1;
                }
            });
        }

        // Writers must be told to stop even if an assertion fails.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            for round in 0..50 {
                let written = assert_ok!(snapshots.save(&source));
                assert!(written <= 256, "round {round}: wrote {written} entries");

                let target = cache_on(&clock);
                let report = assert_ok!(snapshots.load(&target));
                assert_eq!(report.restored, written, "round {round}");
                assert_eq!(report.expired, 0);
                for (key, value) in contents(&target) {
                    assert_eq!(value, format!("value-of-{key}"), "round {round}: torn entry");
                }
            }
        }));

        running.store(false, Ordering::Relaxed);
        if let Err(payload) = outcome {
            panic::resume_unwind(payload);
        }
    });

    assert!(source.check_size_invariant());
}

// == Checksum Integrity ==

#[test]
fn test_any_corrupted_byte_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.dump");
    let clock = Arc::new(ManualClock::new(42));

    let source = cache_on(&clock);
    source.put("a".to_string(), "1".to_string(), 0);
    source.put("b".to_string(), "22".to_string(), 10_000);
    let snapshots = manager(&path, &clock);
    assert_ok!(snapshots.save(&source));
    let pristine = fs::read(&path).unwrap();

    for offset in 0..pristine.len() {
        let mut damaged = pristine.clone();
        damaged[offset] ^= 0x5A;
        fs::write(&path, &damaged).unwrap();

        let target = cache_on(&clock);
        let err = assert_err!(snapshots.load(&target));
        if offset < 8 {
            assert!(
                matches!(err, CacheError::Format(_)),
                "offset {offset}: expected format error, got {err}"
            );
        } else {
            assert!(
                matches!(err, CacheError::Corruption { .. }),
                "offset {offset}: expected corruption error, got {err}"
            );
        }
        assert_eq!(target.size(), 0, "offset {offset}: cache must stay empty");
    }
}

// == Empty Cache ==

#[test]
fn test_empty_cache_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.dump");
    let clock = Arc::new(ManualClock::new(7));

    let snapshots = manager(&path, &clock);
    assert_eq!(assert_ok!(snapshots.save(&cache_on(&clock))), 0);

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 28);
    assert_eq!(&bytes[..4], &SNAPSHOT_MAGIC.to_be_bytes());

    let target = cache_on(&clock);
    let report = assert_ok!(snapshots.load(&target));
    assert_eq!(report.restored, 0);
    assert_eq!(target.size(), 0);
}

#[test]
fn test_save_replaces_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.dump");
    let clock = Arc::new(ManualClock::new(0));
    let snapshots = manager(&path, &clock);

    let cache = cache_on(&clock);
    cache.put("old".to_string(), "1".to_string(), 0);
    assert_ok!(snapshots.save(&cache));

    let newer = cache_on(&clock);
    newer.put("new".to_string(), "2".to_string(), 0);
    assert_ok!(snapshots.save(&newer));

    let target = cache_on(&clock);
    assert_ok!(snapshots.load(&target));
    assert_eq!(target.get(&"old".to_string()), None);
    assert_eq!(target.get(&"new".to_string()), Some("2".to_string()));
    assert!(!dir.path().join("cache.dump.tmp").exists());
}
