use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

use crate::config::StoreConfig;
use crate::error::ConfigError;
use crate::lookup::Lookup;
use crate::store::Store;

/// Truncates an id for safe logging (ids often double as secrets)
fn truncate_id_for_log(id: &str) -> &str {
    const MAX_LOG_LEN: usize = 16;
    match id.char_indices().nth(MAX_LOG_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

/// The two id-keyed maps plus the write counter, all guarded by one lock
#[derive(Default)]
struct Tables {
    values: HashMap<String, Arc<[u8]>>,
    created: HashMap<String, Instant>,
    /// Writes since the last sweep
    writes: usize,
}

/// What a single id looks like at a given instant
enum Probe {
    Missing,
    /// Expired, or the value has no timestamp
    Stale,
    Live(Arc<[u8]>),
}

impl Tables {
    fn insert(&mut self, id: &str, value: Arc<[u8]>, created_at: Instant) {
        self.values.insert(id.to_owned(), value);
        self.created.insert(id.to_owned(), created_at);
    }

    fn remove(&mut self, id: &str) {
        self.values.remove(id);
        self.created.remove(id);
    }

    fn probe(&self, id: &str, now: Instant, ttl: Duration) -> Probe {
        let Some(value) = self.values.get(id) else {
            return Probe::Missing;
        };
        match self.created.get(id) {
            Some(created_at) if now.saturating_duration_since(*created_at) < ttl => {
                Probe::Live(Arc::clone(value))
            }
            _ => Probe::Stale,
        }
    }

    /// Removes every expired entry and any value left without a timestamp.
    /// Returns the number of values removed.
    fn purge_expired(&mut self, now: Instant, ttl: Duration) -> usize {
        let Tables { values, created, .. } = self;
        let before = values.len();

        created.retain(|id, created_at| {
            if now.saturating_duration_since(*created_at) < ttl {
                return true;
            }
            values.remove(id);
            false
        });
        values.retain(|id, _| created.contains_key(id));

        before - values.len()
    }
}

/// Internal shared state for the store
struct StoreInner {
    tables: RwLock<Tables>,
    /// Set while a background sweep is scheduled or running
    sweeping: AtomicBool,
    config: StoreConfig,
}

impl StoreInner {
    fn sweep(&self) -> usize {
        let now = Instant::now();
        let removed = {
            let mut tables = self.tables.write();
            tables.writes = 0;
            tables.purge_expired(now, self.config.ttl)
        };
        tracing::debug!(removed, "swept expired entries");
        removed
    }
}

/// Ownership of the "sweep in flight" flag.
///
/// Dropping it clears the flag, so a sweep that never gets to run (thread
/// spawn failure, runtime shut down) does not block later sweeps.
struct InFlight(Arc<StoreInner>);

impl InFlight {
    fn run(&self) {
        self.0.sweep();
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.sweeping.store(false, Ordering::Release);
    }
}

/// Thread-safe in-memory store with TTL expiry
///
/// Values and their creation times live in two maps behind a single
/// readers-writer lock. Writes and consuming reads take the lock exclusively;
/// plain reads share it and only upgrade to purge an entry they found expired.
///
/// Expired entries are removed lazily when read, and in bulk by a sweep that
/// is scheduled in the background once more than `sweep_threshold` writes
/// have happened since the previous one. At most one background sweep is in
/// flight at a time. Sweeps run on the blocking pool of the Tokio runtime that
/// is current on the writing thread, or on a detached thread otherwise.
///
/// Cloning is cheap; clones share the same entries.
///
/// # Example
///
/// ```rust
/// use evanesce_core::{Lookup, MemoryStore, Store, StoreConfig};
///
/// let store = MemoryStore::with_config(
///     StoreConfig::default().with_sweep_threshold(100).with_ttl_secs(300),
/// );
///
/// store.set("challenge-1", b"48213");
/// assert!(store.get("challenge-1", false).is_found());
/// assert_eq!(store.get("challenge-1", true).value(), Some(&b"48213"[..]));
/// assert_eq!(store.get("challenge-1", false), Lookup::NotFound);
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    /// Creates a store with the default configuration
    /// (100 writes between sweeps, 10 minute TTL)
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates a store with a custom configuration
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid (zero threshold or zero TTL).
    /// Use [`MemoryStore::try_with_config`] to handle that case instead.
    pub fn with_config(config: StoreConfig) -> Self {
        match Self::try_with_config(config) {
            Ok(store) => store,
            Err(err) => panic!("invalid evanesce store configuration: {err}"),
        }
    }

    /// Creates a store with a custom configuration, rejecting invalid values
    pub fn try_with_config(config: StoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        tracing::debug!(
            sweep_threshold = config.sweep_threshold,
            ttl = ?config.ttl,
            "created memory store"
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                tables: RwLock::new(Tables::default()),
                sweeping: AtomicBool::new(false),
                config,
            }),
        })
    }

    /// Returns the configuration the store was built with
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Removes all expired entries right away
    ///
    /// Returns the number of entries removed. This is also done automatically
    /// in the background as writes accumulate.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// Returns the number of entries in the store (including expired ones
    /// that have not been purged yet)
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.tables.read().values.len()
    }

    /// Returns `true` if the store holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.tables.read().values.is_empty()
    }

    fn insert_at(&self, id: &str, value: Arc<[u8]>, created_at: Instant) {
        let sweep_due = {
            let mut tables = self.inner.tables.write();
            tables.insert(id, value, created_at);
            tables.writes += 1;
            if tables.writes <= self.inner.config.sweep_threshold {
                false
            } else {
                tables.writes = 0;
                true
            }
        };

        if sweep_due {
            self.schedule_sweep();
        }
    }

    /// Starts a background sweep unless one is already in flight.
    /// Never waits for the sweep.
    fn schedule_sweep(&self) {
        if self.inner.sweeping.swap(true, Ordering::AcqRel) {
            tracing::trace!("sweep already in flight");
            return;
        }

        let in_flight = InFlight(Arc::clone(&self.inner));
        // Resolved per sweep; a runtime seen earlier may have shut down
        match Handle::try_current() {
            Ok(handle) => {
                tracing::trace!("scheduling sweep on runtime blocking pool");
                handle.spawn_blocking(move || in_flight.run());
            }
            Err(_) => {
                tracing::trace!("scheduling sweep on a detached thread");
                let spawned = thread::Builder::new()
                    .name("evanesce-sweep".to_string())
                    .spawn(move || in_flight.run());
                if let Err(err) = spawned {
                    tracing::warn!("failed to spawn sweep thread, sweeping inline: {}", err);
                    self.inner.sweep();
                }
            }
        }
    }

    /// Removes `id` if it is still stale once exclusive access is held.
    /// A fresh write that landed in between is left alone.
    fn purge_if_stale(&self, id: &str) {
        let mut tables = self.inner.tables.write();
        if let Probe::Stale = tables.probe(id, Instant::now(), self.inner.config.ttl) {
            tables.remove(id);
        }
    }

    /// Stores a value whose lifetime started `age` ago (for testing purposes)
    #[cfg(test)]
    fn set_aged(&self, id: &str, value: &[u8], age: Duration) {
        let created_at = Instant::now()
            .checked_sub(age)
            .expect("age reaches past the monotonic clock origin");
        self.insert_at(id, Arc::from(value), created_at);
    }

    /// Drops the timestamp of `id` while keeping its value (for testing purposes)
    #[cfg(test)]
    fn forget_timestamp(&self, id: &str) {
        self.inner.tables.write().created.remove(id);
    }

    #[cfg(test)]
    fn pending_writes(&self) -> usize {
        self.inner.tables.read().writes
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn set(&self, id: &str, value: &[u8]) {
        tracing::trace!(id = truncate_id_for_log(id), len = value.len(), "set");
        self.insert_at(id, Arc::from(value), Instant::now());
    }

    fn get(&self, id: &str, clear: bool) -> Lookup {
        let now = Instant::now();
        let ttl = self.inner.config.ttl;

        let lookup = if clear {
            let mut tables = self.inner.tables.write();
            match tables.probe(id, now, ttl) {
                Probe::Missing => Lookup::NotFound,
                Probe::Stale => {
                    tables.remove(id);
                    Lookup::Expired
                }
                Probe::Live(value) => {
                    tables.remove(id);
                    Lookup::Found(value)
                }
            }
        } else {
            let probe = self.inner.tables.read().probe(id, now, ttl);
            match probe {
                Probe::Missing => Lookup::NotFound,
                Probe::Stale => {
                    self.purge_if_stale(id);
                    Lookup::Expired
                }
                Probe::Live(value) => Lookup::Found(value),
            }
        };

        if lookup.is_expired() {
            tracing::trace!(id = truncate_id_for_log(id), "purged expired entry on read");
        }
        lookup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const LONG_TTL_SECS: u64 = 30;
    const PAST_TTL: Duration = Duration::from_secs(LONG_TTL_SECS + 1);

    fn create_test_store(sweep_threshold: usize) -> MemoryStore {
        MemoryStore::with_config(
            StoreConfig::default()
                .with_sweep_threshold(sweep_threshold)
                .with_ttl_secs(LONG_TTL_SECS),
        )
    }

    fn found(bytes: &[u8]) -> Lookup {
        Lookup::Found(Arc::from(bytes))
    }

    /// Polls `condition` until it holds or two seconds pass
    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_get_never_written() {
        let store = create_test_store(100);

        assert_eq!(store.get("missing", false), Lookup::NotFound);
        assert_eq!(store.get("missing", true), Lookup::NotFound);
    }

    #[test]
    fn test_non_consuming_read_is_repeatable() {
        let store = create_test_store(100);
        store.set("id", &[1, 2, 3]);

        assert_eq!(store.get("id", false), found(&[1, 2, 3]));
        assert_eq!(store.get("id", false), found(&[1, 2, 3]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_consuming_read_removes_entry() {
        let store = create_test_store(100);
        store.set("x", &[9]);

        assert_eq!(store.get("x", true), found(&[9]));
        assert_eq!(store.get("x", true), Lookup::NotFound);
        assert_eq!(store.get("x", false), Lookup::NotFound);
        assert!(store.is_empty());
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let store = create_test_store(100);
        store.set("id", b"first");
        store.set("id", b"second");

        assert_eq!(store.get("id", false), found(b"second"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_overwrite_restarts_lifetime() {
        let store = create_test_store(100);
        store.set_aged("id", b"old", PAST_TTL);
        store.set("id", b"new");

        assert_eq!(store.get("id", false), found(b"new"));
    }

    #[test]
    fn test_expired_entry_is_purged_on_read() {
        let store = create_test_store(100);
        store.set_aged("id", b"stale", PAST_TTL);

        assert_eq!(store.get("id", false), Lookup::Expired);
        assert_eq!(store.get("id", false), Lookup::NotFound);
        assert!(store.is_empty());
    }

    #[test]
    fn test_expired_entry_is_purged_on_consuming_read() {
        let store = create_test_store(100);
        store.set_aged("id", b"stale", PAST_TTL);

        assert_eq!(store.get("id", true), Lookup::Expired);
        assert_eq!(store.get("id", true), Lookup::NotFound);
    }

    #[test]
    fn test_age_equal_to_ttl_is_expired() {
        let store = create_test_store(100);
        store.set_aged("id", b"edge", Duration::from_secs(LONG_TTL_SECS));

        assert_eq!(store.get("id", false), Lookup::Expired);
    }

    #[test]
    fn test_value_without_timestamp_reports_expired() {
        let store = create_test_store(100);
        store.set("id", b"orphan");
        store.forget_timestamp("id");

        assert_eq!(store.get("id", false), Lookup::Expired);
        assert_eq!(store.get("id", false), Lookup::NotFound);
        assert!(store.is_empty());
    }

    #[test]
    fn test_sweep_removes_orphaned_values() {
        let store = create_test_store(100);
        store.set("orphan", b"1");
        store.set("kept", b"2");
        store.forget_timestamp("orphan");

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.get("kept", false), found(b"2"));
    }

    #[test]
    fn test_manual_sweep() {
        let store = create_test_store(100);
        store.set_aged("expired1", b"1", PAST_TTL);
        store.set_aged("expired2", b"2", PAST_TTL);
        store.set("valid", b"3");

        assert_eq!(store.sweep(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("expired1", false), Lookup::NotFound);
        assert_eq!(store.get("valid", false), found(b"3"));
    }

    #[test]
    fn test_sweep_resets_write_counter() {
        let store = create_test_store(100);
        store.set("a", b"1");
        store.set("b", b"2");
        assert_eq!(store.pending_writes(), 2);

        store.sweep();
        assert_eq!(store.pending_writes(), 0);
    }

    #[test]
    fn test_crossing_threshold_resets_counter() {
        let store = create_test_store(2);
        store.set("a", b"1");
        store.set("b", b"2");
        assert_eq!(store.pending_writes(), 2);

        store.set("c", b"3");
        assert_eq!(store.pending_writes(), 0);

        store.set("d", b"4");
        assert_eq!(store.pending_writes(), 1);
    }

    #[test]
    fn test_background_sweep_on_thread() {
        let store = create_test_store(3);
        store.set_aged("old1", b"1", PAST_TTL);
        store.set_aged("old2", b"2", PAST_TTL);
        store.set_aged("old3", b"3", PAST_TTL);
        // Three writes do not exceed the threshold
        assert_eq!(store.len(), 3);

        store.set("fresh", b"4");

        assert!(wait_until(|| store.len() == 1));
        assert_eq!(store.get("fresh", false), found(b"4"));
        assert_eq!(store.get("old1", false), Lookup::NotFound);
        assert_eq!(store.get("old3", false), Lookup::NotFound);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_background_sweep_on_runtime() {
        let store = create_test_store(1);
        store.set_aged("old", b"1", PAST_TTL);
        store.set("fresh", b"2");

        let mut swept = false;
        for _ in 0..200 {
            if store.len() == 1 {
                swept = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(swept, "background sweep did not run");
        assert_eq!(store.get("fresh", false), found(b"2"));
        assert_eq!(store.get("old", false), Lookup::NotFound);
    }

    #[test]
    fn test_sweep_runs_after_construction_runtime_shuts_down() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let store = rt.block_on(async { create_test_store(2) });
        drop(rt);

        // The third write crosses the threshold
        store.set_aged("old0", b"1", PAST_TTL);
        store.set_aged("old1", b"1", PAST_TTL);
        store.set_aged("old2", b"1", PAST_TTL);
        store.set("fresh", b"2");

        assert!(wait_until(|| store.len() == 1), "no sweep ran after the runtime shut down");
        assert_eq!(store.get("fresh", false), found(b"2"));
        assert_eq!(store.get("old0", false), Lookup::NotFound);
    }

    #[test]
    fn test_sweep_in_flight_absorbs_triggers() {
        let store = create_test_store(2);
        store.inner.sweeping.store(true, Ordering::Release);

        store.set_aged("old1", b"1", PAST_TTL);
        store.set_aged("old2", b"2", PAST_TTL);
        store.set_aged("old3", b"3", PAST_TTL);
        assert_eq!(store.pending_writes(), 0);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(store.len(), 3);

        store.inner.sweeping.store(false, Ordering::Release);
        store.set("a", b"a");
        store.set("b", b"b");
        store.set("c", b"c");

        assert!(wait_until(|| store.len() == 3));
        assert_eq!(store.get("old1", false), Lookup::NotFound);
        assert!(wait_until(|| !store.inner.sweeping.load(Ordering::Acquire)));
    }

    #[test]
    fn test_short_ttl_scenario() {
        let store = MemoryStore::with_config(
            StoreConfig::default().with_sweep_threshold(2).with_ttl_secs(1),
        );

        store.set("a", &[1, 2, 3]);
        assert_eq!(store.get("a", false), found(&[1, 2, 3]));
        store.set("b", &[4, 5]);
        store.set("c", &[6]);

        thread::sleep(Duration::from_millis(1200));

        assert_eq!(store.get("a", false), Lookup::Expired);
        assert_eq!(store.get("b", false), Lookup::Expired);
        assert_eq!(store.get("d", false), Lookup::NotFound);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let zero_threshold = StoreConfig::default().with_sweep_threshold(0);
        assert!(matches!(
            MemoryStore::try_with_config(zero_threshold),
            Err(ConfigError::ZeroSweepThreshold)
        ));

        let zero_ttl = StoreConfig::default().with_ttl(Duration::ZERO);
        assert!(matches!(
            MemoryStore::try_with_config(zero_ttl),
            Err(ConfigError::ZeroTtl)
        ));
    }

    #[test]
    #[should_panic(expected = "invalid evanesce store configuration")]
    fn test_with_config_panics_on_invalid_config() {
        let _ = MemoryStore::with_config(StoreConfig::default().with_ttl_secs(0));
    }

    #[test]
    fn test_clone_shares_data() {
        let store1 = create_test_store(100);
        let store2 = store1.clone();

        store1.set("id", b"shared");
        assert_eq!(store2.get("id", true), found(b"shared"));
        assert_eq!(store1.get("id", false), Lookup::NotFound);
    }

    #[test]
    fn test_usable_as_trait_object() {
        let store: Arc<dyn Store> = Arc::new(create_test_store(100));
        store.set("id", b"dyn");

        assert_eq!(store.get("id", false), found(b"dyn"));
    }

    #[test]
    fn test_truncate_id_for_log() {
        assert_eq!(truncate_id_for_log("short"), "short");
        assert_eq!(
            truncate_id_for_log("0123456789abcdefXYZ"),
            "0123456789abcdef"
        );
        assert_eq!(truncate_id_for_log("ééééééééééééééééé").chars().count(), 16);
    }

    #[test]
    fn test_concurrent_writes_keep_pairs_intact() {
        let store = Arc::new(create_test_store(10));
        let mut handles = vec![];

        // 10 threads writing 100 ids each, with sweeps running in between
        for thread_id in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let id = format!("thread{}:id{}", thread_id, i);
                    store.set(&id, id.as_bytes());
                }
            }));
        }
        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        let mut handles = vec![];
        for thread_id in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let id = format!("thread{}:id{}", thread_id, i);
                    assert_eq!(store.get(&id, false), Lookup::Found(Arc::from(id.as_bytes())));
                }
            }));
        }
        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(store.len(), 1000);
    }

    #[test]
    fn test_concurrent_consuming_reads_yield_one_winner() {
        let store = Arc::new(create_test_store(100));
        store.set("token", b"secret");

        let winners = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let winners = Arc::clone(&winners);
            handles.push(thread::spawn(move || match store.get("token", true) {
                Lookup::Found(_) => {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
                other => assert_eq!(other, Lookup::NotFound),
            }));
        }
        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_reads_of_expired_entry() {
        let store = Arc::new(create_test_store(100));
        store.set_aged("stale", b"1", PAST_TTL);

        let mut handles = vec![];
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let lookup = store.get("stale", false);
                assert!(
                    lookup.is_expired() || lookup.is_not_found(),
                    "unexpected {:?}",
                    lookup
                );
            }));
        }
        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(store.get("stale", false), Lookup::NotFound);
    }

    #[test]
    fn test_concurrent_writes_to_same_id() {
        let store = Arc::new(create_test_store(5));
        let mut handles = vec![];

        for thread_id in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let value = format!("thread{}:iteration{}", thread_id, i);
                    store.set("contested", value.as_bytes());
                }
            }));
        }
        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(store.len(), 1);
        let value = store.get("contested", false).into_value().expect("entry should be live");
        assert!(value.starts_with(b"thread"));
    }
}
