//! Thread-safe transaction store

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::transaction::{ResponseMetadata, TransactionId, TransactionRecord, TransactionState};
use crate::{CaptureError, Result};

use super::UrlFilter;

/// Point-in-time copy of the store counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Records admitted
    pub admitted: usize,
    /// Admissions rejected as duplicates
    pub duplicates: usize,
    /// Admissions rejected by the URL filter
    pub filtered: usize,
    /// Records evicted to respect capacity
    pub evicted: usize,
    /// Records removed by id
    pub removed: usize,
    /// Updates that completed a record
    pub completed: usize,
    /// Updates that failed a record
    pub failed: usize,
    /// Resets performed
    pub resets: usize,
}

/// Diagnostic counters
///
/// Updated outside the records lock, so they may briefly lag the contents.
#[derive(Default)]
struct Counters {
    admitted: AtomicUsize,
    duplicates: AtomicUsize,
    filtered: AtomicUsize,
    evicted: AtomicUsize,
    removed: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    resets: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize, by: usize) {
        if by > 0 {
            counter.fetch_add(by, Ordering::Relaxed);
        }
    }

    fn load(&self) -> StoreStats {
        StoreStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }
}

/// Records guarded by the store lock
///
/// `records` is keyed by admission sequence, so iteration order is admission
/// order and the first entry is always the oldest. `index` maps every stored
/// id to its sequence number; both always hold the same set of ids.
#[derive(Default)]
struct Records {
    records: BTreeMap<u64, TransactionRecord>,
    index: HashMap<TransactionId, u64>,
    next_seq: u64,
    capacity: usize,
}

impl Records {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn get_mut(&mut self, id: &TransactionId) -> Option<&mut TransactionRecord> {
        let seq = self.index.get(id)?;
        self.records.get_mut(seq)
    }

    fn push(&mut self, record: TransactionRecord) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(record.id(), seq);
        self.records.insert(seq, record);
    }

    fn remove(&mut self, id: &TransactionId) -> Option<TransactionRecord> {
        let seq = self.index.remove(id)?;
        self.records.remove(&seq)
    }

    /// Drop oldest records until the capacity bound holds
    fn evict_overflow(&mut self) -> Vec<TransactionId> {
        let mut evicted = Vec::new();
        if self.capacity == 0 {
            return evicted;
        }

        while self.records.len() > self.capacity {
            let Some((_, record)) = self.records.pop_first() else {
                break;
            };
            self.index.remove(&record.id());
            evicted.push(record.id());
        }

        evicted
    }

    fn clear(&mut self) -> usize {
        let cleared = self.records.len();
        self.records.clear();
        self.index.clear();
        cleared
    }
}

/// Shared store of captured HTTP transactions
///
/// Every operation takes the single records lock for a bounded, I/O-free
/// critical section, so all of them are linearizable. Callers share the store
/// through an `Arc` and only ever receive copies of records.
pub struct TransactionStore {
    inner: RwLock<Records>,
    filter: UrlFilter,
    max_body_size: usize,
    counters: Counters,
}

impl TransactionStore {
    /// Create an unbounded store with no URL filter or body limit
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a store retaining at most `capacity` records (0 = unbounded)
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Records {
                capacity,
                ..Records::default()
            }),
            filter: UrlFilter::default(),
            max_body_size: 0,
            counters: Counters::default(),
        }
    }

    /// Create a store from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::configured(config))
    }

    /// Build from an already validated configuration
    pub(crate) fn configured(config: &StoreConfig) -> Self {
        Self {
            filter: UrlFilter::from_config(config),
            max_body_size: config.max_body_size,
            ..Self::with_capacity(config.capacity)
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Records> {
        // Critical sections never leave the records half-updated, so a
        // poisoned lock still guards consistent data.
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Records> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a new transaction at the tail
    ///
    /// Returns `false` if the id is already stored or the URL filter refuses
    /// the record; the store is unchanged in that case.
    pub fn admit(&self, record: TransactionRecord) -> bool {
        self.try_admit(record).is_ok()
    }

    /// Admit a new transaction, evicting the oldest records if over capacity
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Filtered`] if the URL filter refuses the
    /// record, or [`CaptureError::DuplicateId`] if the id is already stored
    pub fn try_admit(&self, mut record: TransactionRecord) -> Result<()> {
        let id = record.id();

        if !self.filter.allows(&record.request().url) {
            Counters::bump(&self.counters.filtered, 1);
            debug!("Filtered transaction {}: {}", id.short(), record.request().url);
            return Err(CaptureError::Filtered {
                id,
                url: record.request().url.clone(),
            });
        }

        record.truncate_request_body(self.max_body_size);

        let (evicted, len) = {
            let mut inner = self.write();
            if inner.index.contains_key(&id) {
                drop(inner);
                Counters::bump(&self.counters.duplicates, 1);
                debug!("Rejected duplicate transaction {}", id.short());
                return Err(CaptureError::DuplicateId(id));
            }

            inner.push(record);
            let evicted = inner.evict_overflow();
            (evicted, inner.len())
        };

        Counters::bump(&self.counters.admitted, 1);
        Counters::bump(&self.counters.evicted, evicted.len());

        for old in &evicted {
            debug!("Evicted transaction {}", old.short());
        }
        debug!("Admitted transaction {} (count: {})", id.short(), len);

        Ok(())
    }

    /// Attach the response to a pending transaction
    ///
    /// Returns `false` if the id is unknown or the transaction already
    /// completed or failed.
    pub fn update(&self, id: TransactionId, response: ResponseMetadata) -> bool {
        self.try_update(id, response).is_ok()
    }

    /// Attach the response to a pending transaction, returning its new state
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::UnknownId`] if no record has this id, or
    /// [`CaptureError::AlreadyTerminal`] if it already has a response
    pub fn try_update(
        &self,
        id: TransactionId,
        mut response: ResponseMetadata,
    ) -> Result<TransactionState> {
        response.body.truncate(self.max_body_size);
        let state = response.state();

        let applied = self
            .write()
            .get_mut(&id)
            .map(|record| record.complete(response));

        match applied {
            None => {
                debug!("Update for unknown transaction {}", id.short());
                return Err(CaptureError::UnknownId(id));
            }
            Some(false) => {
                debug!("Update for terminal transaction {}", id.short());
                return Err(CaptureError::AlreadyTerminal(id));
            }
            Some(true) => {}
        }

        match state {
            TransactionState::Failed => Counters::bump(&self.counters.failed, 1),
            _ => Counters::bump(&self.counters.completed, 1),
        }
        debug!("Transaction {} -> {:?}", id.short(), state);

        Ok(state)
    }

    /// Remove a transaction by id
    ///
    /// Returns whether a record was deleted. Remaining records keep their
    /// relative order.
    pub fn remove(&self, id: TransactionId) -> bool {
        self.try_remove(id).is_ok()
    }

    /// Remove a transaction by id, returning it
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::UnknownId`] if no record has this id
    pub fn try_remove(&self, id: TransactionId) -> Result<TransactionRecord> {
        let removed = self.write().remove(&id);

        match removed {
            Some(record) => {
                Counters::bump(&self.counters.removed, 1);
                debug!("Removed transaction {}", id.short());
                Ok(record)
            }
            None => Err(CaptureError::UnknownId(id)),
        }
    }

    /// Clear all transactions atomically
    pub fn reset(&self) {
        let cleared = self.write().clear();
        Counters::bump(&self.counters.resets, 1);
        info!("Reset transaction store ({} cleared)", cleared);
    }

    /// Number of stored transactions
    #[must_use]
    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Whether the store holds no transactions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Number of stored transactions still awaiting a response
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.read()
            .records
            .values()
            .filter(|record| !record.is_terminal())
            .count()
    }

    /// Copy of all transactions, oldest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<TransactionRecord> {
        self.read().records.values().cloned().collect()
    }

    /// Copy of the transactions matching `predicate`, oldest first
    #[must_use]
    pub fn snapshot_where<F>(&self, predicate: F) -> Vec<TransactionRecord>
    where
        F: Fn(&TransactionRecord) -> bool,
    {
        self.read()
            .records
            .values()
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }

    /// Transactions whose URL or method contains `query` (case-insensitive)
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<TransactionRecord> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.snapshot();
        }

        self.snapshot_where(|record| {
            let request = record.request();
            request.url.to_lowercase().contains(&query)
                || request.method.to_lowercase().contains(&query)
        })
    }

    /// Copy of one transaction
    #[must_use]
    pub fn get(&self, id: TransactionId) -> Option<TransactionRecord> {
        let inner = self.read();
        let seq = inner.index.get(&id)?;
        inner.records.get(seq).cloned()
    }

    /// Whether a transaction with this id is stored
    #[must_use]
    pub fn contains(&self, id: TransactionId) -> bool {
        self.read().index.contains_key(&id)
    }

    /// Current capacity bound (0 = unbounded)
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.read().capacity
    }

    /// Change the capacity bound, evicting the oldest records if it shrank
    ///
    /// Returns the number of records evicted.
    pub fn set_capacity(&self, capacity: usize) -> usize {
        let evicted = {
            let mut inner = self.write();
            inner.capacity = capacity;
            inner.evict_overflow()
        };

        Counters::bump(&self.counters.evicted, evicted.len());
        info!(
            "Capacity set to {} ({} evicted)",
            capacity,
            evicted.len()
        );

        evicted.len()
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.counters.load()
    }
}

impl Default for TransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::RequestMetadata;

    fn record(path: &str) -> TransactionRecord {
        TransactionRecord::new(RequestMetadata::new(
            "GET",
            format!("https://api.example.com{path}"),
        ))
    }

    fn paths(records: &[TransactionRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.request().url.trim_start_matches("https://api.example.com").to_string())
            .collect()
    }

    #[test]
    fn test_store_creation() {
        let store = TransactionStore::new();

        assert_eq!(store.count(), 0);
        assert_eq!(store.capacity(), 0);
        assert!(store.is_empty());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_admit_preserves_order() {
        let store = TransactionStore::new();

        for path in ["/a", "/b", "/c"] {
            assert!(store.admit(record(path)));
        }

        assert_eq!(paths(&store.snapshot()), vec!["/a", "/b", "/c"]);
        assert_eq!(store.stats().admitted, 3);
    }

    #[test]
    fn test_admit_duplicate() {
        let store = TransactionStore::new();
        let a = record("/a");

        assert!(store.admit(a.clone()));
        assert!(store.admit(record("/b")));
        assert!(!store.admit(a.clone()));

        assert!(matches!(
            store.try_admit(a),
            Err(CaptureError::DuplicateId(_))
        ));
        assert_eq!(store.count(), 2);
        assert_eq!(paths(&store.snapshot()), vec!["/a", "/b"]);
        assert_eq!(store.stats().duplicates, 2);
    }

    #[test]
    fn test_capacity_eviction() {
        let store = TransactionStore::with_capacity(3);

        for path in ["/a", "/b", "/c", "/d", "/e"] {
            assert!(store.admit(record(path)));
        }

        assert_eq!(store.count(), 3);
        assert_eq!(paths(&store.snapshot()), vec!["/c", "/d", "/e"]);
        assert_eq!(store.stats().evicted, 2);
    }

    #[test]
    fn test_evicted_id_can_be_admitted_again() {
        let store = TransactionStore::with_capacity(1);
        let a = record("/a");

        assert!(store.admit(a.clone()));
        assert!(store.admit(record("/b")));
        assert!(!store.contains(a.id()));
        assert!(store.admit(a));
    }

    #[test]
    fn test_set_capacity_shrinks() {
        let store = TransactionStore::new();
        for path in ["/a", "/b", "/c", "/d"] {
            store.admit(record(path));
        }

        assert_eq!(store.set_capacity(2), 2);
        assert_eq!(paths(&store.snapshot()), vec!["/c", "/d"]);

        assert_eq!(store.set_capacity(0), 0);
        store.admit(record("/e"));
        assert_eq!(store.count(), 3);
    }

    #[test]
    fn test_update_terminal() {
        let store = TransactionStore::new();
        let a = record("/a");
        let id = a.id();
        store.admit(a);

        let first = ResponseMetadata::completed(200).with_body(&b"ok"[..]);
        assert!(store.update(id, first.clone()));
        assert!(!store.update(id, ResponseMetadata::completed(500)));
        assert!(matches!(
            store.try_update(id, ResponseMetadata::failed("late")),
            Err(CaptureError::AlreadyTerminal(_))
        ));

        let stored = store.get(id).unwrap();
        assert_eq!(stored.response(), Some(&first));
        assert_eq!(stored.state(), TransactionState::Completed);
        assert_eq!(store.stats().completed, 1);
    }

    #[test]
    fn test_update_failed() {
        let store = TransactionStore::new();
        let a = record("/a");
        let id = a.id();
        store.admit(a);

        let state = store
            .try_update(id, ResponseMetadata::failed("connection refused"))
            .unwrap();

        assert_eq!(state, TransactionState::Failed);
        assert_eq!(store.stats().failed, 1);
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn test_update_unknown() {
        let store = TransactionStore::new();
        let id = TransactionId::from_bytes([9; 16]);

        assert!(!store.update(id, ResponseMetadata::completed(200)));
        assert!(matches!(
            store.try_update(id, ResponseMetadata::completed(200)),
            Err(CaptureError::UnknownId(_))
        ));
    }

    #[test]
    fn test_remove_keeps_order() {
        let store = TransactionStore::new();
        let b = record("/b");
        let b_id = b.id();

        store.admit(record("/a"));
        store.admit(b);
        store.admit(record("/c"));

        assert!(store.remove(b_id));
        assert!(!store.remove(b_id));
        assert_eq!(paths(&store.snapshot()), vec!["/a", "/c"]);
        assert_eq!(store.stats().removed, 1);
    }

    #[test]
    fn test_try_remove_returns_record() {
        let store = TransactionStore::new();
        let a = record("/a");
        let id = a.id();
        store.admit(a);

        let removed = store.try_remove(id).unwrap();
        assert_eq!(removed.id(), id);
        assert!(store.try_remove(id).is_err());
    }

    #[test]
    fn test_reset() {
        let store = TransactionStore::with_capacity(10);
        for path in ["/a", "/b"] {
            store.admit(record(path));
        }

        store.reset();
        assert_eq!(store.count(), 0);
        store.reset();
        assert_eq!(store.count(), 0);
        assert!(store.snapshot().is_empty());
        assert_eq!(store.capacity(), 10);
        assert_eq!(store.stats().resets, 2);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let store = TransactionStore::new();
        let a = record("/a");
        let id = a.id();
        store.admit(a);

        let before = store.snapshot();
        store.update(id, ResponseMetadata::completed(201));
        store.admit(record("/b"));

        assert_eq!(before.len(), 1);
        assert_eq!(before[0].state(), TransactionState::Pending);
        assert_eq!(store.get(id).unwrap().state(), TransactionState::Completed);
    }

    #[test]
    fn test_search() {
        let store = TransactionStore::new();
        store.admit(record("/users"));
        store.admit(TransactionRecord::new(RequestMetadata::new(
            "POST",
            "https://api.example.com/orders",
        )));
        store.admit(record("/Users/42"));

        assert_eq!(paths(&store.search("users")), vec!["/users", "/Users/42"]);
        assert_eq!(paths(&store.search("post")), vec!["/orders"]);
        assert_eq!(store.search("  ").len(), 3);
        assert!(store.search("nothing").is_empty());
    }

    #[test]
    fn test_filtered_admission() {
        let config = StoreConfig {
            ignored_urls: vec!["/health".to_string()],
            ..StoreConfig::unbounded()
        };
        let store = TransactionStore::from_config(&config).unwrap();

        assert!(!store.admit(record("/health")));
        assert!(store.admit(record("/users")));
        assert_eq!(store.count(), 1);
        assert_eq!(store.stats().filtered, 1);
    }

    #[test]
    fn test_body_limit() {
        let config = StoreConfig {
            max_body_size: 4,
            ..StoreConfig::unbounded()
        };
        let store = TransactionStore::from_config(&config).unwrap();

        let a = TransactionRecord::new(
            RequestMetadata::new("POST", "https://api.example.com/upload")
                .with_body(vec![0u8; 64]),
        );
        let id = a.id();
        store.admit(a);
        store.update(
            id,
            ResponseMetadata::completed(200).with_body(&b"accepted"[..]),
        );

        let stored = store.get(id).unwrap();
        assert!(stored.request().body.is_truncated());
        assert_eq!(stored.request().body.len(), 64);
        assert_eq!(stored.request().body.data().len(), 4);
        assert_eq!(&stored.response().unwrap().body.data()[..], b"acce");
    }
}
