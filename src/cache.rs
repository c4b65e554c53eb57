//! Fixed-pool response cache.
//!
//! A bounded pool of URI-keyed slots. Each slot pairs a readers-writer
//! lock around its key and payload with a relaxed atomic `last_visit`
//! stamp fed by a process-wide logical clock. Lookups walk the pool
//! under read locks and lend the payload out through a guard; stores
//! serialize on one global mutex, overwrite the least-recently-visited
//! slot, and then clear further stale slots until the total payload
//! bytes fit the budget again.
//!
//! The recency stamps are deliberately unsynchronized beyond atomicity:
//! concurrent hits may race their stamps, so eviction is approximate
//! LRU. Selection only has to terminate on some occupied slot.

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, RwLock};
use tracing::debug;
use xxhash_rust::xxh64::xxh64;

use crate::{CACHE_SLOTS, MAX_CACHE_BYTES, MAX_OBJECT_SIZE, MAX_URI_LEN};

/// Keyed payload storage, only touched under the slot's lock.
#[derive(Default)]
struct Slot {
    /// Cache key: the exact absolute-form URI. Empty means unoccupied.
    key: String,
    /// xxh64 of `key`, compared before the full string.
    key_hash: u64,
    payload: Bytes,
}

impl Slot {
    fn is_occupied(&self) -> bool {
        !self.key.is_empty()
    }

    fn clear(&mut self) {
        self.key.clear();
        self.key_hash = 0;
        self.payload = Bytes::new();
    }
}

struct Entry {
    slot: Arc<RwLock<Slot>>,
    /// Logical-clock stamp of the last hit or store; 0 = unoccupied.
    last_visit: AtomicU64,
}

struct Shared {
    entries: Vec<Entry>,
    clock: AtomicU64,
    total_bytes: AtomicUsize,
    /// Serializes stores so victim selection, payload replacement, and
    /// byte accounting are atomic with respect to other writers.
    store_lock: Mutex<()>,
}

/// Shared handle to the response cache. Clones are cheap and refer to
/// the same pool.
#[derive(Clone)]
pub struct ProxyCache {
    shared: Arc<Shared>,
}

/// A successful lookup. Borrows the cached payload; the slot stays
/// read-locked (writers excluded) until this is dropped.
pub struct CacheHit {
    guard: OwnedRwLockReadGuard<Slot>,
}

impl CacheHit {
    pub fn payload(&self) -> &[u8] {
        &self.guard.payload
    }

    pub fn len(&self) -> usize {
        self.guard.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.payload.is_empty()
    }
}

impl ProxyCache {
    pub fn new() -> Self {
        Self::with_slots(CACHE_SLOTS)
    }

    /// Pool with a custom slot count, used by tests that need small
    /// pools to force eviction.
    pub fn with_slots(slots: usize) -> Self {
        assert!(slots > 0, "cache needs at least one slot");
        let entries = (0..slots)
            .map(|_| Entry {
                slot: Arc::new(RwLock::new(Slot::default())),
                last_visit: AtomicU64::new(0),
            })
            .collect();
        Self {
            shared: Arc::new(Shared {
                entries,
                clock: AtomicU64::new(0),
                total_bytes: AtomicUsize::new(0),
                store_lock: Mutex::new(()),
            }),
        }
    }

    /// Find `uri` in the pool. On a hit the returned guard keeps the
    /// payload immutable and resident until it is dropped.
    pub async fn lookup(&self, uri: &str) -> Option<CacheHit> {
        let stamp = self.tick();
        let wanted = xxh64(uri.as_bytes(), 0);
        for entry in &self.shared.entries {
            let guard = Arc::clone(&entry.slot).read_owned().await;
            if guard.is_occupied() && guard.key_hash == wanted && guard.key == uri {
                entry.last_visit.store(stamp, Ordering::Relaxed);
                return Some(CacheHit { guard });
            }
            // Not this slot; the guard drops and the walk moves on.
        }
        None
    }

    /// Insert `payload` under `uri`, taking ownership. Returns false
    /// for payloads the size policy excludes (empty, over
    /// [`MAX_OBJECT_SIZE`]) or keys at [`MAX_URI_LEN`] and beyond.
    ///
    /// Duplicate keys are not coalesced: storing the same URI twice
    /// occupies two slots and lookups serve the earlier one.
    pub async fn store(&self, uri: &str, payload: Bytes) -> bool {
        if payload.is_empty() || payload.len() > MAX_OBJECT_SIZE {
            return false;
        }
        if uri.is_empty() || uri.len() >= MAX_URI_LEN {
            return false;
        }

        let _writer = self.shared.store_lock.lock().await;
        let stamp = self.tick();
        let size = payload.len();
        let idx = self.victim_index();
        {
            let mut slot = self.shared.entries[idx].slot.write().await;
            if slot.is_occupied() {
                debug!("evicting {}", slot.key);
                self.shared
                    .total_bytes
                    .fetch_sub(slot.payload.len(), Ordering::Relaxed);
            }
            slot.key.clear();
            slot.key.push_str(uri);
            slot.key_hash = xxh64(uri.as_bytes(), 0);
            slot.payload = payload;
            self.shared.total_bytes.fetch_add(size, Ordering::Relaxed);
            self.shared.entries[idx]
                .last_visit
                .store(stamp, Ordering::Relaxed);
        }

        // The slot count alone can exceed the byte budget, so shed the
        // stalest remaining entries until the total fits again.
        while self.shared.total_bytes.load(Ordering::Relaxed) > MAX_CACHE_BYTES {
            let Some(victim) = self.victim_excluding(idx) else {
                break;
            };
            let mut slot = self.shared.entries[victim].slot.write().await;
            if slot.is_occupied() {
                debug!("evicting {} over byte budget", slot.key);
                self.shared
                    .total_bytes
                    .fetch_sub(slot.payload.len(), Ordering::Relaxed);
                slot.clear();
            }
            self.shared.entries[victim]
                .last_visit
                .store(0, Ordering::Relaxed);
        }

        debug!("cached {uri} ({size} bytes)");
        true
    }

    /// Sum of cached payload lengths.
    pub fn total_bytes(&self) -> usize {
        self.shared.total_bytes.load(Ordering::Relaxed)
    }

    /// Number of occupied slots.
    pub async fn occupied(&self) -> usize {
        let mut n = 0;
        for entry in &self.shared.entries {
            if entry.slot.read().await.is_occupied() {
                n += 1;
            }
        }
        n
    }

    pub async fn is_empty(&self) -> bool {
        self.occupied().await == 0
    }

    fn tick(&self) -> u64 {
        self.shared.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Slot with the smallest `last_visit`, ties broken by position.
    /// Unoccupied slots sit at 0 and win first.
    fn victim_index(&self) -> usize {
        self.shared
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.last_visit.load(Ordering::Relaxed))
            .map(|(i, _)| i)
            .expect("cache has at least one slot")
    }

    /// Stalest occupied slot other than `keep`, if any.
    fn victim_excluding(&self, keep: usize) -> Option<usize> {
        self.shared
            .entries
            .iter()
            .enumerate()
            .filter(|(i, e)| *i != keep && e.last_visit.load(Ordering::Relaxed) > 0)
            .min_by_key(|(_, e)| e.last_visit.load(Ordering::Relaxed))
            .map(|(i, _)| i)
    }
}

impl Default for ProxyCache {
    fn default() -> Self {
        Self::new()
    }
}
