//! A concurrent, capacity-bounded LRU cache keyed by opaque bytes.
//!
//! The cache is split into shards selected by the high bits of the key hash;
//! each shard is an independent mutex-protected LRU, so concurrency scales
//! with the shard count. `insert` and `lookup` hand back an `Arc<T>` that acts
//! as the handle: an entry evicted or erased while handles are outstanding
//! stays alive (and no longer counts against capacity) until the last handle
//! is dropped, at which point the value's `Drop` runs exactly once.

use std::collections::VecDeque;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use foldhash::{HashMap, HashMapExt};
use parking_lot::Mutex;

const DEFAULT_SHARD_BITS: u32 = 4;

struct Entry<T> {
    value: Arc<T>,
    charge: usize,
    stamp: u64,
}

/// One mutex-protected LRU. Recency is a stamped queue with lazy
/// invalidation: every access pushes a fresh `(key, stamp)` pair and eviction
/// skips pairs whose stamp no longer matches the live entry.
struct Shard<T> {
    capacity: usize,
    usage: usize,
    table: HashMap<Vec<u8>, Entry<T>>,
    recency: VecDeque<(Vec<u8>, u64)>,
    next_stamp: u64,
}

impl<T> Shard<T> {
    fn new(capacity: usize) -> Shard<T> {
        Shard {
            capacity,
            usage: 0,
            table: HashMap::new(),
            recency: VecDeque::new(),
            next_stamp: 0,
        }
    }

    fn bump(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    fn lookup(&mut self, key: &[u8]) -> Option<Arc<T>> {
        let stamp = self.bump();
        let entry = self.table.get_mut(key)?;
        entry.stamp = stamp;
        let value = entry.value.clone();
        self.recency.push_back((key.to_vec(), stamp));
        self.maybe_compact();
        Some(value)
    }

    fn insert(&mut self, key: &[u8], value: T, charge: usize) -> Arc<T> {
        let stamp = self.bump();
        let value = Arc::new(value);
        let entry = Entry {
            value: value.clone(),
            charge,
            stamp,
        };
        // Last arrival wins: a replaced value leaves the table immediately
        // and drops once its outstanding handles are released.
        if let Some(old) = self.table.insert(key.to_vec(), entry) {
            self.usage -= old.charge;
        }
        self.usage += charge;
        self.recency.push_back((key.to_vec(), stamp));
        self.evict();
        self.maybe_compact();
        value
    }

    fn erase(&mut self, key: &[u8]) {
        if let Some(entry) = self.table.remove(key) {
            self.usage -= entry.charge;
        }
    }

    fn evict(&mut self) {
        while self.usage > self.capacity {
            let Some((key, stamp)) = self.recency.pop_front() else {
                break;
            };
            match self.table.get(&key) {
                Some(entry) if entry.stamp == stamp => {
                    let charge = entry.charge;
                    self.table.remove(&key);
                    self.usage -= charge;
                }
                // Stale queue entry; the key was re-accessed or removed.
                _ => {}
            }
        }
    }

    fn prune(&mut self) {
        let mut released = 0usize;
        self.table.retain(|_, entry| {
            // strong count 1 means the table holds the only reference.
            if Arc::strong_count(&entry.value) > 1 {
                true
            } else {
                released += entry.charge;
                false
            }
        });
        self.usage -= released;
    }

    fn maybe_compact(&mut self) {
        if self.recency.len() > 4 * self.table.len().max(16) {
            let table = &self.table;
            self.recency
                .retain(|(key, stamp)| table.get(key).is_some_and(|e| e.stamp == *stamp));
        }
    }
}

pub struct ShardedCache<T> {
    shards: Vec<Mutex<Shard<T>>>,
    hasher: foldhash::fast::RandomState,
    shard_bits: u32,
}

impl<T> ShardedCache<T> {
    /// A cache with the default 16 shards; `capacity` is the total charge
    /// allowance, divided evenly between shards (rounded up).
    pub fn new(capacity: usize) -> ShardedCache<T> {
        ShardedCache::with_shard_bits(capacity, DEFAULT_SHARD_BITS)
    }

    pub fn with_shard_bits(capacity: usize, shard_bits: u32) -> ShardedCache<T> {
        assert!(shard_bits <= 10, "unreasonable shard count");
        let num_shards = 1usize << shard_bits;
        let per_shard = capacity.div_ceil(num_shards);
        let shards = (0..num_shards)
            .map(|_| Mutex::new(Shard::new(per_shard)))
            .collect();
        ShardedCache {
            shards,
            hasher: foldhash::fast::RandomState::default(),
            shard_bits,
        }
    }

    fn shard(&self, key: &[u8]) -> &Mutex<Shard<T>> {
        let idx = if self.shard_bits == 0 {
            0
        } else {
            (self.hasher.hash_one(key) >> (64 - self.shard_bits)) as usize
        };
        &self.shards[idx]
    }

    /// Inserts `value` under `key` with the given charge and returns a handle
    /// to it. The handle counts as one external reference; dropping it
    /// releases the reference.
    pub fn insert(&self, key: &[u8], value: T, charge: usize) -> Arc<T> {
        self.shard(key).lock().insert(key, value, charge)
    }

    /// Returns a handle to the cached value, or `None`. A hit refreshes the
    /// entry's recency.
    pub fn lookup(&self, key: &[u8]) -> Option<Arc<T>> {
        self.shard(key).lock().lookup(key)
    }

    /// Drops the entry for `key` if present. Outstanding handles keep the
    /// value alive.
    pub fn erase(&self, key: &[u8]) {
        self.shard(key).lock().erase(key);
    }

    /// Removes every entry that has no outstanding handles.
    pub fn prune(&self) {
        for shard in &self.shards {
            shard.lock().prune();
        }
    }

    /// Total charge of all entries currently in the cache.
    pub fn total_charge(&self) -> usize {
        self.shards.iter().map(|s| s.lock().usage).sum()
    }

    /// A process-wide unique id, used to prefix cache keys so that multiple
    /// files sharing one cache cannot collide.
    pub fn new_id(&self) -> u64 {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        NEXT_ID.fetch_add(1, Ordering::Relaxed)
    }
}
