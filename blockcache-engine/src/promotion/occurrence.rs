//! Occurrence table
//!
//! Bounded set of per-key miss counters used by the N-hit promotion policy.
//!
//! # Architecture
//! ```text
//! OccurrenceTable
//!   ├─ len: AtomicUsize          (table-wide bound, reserved before insert)
//!   ├─ clock: AtomicU64          (table-wide touch marker)
//!   ├─ up to 64 shards (Mutex<Shard>)
//!   │    ├─ entries: HashMap<OccurrenceKey, PoolItem>   (counter + touch in payload)
//!   │    └─ by_rank: BTreeSet<(counter, touched, key)>  (eviction order)
//!   └─ Allocator "occurrence_table" backing every entry
//! ```
//!
//! All updates to a key happen under its shard lock, so increment,
//! promotion and purge of one key are linearizable while unrelated keys in
//! other shards proceed in parallel. Only an insert into a full table locks
//! every shard (in index order) to pick the table-wide victim.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::allocator::{Allocator, PoolItem};
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::{CacheError, IntegrityWarning, Result};
use crate::request::Request;

const MAX_SHARDS: usize = 64;

/// Payload bytes per entry: counter (u64 LE) followed by touch marker (u64 LE)
pub const ENTRY_SIZE: usize = 16;

/// Identifies the tracked range: a core and a line-aligned bucket on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OccurrenceKey {
    pub core_id: u16,
    pub bucket: u64,
}

impl OccurrenceKey {
    pub fn new(core_id: u16, bucket: u64) -> Self {
        Self { core_id, bucket }
    }

    /// Key of the line containing the request's first byte
    pub fn for_request(request: &Request, line_size: u64) -> Self {
        Self {
            core_id: request.core_id,
            bucket: request.address / line_size,
        }
    }
}

/// Snapshot of one tracked key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccurrenceEntry {
    pub key: OccurrenceKey,
    pub counter: u64,
    /// Table-wide logical clock value of the last update
    pub touched: u64,
}

/// Result of recording one miss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touch {
    /// Threshold reached; the entry has been retired
    Promote,
    /// Still below threshold
    Defer { counter: u64 },
}

struct Shard {
    entries: HashMap<OccurrenceKey, PoolItem>,
    by_rank: BTreeSet<(u64, u64, OccurrenceKey)>,
}

fn read_record(item: &PoolItem) -> (u64, u64) {
    let bytes = item.as_slice();
    let mut counter = [0u8; 8];
    let mut touched = [0u8; 8];
    counter.copy_from_slice(&bytes[0..8]);
    touched.copy_from_slice(&bytes[8..16]);
    (u64::from_le_bytes(counter), u64::from_le_bytes(touched))
}

fn write_record(item: &mut PoolItem, counter: u64, touched: u64) {
    let bytes = item.as_mut_slice();
    bytes[0..8].copy_from_slice(&counter.to_le_bytes());
    bytes[8..16].copy_from_slice(&touched.to_le_bytes());
}

/// Bounded, sharded miss counter table.
///
/// Must be torn down with [`OccurrenceTable::destroy`]; dropping it instead
/// reports every remaining entry as leaked.
pub struct OccurrenceTable {
    shards: Vec<Mutex<Shard>>,
    allocator: Allocator,
    capacity: usize,
    len: AtomicUsize,
    clock: AtomicU64,
    evictions: AtomicU64,
}

impl OccurrenceTable {
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_sink(capacity, Arc::new(TracingSink))
    }

    pub fn with_sink(capacity: usize, sink: Arc<dyn DiagnosticSink>) -> Result<Self> {
        if capacity == 0 {
            return Err(CacheError::InvalidConfig(
                "occurrence table capacity must be at least 1".to_string(),
            ));
        }

        let allocator = Allocator::with_sink(ENTRY_SIZE, "occurrence_table", sink)?;

        let shard_count = capacity.min(MAX_SHARDS);
        let per_shard = capacity.div_ceil(shard_count);

        let mut shards = Vec::new();
        shards
            .try_reserve_exact(shard_count)
            .map_err(|e| CacheError::OutOfMemory(format!("occurrence table shards: {}", e)))?;

        for _ in 0..shard_count {
            let mut entries = HashMap::new();
            entries.try_reserve(per_shard).map_err(|e| {
                CacheError::OutOfMemory(format!("occurrence table entries: {}", e))
            })?;

            shards.push(Mutex::new(Shard {
                entries,
                by_rank: BTreeSet::new(),
            }));
        }

        debug!(
            "Occurrence table ready (capacity={}, shards={})",
            capacity, shard_count
        );

        Ok(Self {
            shards,
            allocator,
            capacity,
            len: AtomicUsize::new(0),
            clock: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    fn shard_index(&self, key: &OccurrenceKey) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Claim room for one more entry; fails when the table is full
    fn try_reserve_slot(&self) -> bool {
        self.len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }

    /// Count one more miss on a tracked key. `None` when the key is absent.
    fn bump(&self, shard: &mut Shard, key: OccurrenceKey, threshold: u64) -> Option<Touch> {
        let (counter, touched) = shard.entries.get(&key).map(read_record)?;
        shard.by_rank.remove(&(counter, touched, key));

        let counter = counter.saturating_add(1);
        if counter >= threshold {
            if let Some(item) = shard.entries.remove(&key) {
                self.allocator.delete(item);
                self.len.fetch_sub(1, Ordering::AcqRel);
            }
            return Some(Touch::Promote);
        }

        let now = self.tick();
        if let Some(item) = shard.entries.get_mut(&key) {
            write_record(item, counter, now);
        }
        shard.by_rank.insert((counter, now, key));
        Some(Touch::Defer { counter })
    }

    fn insert(&self, shard: &mut Shard, key: OccurrenceKey, mut item: PoolItem) {
        let now = self.tick();
        write_record(&mut item, 1, now);
        shard.entries.insert(key, item);
        shard.by_rank.insert((1, now, key));
    }

    /// Drop the lowest-counter, oldest-touch entry of the whole table.
    /// Caller holds every shard lock.
    fn evict_lowest(&self, shards: &mut [MutexGuard<'_, Shard>]) -> bool {
        let victim = shards
            .iter()
            .enumerate()
            .filter_map(|(index, shard)| shard.by_rank.first().map(|rank| (*rank, index)))
            .min();

        let Some(((_, _, key), index)) = victim else {
            return false;
        };

        let shard = &mut shards[index];
        shard.by_rank.pop_first();
        if let Some(item) = shard.entries.remove(&key) {
            self.allocator.delete(item);
        }
        self.evictions.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Record one miss on `key`.
    ///
    /// The counter starts at 1 for an absent key. Once it reaches
    /// `threshold` the entry is removed in the same critical section and
    /// [`Touch::Promote`] is returned. A new key arriving at a full table
    /// replaces the entry with the lowest counter, oldest touch first.
    pub fn touch(&self, key: OccurrenceKey, threshold: u64) -> Touch {
        let index = self.shard_index(&key);
        let mut shard = self.shards[index].lock();

        if let Some(touch) = self.bump(&mut shard, key, threshold) {
            return touch;
        }

        if threshold <= 1 {
            return Touch::Promote;
        }

        let item = match self.allocator.new_item() {
            Ok(item) => item,
            Err(e) => {
                warn!("Dropping occurrence of {:?}: {}", key, e);
                return Touch::Defer { counter: 1 };
            }
        };

        if self.try_reserve_slot() {
            self.insert(&mut shard, key, item);
            return Touch::Defer { counter: 1 };
        }

        drop(shard);
        self.insert_with_eviction(index, key, threshold, item)
    }

    fn insert_with_eviction(
        &self,
        index: usize,
        key: OccurrenceKey,
        threshold: u64,
        item: PoolItem,
    ) -> Touch {
        let mut shards: Vec<MutexGuard<'_, Shard>> =
            self.shards.iter().map(|shard| shard.lock()).collect();

        // The key may have been inserted, or room freed, while unlocked.
        if let Some(touch) = self.bump(&mut shards[index], key, threshold) {
            self.allocator.delete(item);
            return touch;
        }

        if !self.try_reserve_slot() && !self.evict_lowest(&mut shards) {
            self.len.fetch_add(1, Ordering::AcqRel);
        }

        self.insert(&mut shards[index], key, item);
        Touch::Defer { counter: 1 }
    }

    /// Forget `key` regardless of its counter
    pub fn remove(&self, key: &OccurrenceKey) -> bool {
        let mut guard = self.shards[self.shard_index(key)].lock();
        let Shard { entries, by_rank } = &mut *guard;

        match entries.remove(key) {
            Some(item) => {
                let (counter, touched) = read_record(&item);
                by_rank.remove(&(counter, touched, *key));
                self.allocator.delete(item);
                self.len.fetch_sub(1, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &OccurrenceKey) -> Option<OccurrenceEntry> {
        let guard = self.shards[self.shard_index(key)].lock();
        guard.entries.get(key).map(|item| {
            let (counter, touched) = read_record(item);
            OccurrenceEntry {
                key: *key,
                counter,
                touched,
            }
        })
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries dropped to make room for new keys
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Number of entries currently backed by the allocator
    pub fn allocated(&self) -> usize {
        self.allocator.live_count()
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            let mut guard = shard.lock();
            guard.by_rank.clear();
            let drained = guard.entries.len();
            for (_, item) in guard.entries.drain() {
                self.allocator.delete(item);
            }
            self.len.fetch_sub(drained, Ordering::AcqRel);
        }
    }

    /// Release every entry, then the backing allocator
    pub fn destroy(self) -> Option<IntegrityWarning> {
        self.clear();
        let Self { allocator, .. } = self;
        allocator.destroy()
    }
}
