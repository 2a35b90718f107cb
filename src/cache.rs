//! Tile Cache — per-manager LRU for remotely-fetched tiles.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::holder::Gid;
use crate::telemetry;
use crate::tile_buffer::TileBuffer;

/// Default number of remote tiles a cache retains when not overridden via
/// `RuntimeConfig`.
pub const DEFAULT_CACHE_CAPACITY: usize = 16;

/// Outcome of a cache lookup.
pub enum CacheLookup {
    Hit(TileBuffer),
    Miss,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub len: usize,
}

struct Entry {
    generation: u64,
    buffer: TileBuffer,
}

/// Thread-safe, generation-aware LRU cache of remotely-fetched tiles.
///
/// A lookup at a stale generation counts as a miss and evicts the stale
/// entry, so the cache never serves out-of-date data for a gid it still
/// has a newer handle for.
pub struct TileCache {
    entries: DashMap<Gid, Entry>,
    lru_order: Mutex<VecDeque<Gid>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    evictions: AtomicU64,
}

impl TileCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            lru_order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            insertions: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn try_get(&self, gid: Gid, generation: u64) -> CacheLookup {
        let hit_buffer = self.entries.get(&gid).and_then(|entry| {
            if entry.generation == generation {
                Some(entry.buffer.clone())
            } else {
                None
            }
        });

        match hit_buffer {
            Some(buffer) => {
                self.touch(gid);
                self.hits.fetch_add(1, Ordering::Relaxed);
                telemetry::record_cache_hit();
                CacheLookup::Hit(buffer)
            }
            None => {
                // Absent, or present-but-stale: drop the stale entry along
                // with reporting the miss.
                self.entries.remove(&gid);
                self.misses.fetch_add(1, Ordering::Relaxed);
                telemetry::record_cache_miss();
                CacheLookup::Miss
            }
        }
    }

    pub fn insert(&self, gid: Gid, generation: u64, buffer: TileBuffer) {
        if !self.entries.contains_key(&gid) {
            self.evict_if_needed();
        }
        self.entries.insert(gid, Entry { generation, buffer });
        self.insertions.fetch_add(1, Ordering::Relaxed);
        telemetry::record_cache_insertion();

        let mut lru = self.lru_order.lock();
        lru.retain(|g| *g != gid);
        lru.push_back(gid);
    }

    pub fn contains(&self, gid: Gid, generation: u64) -> bool {
        self.entries
            .get(&gid)
            .map(|e| e.generation == generation)
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.lru_order.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            len: self.entries.len(),
        }
    }

    fn touch(&self, gid: Gid) {
        let mut lru = self.lru_order.lock();
        if let Some(pos) = lru.iter().position(|g| *g == gid) {
            lru.remove(pos);
            lru.push_back(gid);
        }
    }

    fn evict_if_needed(&self) {
        while self.entries.len() >= self.capacity {
            let victim = self.lru_order.lock().pop_front();
            match victim {
                Some(gid) => {
                    if self.entries.remove(&gid).is_some() {
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                        telemetry::record_cache_eviction();
                    }
                }
                None => break,
            }
        }
    }
}
