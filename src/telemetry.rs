//! Process-wide telemetry counters.
//!
//! Every counter is a relaxed atomic increment; recording is best-effort and
//! never panics or returns a `Result`. `record_remote_fetch` measures
//! submission-to-delivery wall time, not wire time on the underlying
//! transport — there's no wire to measure in-process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use once_cell::sync::Lazy;

#[derive(Debug, Default)]
struct Counters {
    tile_buffer_allocs: AtomicU64,
    tile_buffer_deallocs: AtomicU64,
    holder_allocs: AtomicU64,
    holder_deallocs: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_insertions: AtomicU64,
    cache_evictions: AtomicU64,
    remote_fetch_count: AtomicU64,
    remote_fetch_nanos: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

/// Point-in-time snapshot of every global counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub tile_buffer_allocs: u64,
    pub tile_buffer_deallocs: u64,
    pub holder_allocs: u64,
    pub holder_deallocs: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_insertions: u64,
    pub cache_evictions: u64,
    pub remote_fetch_count: u64,
    pub remote_fetch_nanos: u64,
}

pub fn record_tile_buffer_alloc() {
    COUNTERS.tile_buffer_allocs.fetch_add(1, Ordering::Relaxed);
}

pub fn record_tile_buffer_dealloc() {
    COUNTERS.tile_buffer_deallocs.fetch_add(1, Ordering::Relaxed);
}

pub fn record_holder_alloc() {
    COUNTERS.holder_allocs.fetch_add(1, Ordering::Relaxed);
}

pub fn record_holder_dealloc() {
    COUNTERS.holder_deallocs.fetch_add(1, Ordering::Relaxed);
}

pub fn record_cache_hit() {
    COUNTERS.cache_hits.fetch_add(1, Ordering::Relaxed);
}

pub fn record_cache_miss() {
    COUNTERS.cache_misses.fetch_add(1, Ordering::Relaxed);
}

pub fn record_cache_insertion() {
    COUNTERS.cache_insertions.fetch_add(1, Ordering::Relaxed);
}

pub fn record_cache_eviction() {
    COUNTERS.cache_evictions.fetch_add(1, Ordering::Relaxed);
}

/// Records one remote fetch's elapsed wall time.
pub fn record_remote_fetch(elapsed: Duration) {
    COUNTERS.remote_fetch_count.fetch_add(1, Ordering::Relaxed);
    COUNTERS
        .remote_fetch_nanos
        .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
}

/// Reads every counter without resetting them.
pub fn snapshot() -> TelemetrySnapshot {
    TelemetrySnapshot {
        tile_buffer_allocs: COUNTERS.tile_buffer_allocs.load(Ordering::Relaxed),
        tile_buffer_deallocs: COUNTERS.tile_buffer_deallocs.load(Ordering::Relaxed),
        holder_allocs: COUNTERS.holder_allocs.load(Ordering::Relaxed),
        holder_deallocs: COUNTERS.holder_deallocs.load(Ordering::Relaxed),
        cache_hits: COUNTERS.cache_hits.load(Ordering::Relaxed),
        cache_misses: COUNTERS.cache_misses.load(Ordering::Relaxed),
        cache_insertions: COUNTERS.cache_insertions.load(Ordering::Relaxed),
        cache_evictions: COUNTERS.cache_evictions.load(Ordering::Relaxed),
        remote_fetch_count: COUNTERS.remote_fetch_count.load(Ordering::Relaxed),
        remote_fetch_nanos: COUNTERS.remote_fetch_nanos.load(Ordering::Relaxed),
    }
}

/// Zeroes every counter. Intended for test setup; a live dataflow run should
/// not call this, since it races with anything else touching telemetry.
pub fn reset() {
    COUNTERS.tile_buffer_allocs.store(0, Ordering::Relaxed);
    COUNTERS.tile_buffer_deallocs.store(0, Ordering::Relaxed);
    COUNTERS.holder_allocs.store(0, Ordering::Relaxed);
    COUNTERS.holder_deallocs.store(0, Ordering::Relaxed);
    COUNTERS.cache_hits.store(0, Ordering::Relaxed);
    COUNTERS.cache_misses.store(0, Ordering::Relaxed);
    COUNTERS.cache_insertions.store(0, Ordering::Relaxed);
    COUNTERS.cache_evictions.store(0, Ordering::Relaxed);
    COUNTERS.remote_fetch_count.store(0, Ordering::Relaxed);
    COUNTERS.remote_fetch_nanos.store(0, Ordering::Relaxed);
}
