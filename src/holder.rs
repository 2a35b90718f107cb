//! Tile Holder — authoritative, single-home custody of one tile.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::telemetry;
use crate::tile_buffer::TileBuffer;

/// Globally unique tile identifier, stable across generations.
pub type Gid = usize;

/// The sole authoritative owner of one tile's buffer.
///
/// Readers take a shared lock; writers take an exclusive lock. The lock is
/// never held across anything but the buffer swap itself — no I/O, no
/// awaiting, happens while it's held.
pub struct TileHolder {
    gid: Gid,
    home_locality: usize,
    buffer: RwLock<TileBuffer>,
    generation: AtomicU64,
}

impl TileHolder {
    pub fn new(gid: Gid, home_locality: usize, initial: TileBuffer) -> Self {
        telemetry::record_holder_alloc();
        Self {
            gid,
            home_locality,
            buffer: RwLock::new(initial),
            generation: AtomicU64::new(0),
        }
    }

    pub fn gid(&self) -> Gid {
        self.gid
    }

    pub fn home_locality(&self) -> usize {
        self.home_locality
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Snapshot of the current buffer. Sharing storage with the holder's
    /// internal copy is fine: the buffer type is itself shallow-copyable,
    /// and a subsequent `set` replaces the holder's copy, not this one.
    pub fn get(&self) -> TileBuffer {
        self.buffer.read().clone()
    }

    /// Replaces the held buffer, returning the new generation (always the
    /// prior generation + 1).
    pub fn set(&self, buffer: TileBuffer) -> u64 {
        *self.buffer.write() = buffer;
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Drop for TileHolder {
    fn drop(&mut self) {
        telemetry::record_holder_dealloc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_after_set_observes_new_contents() {
        let holder = TileHolder::new(0, 0, TileBuffer::from_vec(1, 1, vec![1.0]));
        assert_eq!(holder.get().get(0, 0), 1.0);
        let generation = holder.set(TileBuffer::from_vec(1, 1, vec![2.0]));
        assert_eq!(generation, 1);
        assert_eq!(holder.get().get(0, 0), 2.0);
    }

    #[test]
    fn set_bumps_generation_by_exactly_one() {
        let holder = TileHolder::new(0, 0, TileBuffer::new(1, 1));
        assert_eq!(holder.generation(), 0);
        for expected in 1..=3u64 {
            let generation = holder.set(TileBuffer::new(1, 1));
            assert_eq!(generation, expected);
            assert_eq!(holder.generation(), expected);
        }
    }

    #[test]
    fn concurrent_readers_see_a_consistent_snapshot() {
        use std::sync::Arc;
        use std::thread;

        let holder = Arc::new(TileHolder::new(0, 0, TileBuffer::from_vec(1, 1, vec![5.0])));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let holder = Arc::clone(&holder);
            handles.push(thread::spawn(move || holder.get().get(0, 0)));
        }
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 5.0);
        }
    }
}
