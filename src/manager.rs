//! Tile Manager + Tile Handle.
//!
//! A `TileManager` lives on one locality and resolves `TileHandle`s
//! through a local-Holder → cache → remote-fetch cascade, simulated here
//! over a single process (all managers live in one process; "remote"
//! calls are direct calls into another `TileManager`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheLookup, TileCache};
use crate::config::RuntimeConfig;
use crate::error::{CoreError, CoreResult};
use crate::holder::{Gid, TileHolder};
use crate::scheduler::Scheduler;
use crate::telemetry;
use crate::tile_buffer::TileBuffer;

/// Value-typed, serializable reference to one logical tile.
///
/// Carries a routing table (one manager id per locality), the tile's index
/// within its dataset, its home locality, its `gid`, and a generation. Two
/// handles for the same tile at different generations are equal — equality
/// identifies the logical tile, not a specific version of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileHandle {
    manager_ids: Vec<usize>,
    tile_index: usize,
    home_locality: usize,
    gid: Gid,
    generation: u64,
}

impl TileHandle {
    pub fn new(manager_ids: Vec<usize>, tile_index: usize, home_locality: usize, gid: Gid) -> Self {
        Self {
            manager_ids,
            tile_index,
            home_locality,
            gid,
            generation: 0,
        }
    }

    pub fn tile_index(&self) -> usize {
        self.tile_index
    }

    pub fn home_locality(&self) -> usize {
        self.home_locality
    }

    pub fn gid(&self) -> Gid {
        self.gid
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn manager_id_for(&self, locality: usize) -> Option<usize> {
        self.manager_ids.get(locality).copied()
    }

    fn with_generation(&self, generation: u64) -> Self {
        Self {
            generation,
            ..self.clone()
        }
    }
}

impl PartialEq for TileHandle {
    fn eq(&self, other: &Self) -> bool {
        self.gid == other.gid
    }
}

impl Eq for TileHandle {}

/// Manages every tile whose home locality is this one, plus a bounded
/// cache of tiles fetched from other localities.
pub struct TileManager {
    locality: usize,
    config: RuntimeConfig,
    holders: DashMap<usize, Arc<TileHolder>>,
    cache: TileCache,
    faulty: AtomicBool,
}

impl TileManager {
    pub fn new(locality: usize, config: RuntimeConfig) -> Self {
        Self {
            locality,
            config,
            holders: DashMap::new(),
            cache: TileCache::new(config.cache_capacity),
            faulty: AtomicBool::new(false),
        }
    }

    pub fn locality(&self) -> usize {
        self.locality
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Registers a co-located Holder. Called once per tile at dataset
    /// construction, for every tile whose home is this locality.
    pub fn register_holder(&self, tile_index: usize, holder: Arc<TileHolder>) {
        self.holders.insert(tile_index, holder);
    }

    /// Forces every subsequent remote get/set against this manager to fail
    /// with `CoreError::Transport`. Test-only fault injection — there is no
    /// real transport in this simulated runtime to fail on its own.
    #[cfg(test)]
    pub fn set_faulty(&self, faulty: bool) {
        self.faulty.store(faulty, Ordering::SeqCst);
    }

    fn local_holder(&self, tile_index: usize) -> Option<Arc<TileHolder>> {
        self.holders.get(&tile_index).map(|e| Arc::clone(&e))
    }

    /// Resolves `handle` to a buffer through local-Holder → cache →
    /// remote-fetch.
    pub async fn get_tile(
        &self,
        registry: &LocalityRegistry,
        handle: &TileHandle,
    ) -> CoreResult<TileBuffer> {
        if handle.manager_id_for(self.locality).is_none() {
            return Err(CoreError::Topology {
                tile_index: handle.tile_index(),
                locality: self.locality,
            });
        }

        if handle.home_locality() == self.locality {
            let holder = self.local_holder(handle.tile_index()).ok_or(CoreError::Topology {
                tile_index: handle.tile_index(),
                locality: self.locality,
            })?;
            return Ok(holder.get());
        }

        if let CacheLookup::Hit(buffer) = self.cache.try_get(handle.gid(), handle.generation()) {
            return Ok(buffer);
        }

        let remote = registry.manager(handle.home_locality())?;
        let start = Instant::now();
        let buffer = remote.fetch_for_remote(handle.tile_index())?;
        let elapsed = start.elapsed();
        telemetry::record_remote_fetch(elapsed);
        if self.config.trace_remote_fetch {
            tracing::debug!(tile_index = handle.tile_index(), ?elapsed, "remote fetch");
        }
        self.cache.insert(handle.gid(), handle.generation(), buffer.clone());
        Ok(buffer)
    }

    /// Writes `buffer` as the next generation of `handle`'s tile, returning
    /// the advanced handle.
    pub async fn set_tile(
        &self,
        registry: &LocalityRegistry,
        handle: &TileHandle,
        buffer: TileBuffer,
    ) -> CoreResult<TileHandle> {
        if handle.manager_id_for(self.locality).is_none() {
            return Err(CoreError::Topology {
                tile_index: handle.tile_index(),
                locality: self.locality,
            });
        }

        if handle.home_locality() == self.locality {
            let holder = self.local_holder(handle.tile_index()).ok_or(CoreError::Topology {
                tile_index: handle.tile_index(),
                locality: self.locality,
            })?;
            let generation = holder.set(buffer);
            return Ok(handle.with_generation(generation));
        }

        let next_generation = handle.generation() + 1;
        // The writer's own view is current immediately; cache it before the
        // remote acknowledgement lands.
        self.cache.insert(handle.gid(), next_generation, buffer.clone());

        let remote = registry.manager(handle.home_locality())?;
        remote.write_for_remote(handle.tile_index(), buffer)?;
        Ok(handle.with_generation(next_generation))
    }

    fn fetch_for_remote(&self, tile_index: usize) -> CoreResult<TileBuffer> {
        if self.faulty.load(Ordering::SeqCst) {
            return Err(CoreError::Transport {
                locality: self.locality,
                source: "simulated transport fault".into(),
            });
        }
        let holder = self.local_holder(tile_index).ok_or(CoreError::Topology {
            tile_index,
            locality: self.locality,
        })?;
        Ok(holder.get())
    }

    fn write_for_remote(&self, tile_index: usize, buffer: TileBuffer) -> CoreResult<()> {
        if self.faulty.load(Ordering::SeqCst) {
            return Err(CoreError::Transport {
                locality: self.locality,
                source: "simulated transport fault".into(),
            });
        }
        let holder = self.local_holder(tile_index).ok_or(CoreError::Topology {
            tile_index,
            locality: self.locality,
        })?;
        holder.set(buffer);
        Ok(())
    }
}

/// Every locality's manager plus the scheduler that placed their tasks.
pub struct LocalityRegistry {
    scheduler: Scheduler,
    managers: Vec<Arc<TileManager>>,
}

impl LocalityRegistry {
    pub fn new(scheduler: Scheduler, managers: Vec<Arc<TileManager>>) -> Self {
        Self { scheduler, managers }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn num_localities(&self) -> usize {
        self.managers.len()
    }

    pub fn manager(&self, locality: usize) -> CoreResult<&Arc<TileManager>> {
        self.managers
            .get(locality)
            .ok_or_else(|| CoreError::Configuration(format!("no manager registered for locality {locality}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(localities: usize) -> (Arc<LocalityRegistry>, Vec<TileHandle>) {
        let config = RuntimeConfig::default();
        let scheduler = Scheduler::sma(localities).unwrap();
        let managers: Vec<Arc<TileManager>> = (0..localities)
            .map(|loc| Arc::new(TileManager::new(loc, config)))
            .collect();

        let mut handles = Vec::new();
        for i in 0..localities * 2 {
            let home = i % localities;
            let holder = Arc::new(TileHolder::new(i, home, TileBuffer::from_vec(1, 1, vec![i as f64])));
            managers[home].register_holder(i, holder);
            handles.push(TileHandle::new((0..localities).collect(), i, home, i));
        }

        (Arc::new(LocalityRegistry::new(scheduler, managers)), handles)
    }

    #[tokio::test]
    async fn local_get_returns_holder_contents() {
        let (registry, handles) = registry(2);
        let manager = registry.manager(0).unwrap();
        let buffer = manager.get_tile(&registry, &handles[0]).await.unwrap();
        assert_eq!(buffer.get(0, 0), 0.0);
    }

    #[tokio::test]
    async fn remote_get_populates_cache_and_counts_as_a_miss_then_hit() {
        let (registry, handles) = registry(2);
        let requester = registry.manager(1).unwrap();
        let remote_handle = &handles[0]; // home_locality == 0

        let first = requester.get_tile(&registry, remote_handle).await.unwrap();
        assert_eq!(first.get(0, 0), 0.0);
        assert!(requester.cache().contains(remote_handle.gid(), remote_handle.generation()));

        let stats_before = requester.cache().stats();
        let _ = requester.get_tile(&registry, remote_handle).await.unwrap();
        let stats_after = requester.cache().stats();
        assert_eq!(stats_after.hits, stats_before.hits + 1);
    }

    #[tokio::test]
    async fn set_tile_bumps_generation_and_is_visible_to_local_get() {
        let (registry, handles) = registry(1);
        let manager = registry.manager(0).unwrap();
        let updated = manager
            .set_tile(&registry, &handles[0], TileBuffer::from_vec(1, 1, vec![42.0]))
            .await
            .unwrap();
        assert_eq!(updated.generation(), 1);
        let buffer = manager.get_tile(&registry, &updated).await.unwrap();
        assert_eq!(buffer.get(0, 0), 42.0);
    }

    #[tokio::test]
    async fn remote_set_propagates_to_home_holder() {
        let (registry, handles) = registry(2);
        let writer = registry.manager(1).unwrap();
        let remote_handle = &handles[0]; // home_locality == 0

        let updated = writer
            .set_tile(&registry, remote_handle, TileBuffer::from_vec(1, 1, vec![7.0]))
            .await
            .unwrap();
        assert_eq!(updated.generation(), 1);

        let home = registry.manager(0).unwrap();
        let buffer = home.get_tile(&registry, &updated).await.unwrap();
        assert_eq!(buffer.get(0, 0), 7.0);
    }

    #[tokio::test]
    async fn transport_fault_is_reported_as_transport_error() {
        let (registry, handles) = registry(2);
        registry.manager(0).unwrap().set_faulty(true);
        let requester = registry.manager(1).unwrap();
        let err = requester.get_tile(&registry, &handles[0]).await.unwrap_err();
        assert!(matches!(err, CoreError::Transport { .. }));
    }

    #[tokio::test]
    async fn handle_with_no_manager_on_this_locality_is_a_topology_error() {
        let (registry, _handles) = registry(2);
        let manager = registry.manager(0).unwrap();
        let orphan = TileHandle::new(vec![0], 0, 0, 0); // no entry for locality 1
        let far_manager = registry.manager(1).unwrap();
        let err = far_manager.get_tile(&registry, &orphan).await.unwrap_err();
        assert!(matches!(err, CoreError::Topology { .. }));
        let _ = manager; // silence unused warning if reordered later
    }

    #[test]
    fn handle_equality_ignores_generation() {
        let a = TileHandle::new(vec![0], 0, 0, 5);
        let b = a.with_generation(9);
        assert_eq!(a, b);
    }

    #[test]
    fn handle_round_trips_through_json() {
        let handle = TileHandle::new(vec![0, 1, 2], 4, 1, 7).with_generation(3);
        let encoded = serde_json::to_string(&handle).unwrap();
        let decoded: TileHandle = serde_json::from_str(&encoded).unwrap();
        assert_eq!(handle, decoded);
        assert_eq!(decoded.generation(), 3);
        assert_eq!(decoded.home_locality(), 1);
    }
}
