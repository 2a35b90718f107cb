//! Tiled Dataset: a fixed, ordered collection of tile handles plus the
//! locality registry and scheduler that produced it.

use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::error::{CoreError, CoreResult};
use crate::holder::TileHolder;
use crate::manager::{LocalityRegistry, TileHandle, TileManager};
use crate::scheduler::Scheduler;
use crate::tile_buffer::TileBuffer;

pub struct TiledDataset {
    handles: Vec<TileHandle>,
    registry: Arc<LocalityRegistry>,
}

impl TiledDataset {
    /// Builds a dataset from `tiles`, assigning tile `i`'s home Holder to
    /// locality `i % num_localities` (round-robin).
    pub fn new(scheduler: Scheduler, tiles: Vec<TileBuffer>, config: RuntimeConfig) -> Self {
        let l = scheduler.num_localities();
        let managers: Vec<Arc<TileManager>> = (0..l).map(|loc| Arc::new(TileManager::new(loc, config))).collect();

        let mut handles = Vec::with_capacity(tiles.len());
        for (i, buffer) in tiles.into_iter().enumerate() {
            let home = i % l;
            let holder = Arc::new(TileHolder::new(i, home, buffer));
            managers[home].register_holder(i, holder);
            handles.push(TileHandle::new((0..l).collect(), i, home, i));
        }

        let registry = Arc::new(LocalityRegistry::new(scheduler, managers));
        Self { handles, registry }
    }

    pub fn registry(&self) -> Arc<LocalityRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn handles(&self) -> &[TileHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn get(&self, index: usize) -> CoreResult<&TileHandle> {
        self.handles.get(index).ok_or(CoreError::OutOfRange {
            index,
            len: self.handles.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robins_tiles_across_localities() {
        let scheduler = Scheduler::sma(2).unwrap();
        let tiles = vec![TileBuffer::new(1, 1); 4];
        let dataset = TiledDataset::new(scheduler, tiles, RuntimeConfig::default());
        assert_eq!(dataset.get(0).unwrap().home_locality(), 0);
        assert_eq!(dataset.get(1).unwrap().home_locality(), 1);
        assert_eq!(dataset.get(2).unwrap().home_locality(), 0);
        assert_eq!(dataset.get(3).unwrap().home_locality(), 1);
    }

    #[test]
    fn out_of_range_read_reports_core_error() {
        let dataset = TiledDataset::new(Scheduler::local(), vec![TileBuffer::new(1, 1)], RuntimeConfig::default());
        let err = dataset.get(5).unwrap_err();
        assert!(matches!(err, CoreError::OutOfRange { index: 5, len: 1 }));
    }
}
