//! Tile Buffer — storage for a single tile's elements.

use std::sync::Arc;

use crate::telemetry;

/// Fixed-size, row-major matrix tile.
///
/// Cloning a `TileBuffer` shares the underlying storage (an `Arc`, so it's
/// O(1)); a kernel that needs to mutate in place should call
/// [`TileBuffer::view_mut`], which clones the backing storage first if it
/// is still shared with another holder of this tile (copy-on-write).
#[derive(Debug, Clone)]
pub struct TileBuffer {
    rows: usize,
    cols: usize,
    data: Arc<Vec<f64>>,
}

impl TileBuffer {
    /// Allocates a zeroed `rows x cols` tile.
    pub fn new(rows: usize, cols: usize) -> Self {
        telemetry::record_tile_buffer_alloc();
        Self {
            rows,
            cols,
            data: Arc::new(vec![0.0; rows * cols]),
        }
    }

    /// Wraps already-computed row-major data. `data.len()` must equal
    /// `rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), rows * cols, "tile buffer size mismatch");
        telemetry::record_tile_buffer_alloc();
        Self {
            rows,
            cols,
            data: Arc::new(data),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Immutable element span, row-major.
    pub fn view(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// Mutable element span for the exclusive writer. Clones storage first
    /// if another `TileBuffer` still shares it.
    pub fn view_mut(&mut self) -> &mut [f64] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// True if no other `TileBuffer` shares this storage.
    pub fn is_uniquely_owned(&self) -> bool {
        Arc::strong_count(&self.data) == 1
    }
}

impl Drop for TileBuffer {
    fn drop(&mut self) {
        // Only the last sharer of the storage counts as a real deallocation.
        if Arc::strong_count(&self.data) == 1 {
            telemetry::record_tile_buffer_dealloc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_allocates_zeroed_storage() {
        let buf = TileBuffer::new(2, 3);
        assert_eq!(buf.rows(), 2);
        assert_eq!(buf.cols(), 3);
        assert_eq!(buf.view(), &[0.0; 6]);
    }

    #[test]
    fn from_vec_rejects_mismatched_length() {
        let result = std::panic::catch_unwind(|| TileBuffer::from_vec(2, 2, vec![1.0, 2.0, 3.0]));
        assert!(result.is_err());
    }

    #[test]
    fn clone_shares_storage() {
        let buf = TileBuffer::from_vec(1, 2, vec![1.0, 2.0]);
        let clone = buf.clone();
        assert!(!buf.is_uniquely_owned());
        assert!(!clone.is_uniquely_owned());
        assert_eq!(clone.get(0, 1), 2.0);
    }

    #[test]
    fn view_mut_copies_on_write_when_shared() {
        let mut buf = TileBuffer::from_vec(1, 2, vec![1.0, 2.0]);
        let original = buf.clone();
        buf.view_mut()[0] = 9.0;
        assert_eq!(buf.get(0, 0), 9.0);
        assert_eq!(original.get(0, 0), 1.0, "clone must not observe the mutation");
    }

    #[test]
    fn alloc_and_dealloc_are_recorded() {
        let before = telemetry::snapshot();
        {
            let buf = TileBuffer::new(1, 1);
            let _clone = buf.clone();
        }
        let after = telemetry::snapshot();
        assert!(after.tile_buffer_allocs >= before.tile_buffer_allocs + 1);
        assert!(after.tile_buffer_deallocs >= before.tile_buffer_deallocs + 1);
    }
}
