//! Error kinds for the tiled dataflow core.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A scheduler or dataset was constructed with an invalid configuration
    /// (e.g. a cyclic grid whose `width * height` doesn't match the
    /// locality count).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A handle's manager list has no entry for the locality trying to
    /// resolve it. Fatal at handle resolution.
    #[error("tile {tile_index} has no manager registered on locality {locality}")]
    Topology { tile_index: usize, locality: usize },

    /// A remote get/set failed in transport. Fatal; not retried.
    #[error("transport failure talking to locality {locality}: {source}")]
    Transport { locality: usize, source: String },

    /// A numeric kernel rejected its inputs (dimension mismatch, a
    /// factorization hitting a non-positive pivot, ...).
    #[error("kernel failure: {0}")]
    Kernel(String),

    /// Indexed read past the end of a `TiledDataset`.
    #[error("index {index} out of range for dataset of length {len}")]
    OutOfRange { index: usize, len: usize },
}

pub type CoreResult<T> = Result<T, CoreError>;
