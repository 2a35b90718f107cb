//! Tiled dataflow core for distributed Gaussian-process regression.
//!
//! Tiles live in [`TileHolder`]s, one authoritative home locality per tile;
//! [`TileManager`]s route reads and writes through a local-Holder, then
//! [`TileCache`], then remote-fetch cascade; [`Scheduler`] decides which
//! locality runs each operation; and [`engine::submit`] is the primitive
//! the [`dag`] module's Cholesky and downstream DAGs build on. None of it
//! touches a filesystem, a network socket, or a GPU — those are a runtime's
//! job, not this crate's.

pub mod cache;
pub mod config;
pub mod dag;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod holder;
pub mod kernels;
pub mod manager;
pub mod scheduler;
pub mod telemetry;
pub mod tile_buffer;

pub use cache::{CacheLookup, CacheStats, TileCache, DEFAULT_CACHE_CAPACITY};
pub use config::RuntimeConfig;
pub use dataset::TiledDataset;
pub use engine::{ready_handle, Kernel, TileFuture};
pub use error::{CoreError, CoreResult};
pub use holder::{Gid, TileHolder};
pub use manager::{LocalityRegistry, TileHandle, TileManager};
pub use scheduler::{Scheduler, TaskKind};
pub use tile_buffer::TileBuffer;
