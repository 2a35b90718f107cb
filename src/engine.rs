//! Task submission primitive.
//!
//! Compute placement, drop any locks, then hand the actual work off to an
//! async unit that resolves its own inputs before running. "Parallel
//! units" are per-task `tokio` tasks rather than a thread-pool parallel
//! iterator, since work now crosses simulated locality boundaries rather
//! than CPU cores.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::Instrument;

use crate::error::{CoreError, CoreResult};
use crate::manager::{LocalityRegistry, TileHandle};
use crate::scheduler::TaskKind;
use crate::tile_buffer::TileBuffer;

/// A pure numeric kernel: takes the resolved input buffers, in the same
/// order as the `inputs` passed to [`submit`], and returns the buffer to
/// write back.
pub type Kernel = Arc<dyn Fn(&[TileBuffer]) -> CoreResult<TileBuffer> + Send + Sync>;

/// A task's output: the advanced handle of the tile it wrote, once that
/// write has been acknowledged. `Shared` so multiple downstream tasks can
/// each hold their own clone and await it independently — awaiting one
/// clone never consumes buffers another consumer still needs.
pub type TileFuture = Shared<BoxFuture<'static, CoreResult<TileHandle>>>;

/// Wraps an already-known handle as an immediately-ready `TileFuture` — the
/// starting point of a dataflow, before any task has run.
pub fn ready_handle(handle: TileHandle) -> TileFuture {
    futures::future::ready(Ok(handle)).boxed().shared()
}

/// Submits one dataflow task.
///
/// `indices` are the dataflow indices used only for placement.
/// `inputs[write_target]` identifies the tile this task overwrites: its
/// resolved handle (not `output`, which doesn't exist as a separate
/// parameter) determines the generation the write advances from. Every
/// operation that updates tile T takes the most recent handle of T as
/// input and returns the next handle as output.
///
/// Each call spawns its own `tokio` task — the engine never coalesces two
/// kernel invocations into one execution context.
pub fn submit(
    registry: Arc<LocalityRegistry>,
    kind: TaskKind,
    n_tiles: usize,
    indices: Vec<usize>,
    kernel: Kernel,
    inputs: Vec<TileFuture>,
    write_target: usize,
) -> TileFuture {
    assert!(write_target < inputs.len(), "write_target out of range for inputs");

    let locality = registry.scheduler().on(kind, n_tiles, &indices);
    tracing::trace!(?kind, locality, ?indices, "placement");
    let span = tracing::debug_span!("task", ?kind, locality, ?indices);
    let registry = Arc::clone(&registry);

    let body = async move {
        let manager = Arc::clone(registry.manager(locality)?);

        let mut handles = Vec::with_capacity(inputs.len());
        for input in inputs {
            handles.push(input.await?);
        }

        let mut buffers = Vec::with_capacity(handles.len());
        for handle in &handles {
            buffers.push(manager.get_tile(&registry, handle).await?);
        }

        let result = kernel(&buffers)?;
        manager.set_tile(&registry, &handles[write_target], result).await
    }
    .instrument(span);

    let join = tokio::spawn(body);
    let resolved: BoxFuture<'static, CoreResult<TileHandle>> = async move {
        match join.await {
            Ok(result) => result,
            Err(e) => Err(CoreError::Kernel(format!("task panicked: {e}"))),
        }
    }
    .boxed();

    resolved.shared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::holder::TileHolder;
    use crate::manager::TileManager;
    use crate::scheduler::Scheduler;

    fn single_locality_registry(initial: TileBuffer) -> (Arc<LocalityRegistry>, TileHandle) {
        let manager = Arc::new(TileManager::new(0, RuntimeConfig::default()));
        let holder = Arc::new(TileHolder::new(0, 0, initial));
        manager.register_holder(0, holder);
        let registry = Arc::new(LocalityRegistry::new(Scheduler::local(), vec![manager]));
        let handle = TileHandle::new(vec![0], 0, 0, 0);
        (registry, handle)
    }

    /// Installs a test-scoped subscriber so `submit`'s per-task span shows
    /// up under `cargo test -- --nocapture`; harmless to call more than
    /// once since `try_init` just returns an error on a second attempt.
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[tokio::test]
    async fn submit_runs_kernel_and_advances_generation() {
        init_tracing();
        let (registry, handle) = single_locality_registry(TileBuffer::from_vec(1, 1, vec![2.0]));
        let double: Kernel = Arc::new(|bufs: &[TileBuffer]| {
            Ok(TileBuffer::from_vec(1, 1, vec![bufs[0].get(0, 0) * 2.0]))
        });

        let input = ready_handle(handle.clone());
        let output = submit(
            Arc::clone(&registry),
            TaskKind::Potrf,
            1,
            vec![0],
            double,
            vec![input],
            0,
        );

        let advanced = output.await.unwrap();
        assert_eq!(advanced.generation(), 1);
        let manager = registry.manager(0).unwrap();
        let buffer = manager.get_tile(&registry, &advanced).await.unwrap();
        assert_eq!(buffer.get(0, 0), 4.0);
    }

    #[tokio::test]
    async fn multiple_consumers_can_await_the_same_future_independently() {
        let (registry, handle) = single_locality_registry(TileBuffer::from_vec(1, 1, vec![1.0]));
        let identity: Kernel = Arc::new(|bufs: &[TileBuffer]| Ok(bufs[0].clone()));
        let produced = submit(
            Arc::clone(&registry),
            TaskKind::Potrf,
            1,
            vec![0],
            identity,
            vec![ready_handle(handle)],
            0,
        );

        let a = produced.clone();
        let b = produced.clone();
        let (ra, rb) = tokio::join!(a, b);
        assert_eq!(ra.unwrap().generation(), rb.unwrap().generation());
    }

    #[tokio::test]
    async fn kernel_failure_propagates_as_kernel_error() {
        let (registry, handle) = single_locality_registry(TileBuffer::from_vec(1, 1, vec![1.0]));
        let failing: Kernel = Arc::new(|_bufs: &[TileBuffer]| Err(CoreError::Kernel("boom".into())));
        let output = submit(
            Arc::clone(&registry),
            TaskKind::Potrf,
            1,
            vec![0],
            failing,
            vec![ready_handle(handle)],
            0,
        );
        assert!(matches!(output.await, Err(CoreError::Kernel(_))));
    }
}
