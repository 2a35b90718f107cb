//! Tiled Cholesky factorization and the downstream DAGs built on top of it.
//!
//! Tiles of an `n x n` lower-triangular block matrix are addressed by
//! [`tri_index`] into a flat `Vec<TileFuture>` indexed `row * n + col` for
//! `col <= row`. Every DAG here follows the same shape: walk the
//! dependency structure in order, replacing each tile's future in place
//! with the future `engine::submit` returns for the task that next writes
//! it.

use std::sync::Arc;

use crate::engine::{self, Kernel, TileFuture};
use crate::kernels;
use crate::manager::LocalityRegistry;
use crate::scheduler::TaskKind;
use crate::tile_buffer::TileBuffer;

/// Flat index of block `(row, col)`, `col <= row`, into an `n x n`
/// lower-triangular block matrix.
pub fn tri_index(n: usize, row: usize, col: usize) -> usize {
    debug_assert!(col <= row && row < n, "({row}, {col}) is not in the lower triangle of size {n}");
    row * n + col
}

/// Runs the tiled right-looking Cholesky factorization over `a`, returning
/// the terminal future for `A[n-1, n-1]`. `a` must be indexed by
/// [`tri_index`] and hold each tile's generation-0 handle future.
pub fn cholesky(registry: Arc<LocalityRegistry>, n: usize, mut a: Vec<TileFuture>) -> TileFuture {
    for k in 0..n {
        let potrf_kernel: Kernel = Arc::new(|bufs: &[TileBuffer]| kernels::potrf(&bufs[0]));
        let akk = a[tri_index(n, k, k)].clone();
        let new_akk = engine::submit(
            Arc::clone(&registry),
            TaskKind::Potrf,
            n,
            vec![k],
            potrf_kernel,
            vec![akk],
            0,
        );
        a[tri_index(n, k, k)] = new_akk.clone();

        for m in (k + 1)..n {
            let lkk = new_akk.clone();
            let amk = a[tri_index(n, m, k)].clone();
            let trsm_kernel: Kernel = Arc::new(|bufs: &[TileBuffer]| kernels::trsm(&bufs[0], &bufs[1]));
            let new_amk = engine::submit(
                Arc::clone(&registry),
                TaskKind::Trsm,
                n,
                vec![k, m],
                trsm_kernel,
                vec![lkk, amk],
                1,
            );
            a[tri_index(n, m, k)] = new_amk;
        }

        for m in (k + 1)..n {
            let amk = a[tri_index(n, m, k)].clone();
            let amm = a[tri_index(n, m, m)].clone();
            let syrk_kernel: Kernel = Arc::new(|bufs: &[TileBuffer]| kernels::syrk(&bufs[0], &bufs[1]));
            let new_amm = engine::submit(
                Arc::clone(&registry),
                TaskKind::Syrk,
                n,
                vec![m],
                syrk_kernel,
                vec![amm, amk.clone()],
                0,
            );
            a[tri_index(n, m, m)] = new_amm;

            for np in (k + 1)..m {
                let amk2 = amk.clone();
                let ank = a[tri_index(n, np, k)].clone();
                let amn = a[tri_index(n, m, np)].clone();
                let gemm_kernel: Kernel = Arc::new(|bufs: &[TileBuffer]| kernels::gemm(&bufs[0], &bufs[1], &bufs[2]));
                let new_amn = engine::submit(
                    Arc::clone(&registry),
                    TaskKind::Gemm,
                    n,
                    vec![k, m, np],
                    gemm_kernel,
                    vec![amn, amk2, ank],
                    0,
                );
                a[tri_index(n, m, np)] = new_amn;
            }
        }
    }

    a[tri_index(n, n - 1, n - 1)].clone()
}

/// Blocked forward-substitution solve of `L y = b`: `l` is the factored
/// lower-triangular diagonal blocks from [`cholesky`] (`tri_index`-indexed,
/// only the `col <= row` entries read), `b` is an `n`-long vector of tile
/// futures.
pub fn forward_solve(registry: Arc<LocalityRegistry>, n: usize, l: &[TileFuture], mut b: Vec<TileFuture>) -> Vec<TileFuture> {
    for k in 0..n {
        let lkk = l[tri_index(n, k, k)].clone();
        let bk = b[k].clone();
        let trsv_kernel: Kernel = Arc::new(|bufs: &[TileBuffer]| kernels::trsv(&bufs[0], &bufs[1]));
        let new_bk = engine::submit(
            Arc::clone(&registry),
            TaskKind::Trsv,
            n,
            vec![k],
            trsv_kernel,
            vec![lkk, bk],
            1,
        );
        b[k] = new_bk.clone();

        for m in (k + 1)..n {
            let lmk = l[tri_index(n, m, k)].clone();
            let bk2 = new_bk.clone();
            let bm = b[m].clone();
            let gemv_kernel: Kernel = Arc::new(|bufs: &[TileBuffer]| gemv_update(bufs));
            let new_bm = engine::submit(
                Arc::clone(&registry),
                TaskKind::SolveGemv,
                n,
                vec![k, m],
                gemv_kernel,
                vec![bm, lmk, bk2],
                0,
            );
            b[m] = new_bm;
        }
    }
    b
}

fn gemv_update(bufs: &[TileBuffer]) -> crate::error::CoreResult<TileBuffer> {
    // bufs = [y, a, x]; computes y - a * x.
    kernels::gemv(&bufs[1], &bufs[2], &bufs[0], -1.0, false)
}

/// Blocked back-substitution solve of `L^T x = y`: `l` is the same factor
/// [`forward_solve`] consumes; `y` is its output. Together the two sweeps
/// solve `A x = b` for `A = L L^T`, walking the diagonal blocks from last
/// to first and pushing each solved block's contribution into the blocks
/// above it.
pub fn back_solve(registry: Arc<LocalityRegistry>, n: usize, l: &[TileFuture], mut y: Vec<TileFuture>) -> Vec<TileFuture> {
    for k in (0..n).rev() {
        let lkk = l[tri_index(n, k, k)].clone();
        let yk = y[k].clone();
        let trsv_kernel: Kernel = Arc::new(|bufs: &[TileBuffer]| kernels::trsv_transpose(&bufs[0], &bufs[1]));
        let new_yk = engine::submit(
            Arc::clone(&registry),
            TaskKind::Trsv,
            n,
            vec![k],
            trsv_kernel,
            vec![lkk, yk],
            1,
        );
        y[k] = new_yk.clone();

        for m in 0..k {
            let lkm = l[tri_index(n, k, m)].clone();
            let yk2 = new_yk.clone();
            let ym = y[m].clone();
            let gemv_kernel: Kernel = Arc::new(|bufs: &[TileBuffer]| gemv_transpose_update(bufs));
            let new_ym = engine::submit(
                Arc::clone(&registry),
                TaskKind::SolveGemv,
                n,
                vec![k, m],
                gemv_kernel,
                vec![ym, lkm, yk2],
                0,
            );
            y[m] = new_ym;
        }
    }
    y
}

fn gemv_transpose_update(bufs: &[TileBuffer]) -> crate::error::CoreResult<TileBuffer> {
    // bufs = [x, a, y]; computes x - a^T * y.
    kernels::gemv(&bufs[1], &bufs[2], &bufs[0], -1.0, true)
}

/// Gaussian-process prediction sweep: accumulates `mean = mean + alpha_i *
/// cross_cov_i` across the training blocks via GEMV. `cross_cov` and
/// `alpha` are `n`-long; `mean` is the single output accumulator tile.
pub fn predict_sweep(
    registry: Arc<LocalityRegistry>,
    n: usize,
    cross_cov: Vec<TileFuture>,
    alpha: Vec<TileFuture>,
    mut mean: TileFuture,
) -> TileFuture {
    for i in 0..n {
        let cov_i = cross_cov[i].clone();
        let alpha_i = alpha[i].clone();
        let mean_prev = mean.clone();
        let gemv_kernel: Kernel = Arc::new(|bufs: &[TileBuffer]| kernels::gemv(&bufs[1], &bufs[2], &bufs[0], 1.0, true));
        mean = engine::submit(
            Arc::clone(&registry),
            TaskKind::AlphaPrediction,
            n,
            vec![i],
            gemv_kernel,
            vec![mean_prev, cov_i, alpha_i],
            0,
        );
    }
    mean
}

/// AXPY-based loss reduction: accumulates a 1x1 loss tile across `n`
/// per-tile data-fit contributions.
pub fn loss_reduction(registry: Arc<LocalityRegistry>, n: usize, alpha: Vec<TileFuture>, y: Vec<TileFuture>, mut loss: TileFuture) -> TileFuture {
    for k in 0..n {
        let alpha_k = alpha[k].clone();
        let y_k = y[k].clone();
        let loss_prev = loss.clone();
        let loss_kernel: Kernel = Arc::new(|bufs: &[TileBuffer]| {
            let contribution = kernels::compute_loss(&bufs[1], &bufs[2])?;
            kernels::axpy(&contribution, &bufs[0], 1.0)
        });
        loss = engine::submit(
            Arc::clone(&registry),
            TaskKind::Loss,
            n,
            vec![k],
            loss_kernel,
            vec![loss_prev, alpha_k, y_k],
            0,
        );
    }
    loss
}

/// Gradient-tile producer DAG for hyperparameter optimization: for each
/// training block, produces the lengthscale and variance gradient
/// contributions by combining `grad_l`/`grad_v` kernel tiles with the
/// running `alpha` and trace-diagonal accumulators via `dot_diag_gemm`.
pub fn gradient_sweep(
    registry: Arc<LocalityRegistry>,
    n: usize,
    alpha: Vec<TileFuture>,
    grad_l: Vec<TileFuture>,
    grad_v: Vec<TileFuture>,
    mut grad_l_acc: TileFuture,
    mut grad_v_acc: TileFuture,
) -> (TileFuture, TileFuture) {
    for k in 0..n {
        let alpha_k = alpha[k].clone();
        let gl_k = grad_l[k].clone();
        let gv_k = grad_v[k].clone();
        let acc_l_prev = grad_l_acc.clone();
        let acc_v_prev = grad_v_acc.clone();

        let dot_diag_kernel: Kernel = Arc::new(|bufs: &[TileBuffer]| kernels::dot_diag_gemm(&bufs[1], &bufs[2], &bufs[0]));
        grad_l_acc = engine::submit(
            Arc::clone(&registry),
            TaskKind::KRankGemm,
            n,
            vec![0, k, 0],
            dot_diag_kernel.clone(),
            vec![acc_l_prev, gl_k, alpha_k.clone()],
            0,
        );
        grad_v_acc = engine::submit(
            Arc::clone(&registry),
            TaskKind::KRankGemm,
            n,
            vec![0, k, 0],
            dot_diag_kernel,
            vec![acc_v_prev, gv_k, alpha_k],
            0,
        );
    }
    (grad_l_acc, grad_v_acc)
}
