//! Placement policy: Local / SMA / Cyclic.

use crate::error::{CoreError, CoreResult};

/// Which dataflow operation a placement decision is being made for. Each
/// kind is placed using its own coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Potrf,
    Trsm,
    Syrk,
    Gemm,
    Trsv,
    SolveGemv,
    MatrixTrsm,
    MatrixGemm,
    CovarianceTile,
    AlphaPrediction,
    KRankGemm,
    VectorAxpy,
    Diagonal,
    Loss,
}

/// A placement policy. `Local` always targets locality 0; `Sma` is
/// symmetric modulo arithmetic over `localities` localities; `Cyclic` is a
/// 2D block-cyclic grid of `width x height` localities.
#[derive(Debug, Clone, Copy)]
pub enum Scheduler {
    Local,
    Sma { localities: usize },
    Cyclic { width: usize, height: usize },
}

impl Scheduler {
    pub fn local() -> Self {
        Scheduler::Local
    }

    pub fn sma(localities: usize) -> CoreResult<Self> {
        if localities == 0 {
            return Err(CoreError::Configuration(
                "sma scheduler requires at least one locality".into(),
            ));
        }
        Ok(Scheduler::Sma { localities })
    }

    /// Validates `localities == width * height` before constructing the
    /// scheduler — a non-divisible grid is rejected at construction, never
    /// at task-submission time.
    pub fn cyclic(localities: usize, width: usize, height: usize) -> CoreResult<Self> {
        if width == 0 || height == 0 {
            return Err(CoreError::Configuration(
                "cyclic scheduler requires positive width and height".into(),
            ));
        }
        if localities != width * height {
            return Err(CoreError::Configuration(format!(
                "cyclic scheduler needs {} localities ({width}x{height}), got {localities}",
                width * height
            )));
        }
        Ok(Scheduler::Cyclic { width, height })
    }

    pub fn num_localities(&self) -> usize {
        match self {
            Scheduler::Local => 1,
            Scheduler::Sma { localities } => *localities,
            Scheduler::Cyclic { width, height } => width * height,
        }
    }

    /// Computes the target locality (always `< num_localities()`) for a
    /// task of kind `kind` at dataflow indices `indices`, given the total
    /// number of tiles `n_tiles` in the dataset (needed only by the
    /// rank/vector kinds' cyclic formulas). Panics if `indices` has the
    /// wrong arity for `kind` — that's a caller bug, not a runtime
    /// condition.
    pub fn on(&self, kind: TaskKind, n_tiles: usize, indices: &[usize]) -> usize {
        use TaskKind::*;

        let l = self.num_localities();
        let sma = |v: usize| v % l;
        let cyclic = |a: usize, b: usize| match self {
            Scheduler::Cyclic { width, height } => (a % height) + (b % width),
            _ => unreachable!("cyclic closure only called for Scheduler::Cyclic"),
        };

        match (kind, indices) {
            (Potrf, [k]) | (Trsv, [k]) | (AlphaPrediction, [k]) => match self {
                Scheduler::Local => 0,
                Scheduler::Sma { .. } => sma(2 * k),
                Scheduler::Cyclic { .. } => cyclic(*k, *k),
            },
            (Syrk, [m]) => match self {
                Scheduler::Local => 0,
                Scheduler::Sma { .. } => sma(2 * m),
                Scheduler::Cyclic { .. } => cyclic(*m, *m),
            },
            (Trsm, [k, m]) => match self {
                Scheduler::Local => 0,
                Scheduler::Sma { .. } => sma(k + m),
                Scheduler::Cyclic { .. } => cyclic(*m, *k),
            },
            (Gemm, [_k, m, n]) => match self {
                Scheduler::Local => 0,
                Scheduler::Sma { .. } => sma(m + n),
                Scheduler::Cyclic { .. } => cyclic(*m, *n),
            },
            (SolveGemv, [k, m]) => match self {
                Scheduler::Local => 0,
                Scheduler::Sma { .. } => sma(k + m),
                Scheduler::Cyclic { .. } => cyclic(*k, *m),
            },
            (MatrixTrsm, [c, k]) => match self {
                Scheduler::Local => 0,
                Scheduler::Sma { .. } => sma(k + c),
                Scheduler::Cyclic { .. } => cyclic(*k, *c),
            },
            (MatrixGemm, [c, _k, m]) => match self {
                Scheduler::Local => 0,
                Scheduler::Sma { .. } => sma(c + m),
                Scheduler::Cyclic { .. } => cyclic(*m, *c),
            },
            (CovarianceTile, [row, col]) => match self {
                Scheduler::Local => 0,
                Scheduler::Sma { .. } => sma(row + col),
                Scheduler::Cyclic { .. } => cyclic(*row, *col),
            },
            (KRankGemm, [_c, k, m]) => match self {
                Scheduler::Local => 0,
                Scheduler::Sma { .. } => sma(k + m),
                Scheduler::Cyclic { .. } => (k * n_tiles + m) % l,
            },
            (VectorAxpy, [k]) | (Diagonal, [k]) | (Loss, [k]) => match self {
                Scheduler::Local => 0,
                Scheduler::Sma { .. } => sma(2 * k),
                Scheduler::Cyclic { .. } => (k * n_tiles + k) % l,
            },
            _ => panic!("placement kind {kind:?} called with wrong index arity ({indices:?})"),
        }
    }
}
