//! Backend trait abstractions
//!
//! A backend supplies the two primitives every hot loop reduces to: the
//! integer multiply-accumulate behind quantized GEMM, and a row-wise map used
//! for table-driven elementwise updates. All algorithms above this layer are
//! backend-agnostic.

use std::fmt;

/// Compute backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "cli", derive(serde::Serialize, serde::Deserialize))]
pub enum BackendType {
    /// Sequential CPU reference
    Cpu,
    /// CPU with a bounded worker pool
    Parallel,
    /// Pick at construction time from available threads
    #[default]
    Auto,
}

impl BackendType {
    /// Check if this is auto-selection
    #[must_use]
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }

    /// Get human-readable name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            Self::Parallel => "Parallel",
            Self::Auto => "Auto",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Backend capabilities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Backend type
    pub backend_type: BackendType,
    /// Worker threads used by the backend
    pub threads: usize,
    /// SIMD instruction set used for float helpers
    pub simd: &'static str,
}

impl BackendCapabilities {
    /// Capabilities of a backend running on `threads` threads
    #[must_use]
    pub fn new(backend_type: BackendType, threads: usize) -> Self {
        Self {
            backend_type,
            threads: threads.max(1),
            simd: crate::simd::backend_name(),
        }
    }

    /// Check if work can be split across threads
    #[must_use]
    pub fn is_parallel(&self) -> bool {
        self.threads > 1
    }
}

impl fmt::Display for BackendCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (threads={}, simd={})",
            self.backend_type, self.threads, self.simd
        )
    }
}

/// One operand of an integer GEMM
///
/// `data` is the stored `rows x cols` buffer; the logical operand is its
/// transpose when `transposed` is set. `offset` is the level representing
/// float zero and is subtracted from every element.
#[derive(Debug, Clone, Copy)]
pub struct GemmOperand<'a> {
    /// Stored levels, row-major
    pub data: &'a [u8],
    /// Stored row count
    pub rows: usize,
    /// Stored column count
    pub cols: usize,
    /// Use the transpose of the stored matrix
    pub transposed: bool,
    /// Zero-point level; lies far outside `0..=255` for ranges excluding zero
    pub offset: i64,
}

impl GemmOperand<'_> {
    /// Rows of the logical operand
    #[must_use]
    pub fn op_rows(&self) -> usize {
        if self.transposed {
            self.cols
        } else {
            self.rows
        }
    }

    /// Columns of the logical operand
    #[must_use]
    pub fn op_cols(&self) -> usize {
        if self.transposed {
            self.rows
        } else {
            self.cols
        }
    }

    /// Offset-corrected element `(i, j)` of the logical operand
    #[inline]
    #[must_use]
    pub fn at(&self, i: usize, j: usize) -> i64 {
        let idx = if self.transposed {
            j * self.cols + i
        } else {
            i * self.cols + j
        };
        i64::from(self.data[idx]) - self.offset
    }
}

/// `C = op(A) x op(B)` with `C` optionally stored transposed
#[derive(Debug, Clone, Copy)]
pub struct GemmProblem<'a> {
    /// Left operand, logically `m x k`
    pub a: GemmOperand<'a>,
    /// Right operand, logically `k x n`
    pub b: GemmOperand<'a>,
    /// Store `C` as `n x m`
    pub trans_c: bool,
}

impl GemmProblem<'_> {
    /// Rows of the logical product
    #[must_use]
    pub fn m(&self) -> usize {
        self.a.op_rows()
    }

    /// Inner dimension
    #[must_use]
    pub fn k(&self) -> usize {
        self.a.op_cols()
    }

    /// Columns of the logical product
    #[must_use]
    pub fn n(&self) -> usize {
        self.b.op_cols()
    }

    /// Shape of the stored output
    #[must_use]
    pub fn output_shape(&self) -> (usize, usize) {
        if self.trans_c {
            (self.n(), self.m())
        } else {
            (self.m(), self.n())
        }
    }
}

/// Row callback for [`ComputeBackend::map_rows`]
pub type RowFn<'a> = dyn Fn(usize, &mut [u8]) + Sync + 'a;

/// Primitive operations a compute backend must provide
///
/// Implementations must be numerically identical: the same inputs produce
/// the same accumulator bits on every backend.
pub trait ComputeBackend: Send + Sync + fmt::Debug {
    /// Backend type
    fn backend_type(&self) -> BackendType;

    /// Backend capabilities
    fn capabilities(&self) -> BackendCapabilities;

    /// Integer GEMM into `out`, which holds `output_shape()` elements
    ///
    /// Accumulation is exact in `i64` and saturated to `i32`.
    fn multiply_accumulate(&self, problem: &GemmProblem<'_>, out: &mut [i32]);

    /// Call `f(row_index, row)` for every `cols`-wide row of `data`
    fn map_rows(&self, data: &mut [u8], cols: usize, f: &RowFn<'_>);
}
