//! Worker-pool backend
//!
//! Splits GEMM by stored output row and `map_rows` by matrix row across a
//! private `rayon` pool. Row kernels are shared with [`CpuBackend`](super::CpuBackend).

use rayon::prelude::*;

use super::cpu::PackedGemm;
use super::traits::{BackendCapabilities, BackendType, ComputeBackend, GemmProblem, RowFn};
use crate::error::NmtResult;
use crate::parallel::build_pool;

/// Backend running on a bounded thread pool
#[derive(Debug)]
pub struct ParallelBackend {
    pool: rayon::ThreadPool,
    threads: usize,
}

impl ParallelBackend {
    /// Create a backend with `threads` workers
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::Backend`](crate::error::NmtError::Backend) if the
    /// pool cannot be built.
    pub fn new(threads: usize) -> NmtResult<Self> {
        let pool = build_pool(threads)?;
        let threads = pool.current_num_threads();
        Ok(Self { pool, threads })
    }

    /// Number of worker threads
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }
}

impl ComputeBackend for ParallelBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Parallel
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::new(BackendType::Parallel, self.threads)
    }

    fn multiply_accumulate(&self, problem: &GemmProblem<'_>, out: &mut [i32]) {
        let packed = PackedGemm::new(problem);
        let width = packed.row_width();
        if width == 0 {
            return;
        }
        self.pool.install(|| {
            out.par_chunks_mut(width)
                .enumerate()
                .for_each(|(row, chunk)| packed.output_row(row, chunk));
        });
    }

    fn map_rows(&self, data: &mut [u8], cols: usize, f: &RowFn<'_>) {
        if cols == 0 {
            return;
        }
        self.pool.install(|| {
            data.par_chunks_mut(cols)
                .enumerate()
                .for_each(|(row, chunk)| f(row, chunk));
        });
    }
}
