//! Sequential CPU backend and the shared row kernels
//!
//! [`ParallelBackend`](super::ParallelBackend) splits work by output row and
//! calls the same kernels, which keeps both backends bit-identical.

use super::traits::{
    BackendCapabilities, BackendType, ComputeBackend, GemmProblem, RowFn,
};

/// GEMM operands unpacked into offset-corrected, `k`-contiguous rows
#[derive(Debug)]
pub(crate) struct PackedGemm {
    /// `op(A)` rows, `m x k`
    lhs: Vec<i64>,
    /// `op(B)` columns, `n x k`
    rhs: Vec<i64>,
    m: usize,
    k: usize,
    n: usize,
    trans_c: bool,
}

impl PackedGemm {
    pub(crate) fn new(problem: &GemmProblem<'_>) -> Self {
        let (m, k, n) = (problem.m(), problem.k(), problem.n());
        let mut lhs = Vec::with_capacity(m * k);
        for i in 0..m {
            lhs.extend((0..k).map(|p| problem.a.at(i, p)));
        }
        let mut rhs = Vec::with_capacity(n * k);
        for j in 0..n {
            rhs.extend((0..k).map(|p| problem.b.at(p, j)));
        }
        Self {
            lhs,
            rhs,
            m,
            k,
            n,
            trans_c: problem.trans_c,
        }
    }

    /// Width of one stored output row
    pub(crate) fn row_width(&self) -> usize {
        if self.trans_c {
            self.m
        } else {
            self.n
        }
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn dot(&self, i: usize, j: usize) -> i32 {
        let a = &self.lhs[i * self.k..(i + 1) * self.k];
        let b = &self.rhs[j * self.k..(j + 1) * self.k];
        let acc = a
            .iter()
            .zip(b)
            .fold(0_i64, |acc, (&x, &y)| acc.saturating_add(x.saturating_mul(y)));
        acc.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    /// Fill stored output row `row`
    pub(crate) fn output_row(&self, row: usize, out: &mut [i32]) {
        if self.trans_c {
            for (i, dst) in out.iter_mut().enumerate() {
                *dst = self.dot(i, row);
            }
        } else {
            for (j, dst) in out.iter_mut().enumerate() {
                *dst = self.dot(row, j);
            }
        }
    }
}

/// Sequential reference backend
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl CpuBackend {
    /// Create the backend
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ComputeBackend for CpuBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Cpu
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::new(BackendType::Cpu, 1)
    }

    fn multiply_accumulate(&self, problem: &GemmProblem<'_>, out: &mut [i32]) {
        let packed = PackedGemm::new(problem);
        let width = packed.row_width();
        if width == 0 {
            return;
        }
        for (row, chunk) in out.chunks_mut(width).enumerate() {
            packed.output_row(row, chunk);
        }
    }

    fn map_rows(&self, data: &mut [u8], cols: usize, f: &RowFn<'_>) {
        if cols == 0 {
            return;
        }
        for (row, chunk) in data.chunks_mut(cols).enumerate() {
            f(row, chunk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::traits::GemmOperand;

    fn problem<'a>(a: &'a [u8], b: &'a [u8], trans_c: bool) -> GemmProblem<'a> {
        GemmProblem {
            a: GemmOperand {
                data: a,
                rows: 2,
                cols: 2,
                transposed: false,
                offset: 0,
            },
            b: GemmOperand {
                data: b,
                rows: 2,
                cols: 3,
                transposed: false,
                offset: 0,
            },
            trans_c,
        }
    }

    #[test]
    fn test_multiply_accumulate_plain() {
        let a = [1_u8, 2, 3, 4];
        let b = [1_u8, 0, 2, 0, 1, 1];
        let mut out = vec![0_i32; 6];
        CpuBackend::new().multiply_accumulate(&problem(&a, &b, false), &mut out);
        assert_eq!(out, vec![1, 2, 4, 3, 4, 10]);
    }

    #[test]
    fn test_multiply_accumulate_transposed_output() {
        let a = [1_u8, 2, 3, 4];
        let b = [1_u8, 0, 2, 0, 1, 1];
        let mut out = vec![0_i32; 6];
        CpuBackend::new().multiply_accumulate(&problem(&a, &b, true), &mut out);
        assert_eq!(out, vec![1, 3, 2, 4, 4, 10]);
    }

    #[test]
    fn test_multiply_accumulate_offsets() {
        let a = [129_u8, 130];
        let b = [130_u8, 126];
        let p = GemmProblem {
            a: GemmOperand {
                data: &a,
                rows: 1,
                cols: 2,
                transposed: false,
                offset: 128,
            },
            b: GemmOperand {
                data: &b,
                rows: 2,
                cols: 1,
                transposed: false,
                offset: 128,
            },
            trans_c: false,
        };
        let mut out = vec![0_i32; 1];
        CpuBackend::new().multiply_accumulate(&p, &mut out);
        // 1*2 + 2*(-2)
        assert_eq!(out, vec![-2]);
    }

    #[test]
    fn test_multiply_accumulate_extreme_offsets_saturate() {
        let a = [255_u8, 255];
        let b = [0_u8, 0];
        let p = GemmProblem {
            a: GemmOperand {
                data: &a,
                rows: 1,
                cols: 2,
                transposed: false,
                offset: -i64::from(i32::MAX),
            },
            b: GemmOperand {
                data: &b,
                rows: 2,
                cols: 1,
                transposed: false,
                offset: -i64::from(i32::MAX),
            },
            trans_c: false,
        };
        let mut out = vec![0_i32; 1];
        CpuBackend::new().multiply_accumulate(&p, &mut out);
        assert_eq!(out, vec![i32::MAX]);
    }

    #[test]
    fn test_map_rows_passes_row_index() {
        let mut data = vec![0_u8; 6];
        CpuBackend::new().map_rows(&mut data, 3, &|row, values: &mut [u8]| {
            for v in values.iter_mut() {
                *v = u8::try_from(row).unwrap_or(u8::MAX);
            }
        });
        assert_eq!(data, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_capabilities() {
        let caps = CpuBackend::new().capabilities();
        assert_eq!(caps.backend_type, BackendType::Cpu);
        assert_eq!(caps.threads, 1);
    }
}
