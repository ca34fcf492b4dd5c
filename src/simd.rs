//! SIMD-accelerated float helpers via trueno
//!
//! The quantized pipeline runs on integer levels; float work is limited to
//! the decoder's source summary, the float reference product used by tests
//! and benchmarks, and error reporting. Those go through trueno's
//! backend-agnostic SIMD kernels.

use trueno::{Backend, Matrix, Vector};

/// Name of the best SIMD backend trueno selects on this machine
#[must_use]
pub fn backend_name() -> &'static str {
    match trueno::select_best_available_backend() {
        Backend::Scalar => "Scalar",
        Backend::SSE2 => "SSE2",
        Backend::AVX => "AVX",
        Backend::AVX2 => "AVX2",
        Backend::AVX512 => "AVX512",
        Backend::NEON => "NEON",
        Backend::WasmSIMD => "WasmSIMD",
        Backend::GPU => "GPU",
        Backend::Auto => "Auto",
    }
}

// ============================================================================
// Vector Operations
// ============================================================================

/// SIMD-accelerated vector addition
#[must_use]
pub fn add(a: &[f32], b: &[f32]) -> Vec<f32> {
    debug_assert_eq!(a.len(), b.len(), "addition requires equal lengths");

    let va = Vector::from_slice(a);
    let vb = Vector::from_slice(b);
    va.add(&vb)
        .map_or_else(|_| vec![0.0; a.len()], |v| v.as_slice().to_vec())
}

/// SIMD-accelerated scalar multiplication
#[must_use]
pub fn scale(a: &[f32], s: f32) -> Vec<f32> {
    let va = Vector::from_slice(a);
    va.scale(s)
        .map_or_else(|_| vec![0.0; a.len()], |v| v.as_slice().to_vec())
}

/// SIMD-accelerated max
#[must_use]
pub fn max(a: &[f32]) -> f32 {
    if a.is_empty() {
        return f32::NEG_INFINITY;
    }
    let va = Vector::from_slice(a);
    va.max().unwrap_or(f32::NEG_INFINITY)
}

/// Largest absolute elementwise difference
#[must_use]
pub fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "difference requires equal lengths");
    let diffs: Vec<f32> = a.iter().zip(b).map(|(x, y)| (x - y).abs()).collect();
    if diffs.is_empty() {
        0.0
    } else {
        max(&diffs)
    }
}

/// Mean of the selected `cols`-wide rows of `data`
///
/// Returns zeros when no row is selected.
#[must_use]
pub fn mean_rows<'a>(rows: impl IntoIterator<Item = &'a [f32]>, cols: usize) -> Vec<f32> {
    let mut acc = vec![0.0_f32; cols];
    let mut count = 0_usize;
    for row in rows {
        acc = add(&acc, row);
        count += 1;
    }
    if count == 0 {
        return acc;
    }
    #[allow(clippy::cast_precision_loss)]
    scale(&acc, 1.0 / count as f32)
}

// ============================================================================
// Matrix Operations
// ============================================================================

/// SIMD-accelerated matrix multiplication
///
/// Computes C = A @ B where A is (rows x inner) and B is (inner x cols)
#[must_use]
#[allow(clippy::many_single_char_names)]
pub fn matmul(a: &[f32], b: &[f32], rows: usize, inner: usize, cols: usize) -> Vec<f32> {
    debug_assert_eq!(a.len(), rows * inner, "A dimensions mismatch");
    debug_assert_eq!(b.len(), inner * cols, "B dimensions mismatch");

    let Ok(ma) = Matrix::from_vec(rows, inner, a.to_vec()) else {
        return vec![0.0; rows * cols];
    };
    let Ok(mb) = Matrix::from_vec(inner, cols, b.to_vec()) else {
        return vec![0.0; rows * cols];
    };
    ma.matmul(&mb)
        .map_or_else(|_| vec![0.0; rows * cols], |mc| mc.as_slice().to_vec())
}

/// SIMD-accelerated matrix transpose
#[must_use]
pub fn transpose(a: &[f32], rows: usize, cols: usize) -> Vec<f32> {
    debug_assert_eq!(a.len(), rows * cols, "dimensions mismatch");

    let Ok(ma) = Matrix::from_vec(rows, cols, a.to_vec()) else {
        return vec![0.0; rows * cols];
    };
    ma.transpose().as_slice().to_vec()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn vec_approx_eq(a: &[f32], b: &[f32]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| approx_eq(*x, *y))
    }

    #[test]
    fn test_backend_available() {
        let name = backend_name();
        assert!(!name.is_empty());
    }

    // =========================================================================
    // Vector Operation Tests
    // =========================================================================

    #[test]
    fn test_add() {
        let result = add(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]);
        assert!(vec_approx_eq(&result, &[5.0, 7.0, 9.0]));
    }

    #[test]
    fn test_scale() {
        let result = scale(&[1.0, 2.0, 3.0], 2.0);
        assert!(vec_approx_eq(&result, &[2.0, 4.0, 6.0]));
    }

    #[test]
    fn test_max() {
        let a = [1.0, 5.0, 3.0, 2.0];
        assert!(approx_eq(max(&a), 5.0));
        assert!(max(&[]).is_infinite());
    }

    #[test]
    fn test_max_abs_diff() {
        assert!(approx_eq(max_abs_diff(&[1.0, 2.0], &[1.5, -1.0]), 3.0));
        assert!(approx_eq(max_abs_diff(&[], &[]), 0.0));
    }

    #[test]
    fn test_mean_rows() {
        let data = [1.0, 2.0, 3.0, 4.0, 100.0, 100.0];
        let mean = mean_rows(data.chunks(2).take(2), 2);
        assert!(vec_approx_eq(&mean, &[2.0, 3.0]));
        let empty = mean_rows(std::iter::empty(), 2);
        assert!(vec_approx_eq(&empty, &[0.0, 0.0]));
    }

    // =========================================================================
    // Matrix Operation Tests
    // =========================================================================

    #[test]
    fn test_matmul_2x2() {
        let result = matmul(&[1.0, 2.0, 3.0, 4.0], &[5.0, 6.0, 7.0, 8.0], 2, 2, 2);
        assert!(vec_approx_eq(&result, &[19.0, 22.0, 43.0, 50.0]));
    }

    #[test]
    fn test_transpose() {
        let result = transpose(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
        assert!(vec_approx_eq(&result, &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]));
    }
}
