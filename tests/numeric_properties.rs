//! Property tests for the quantized numeric layer
//!
//! Round-trip error, GEMM layout equivalence, harmonization idempotence and
//! softmax normalization under random inputs.

use nmt_q8::backend::CpuBackend;
use nmt_q8::gemm::{prod, qgemm, reference_prod, GemmScratch};
use nmt_q8::harmonize::harmonize;
use nmt_q8::quant::{dequantize, float_for_one_level, quantize, QuantRange};
use nmt_q8::softmax::{log_softmax_rows, softmax_rows};
use nmt_q8::{FloatMatrix, QMatrix};
use proptest::prelude::*;

// ============================================================================
// Helpers
// ============================================================================

fn matrix(rows: usize, cols: usize, seed: f32, scale: f32) -> QMatrix {
    let values: Vec<f32> = (0..rows * cols)
        .map(|i| ((i as f32 + seed) * 0.61).sin() * scale)
        .collect();
    QMatrix::from_f32(rows, cols, &values).expect("matrix")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Dequantizing a quantized value lands within one level of it
    #[test]
    fn prop_round_trip_within_one_level(
        lo in -50.0f32..-0.01,
        hi in 0.01f32..50.0,
        t in 0.0f32..=1.0,
    ) {
        let range = QuantRange::new(lo, hi);
        let value = lo + t * (hi - lo);
        let back = dequantize(quantize::<u8>(value, range), range);
        let level = float_for_one_level::<u8>(range);
        prop_assert!((back - value).abs() <= level * 1.01 + 1e-5,
            "{value} -> {back} with level {level}");
    }

    /// Reading an operand through its stored transpose gives the same bits
    #[test]
    fn prop_gemm_transposed_operand_identical(
        m in 1usize..8,
        k in 1usize..12,
        n in 1usize..8,
        seed in 0.0f32..10.0,
    ) {
        let backend = CpuBackend::new();
        let mut scratch = GemmScratch::new();
        let a = matrix(m, k, seed, 1.0);
        let b = matrix(k, n, seed + 3.0, 2.0);
        let at = a.transpose().expect("transpose");
        let bt = b.transpose().expect("transpose");

        let mut direct = QMatrix::new();
        let mut via_transpose = QMatrix::new();
        qgemm(&backend, &mut scratch, &a, false, &b, false, false, &mut direct).expect("gemm");
        qgemm(&backend, &mut scratch, &at, true, &bt, true, false, &mut via_transpose)
            .expect("gemm");
        prop_assert_eq!(&direct, &via_transpose);
    }

    /// The swapped product agrees with the float reference
    #[test]
    fn prop_prod_close_to_reference(
        m in 1usize..6,
        k in 1usize..10,
        n in 1usize..12,
        seed in 0.0f32..10.0,
    ) {
        let backend = CpuBackend::new();
        let mut scratch = GemmScratch::new();
        let a = matrix(m, k, seed, 1.0);
        let b = matrix(k, n, seed + 7.0, 1.0);
        let mut c = QMatrix::new();
        prod(&backend, &mut scratch, &a, false, &b, false, &mut c).expect("prod");
        let (rows, cols, expected) = reference_prod(&a, false, &b, false).expect("reference");
        prop_assert_eq!(c.shape(), (rows, cols));
        // zero-point rounding of both operands plus output rounding
        let tol = k as f32
            * (float_for_one_level::<u8>(a.range()) + float_for_one_level::<u8>(b.range()))
            + float_for_one_level::<u8>(c.range())
            + 1e-4;
        for (x, y) in c.to_f32().iter().zip(&expected) {
            prop_assert!((x - y).abs() <= tol, "{x} vs {y}");
        }
    }

    /// A second harmonization changes nothing
    #[test]
    fn prop_harmonize_idempotent(
        scale_a in 0.1f32..20.0,
        scale_b in 0.1f32..20.0,
        seed in 0.0f32..10.0,
    ) {
        let mut a = matrix(3, 4, seed, scale_a);
        let mut b = matrix(3, 4, seed + 1.0, scale_b);
        let first = harmonize(&mut [&mut a, &mut b]);
        prop_assert_eq!(a.range(), first);
        prop_assert_eq!(b.range(), first);
        let data = (a.data().to_vec(), b.data().to_vec());

        let second = harmonize(&mut [&mut a, &mut b]);
        prop_assert_eq!(first, second);
        prop_assert_eq!(data, (a.data().to_vec(), b.data().to_vec()));
    }

    /// Softmax rows sum to one up to output rounding
    #[test]
    fn prop_softmax_rows_sum_to_one(
        rows in 1usize..5,
        cols in 1usize..16,
        scale in 0.1f32..30.0,
        seed in 0.0f32..10.0,
    ) {
        let input = matrix(rows, cols, seed, scale);
        let mut out = QMatrix::new();
        softmax_rows(&CpuBackend::new(), &input, &vec![cols; rows], &mut out).expect("softmax");
        let tol = cols as f32 * 0.5 / 255.0 + 1e-4;
        for r in 0..rows {
            let sum: f32 = (0..cols).map(|j| out.get_f32(r, j)).sum();
            prop_assert!((sum - 1.0).abs() <= tol, "row {r} sums to {sum}");
        }

        let mut log = FloatMatrix::new();
        log_softmax_rows(&input, &mut log).expect("log softmax");
        for r in 0..rows {
            let sum: f32 = log.row(r).iter().map(|lp| lp.exp()).sum();
            prop_assert!((sum - 1.0).abs() < 1e-3, "row {r} sums to {sum}");
        }
    }
}

#[test]
fn test_degenerate_range_round_trip() {
    let range = QuantRange::new(2.5, 2.5);
    assert_eq!(quantize::<u8>(7.0, range), 0);
    assert!((dequantize(0_u8, range) - 2.5).abs() < f32::EPSILON);
}
