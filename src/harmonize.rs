//! Range harmonization
//!
//! Elementwise integer arithmetic is only meaningful between matrices that
//! share one range. [`harmonize`] widens every operand to the union of all
//! ranges, leaving operands already in that range untouched.
//! [`sum_biased`] builds on it for the recurring "project, add biases,
//! activate" pattern of the decoder.

use crate::backend::ComputeBackend;
use crate::error::{NmtError, NmtResult};
use crate::matrix::QMatrix;
use crate::quant::{qsum_iter, quantize, requantize_in_place, LookupTable, QuantRange};

/// Smallest range covering every matrix's range
#[must_use]
pub fn total_range(matrices: &[&QMatrix]) -> QuantRange {
    matrices
        .iter()
        .map(|m| m.range())
        .reduce(|a, b| a.union(&b))
        .unwrap_or(QuantRange::ZERO)
}

/// Requantize `m` into `range` unless it is already there
pub fn requantize_total(m: &mut QMatrix, range: QuantRange) {
    if m.range() != range {
        let from = m.range();
        requantize_in_place(m.data_mut(), from, range);
        m.set_range(range);
    }
}

/// Bring every matrix into their common total range and return it
pub fn harmonize(matrices: &mut [&mut QMatrix]) -> QuantRange {
    let range = matrices
        .iter()
        .map(|m| m.range())
        .reduce(|a, b| a.union(&b))
        .unwrap_or(QuantRange::ZERO);
    for m in matrices.iter_mut() {
        requantize_total(m, range);
    }
    range
}

// ============================================================================
// Fused Sum
// ============================================================================

/// Nonlinearity applied after [`sum_biased`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Keep the sum in the total range
    Identity,
    /// Table tanh into `[-1, 1]`
    Tanh,
}

/// `out = f(sum(terms) + sum(biases))`, broadcasting each `1 x cols` bias
///
/// Terms and biases are harmonized in place first.
///
/// # Errors
///
/// Returns [`NmtError::ShapeMismatch`] if there are no terms or any
/// shape disagrees.
pub fn sum_biased(
    backend: &dyn ComputeBackend,
    terms: &mut [&mut QMatrix],
    biases: &mut [&mut QMatrix],
    activation: Activation,
    out: &mut QMatrix,
) -> NmtResult<()> {
    let (rows, cols) = terms
        .first()
        .map(|t| t.shape())
        .ok_or_else(|| NmtError::ShapeMismatch("sum of no terms".into()))?;
    if terms.iter().any(|t| t.shape() != (rows, cols))
        || biases.iter().any(|b| b.shape() != (1, cols))
    {
        return Err(NmtError::ShapeMismatch(format!(
            "elementwise sum operands disagree with {rows}x{cols}"
        )));
    }
    let total = {
        let mut all: Vec<&mut QMatrix> = terms
            .iter_mut()
            .map(|t| &mut **t)
            .chain(biases.iter_mut().map(|b| &mut **b))
            .collect();
        harmonize(&mut all)
    };
    let zero = quantize::<u8>(0.0, total);
    let table = match activation {
        Activation::Identity => None,
        Activation::Tanh => Some(LookupTable::tanh(total, QuantRange::UNIT_SIGNED)),
    };

    out.resize(rows, cols)?;
    out.set_range(table.as_ref().map_or(total, LookupTable::output_range));
    let terms: Vec<&QMatrix> = terms.iter().map(|t| &**t).collect();
    let biases: Vec<&[u8]> = biases.iter().map(|b| b.data()).collect();
    backend.map_rows(out.data_mut(), cols, &|r, dst: &mut [u8]| {
        for (c, q) in dst.iter_mut().enumerate() {
            let levels = terms
                .iter()
                .map(|t| t.get(r, c))
                .chain(biases.iter().map(|b| b[c]));
            let sum = qsum_iter(zero, levels);
            *q = table.as_ref().map_or(sum, |t| t.get(sum));
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::quant::float_for_one_level;

    fn m(values: &[f32]) -> QMatrix {
        QMatrix::from_f32(1, values.len(), values).expect("matrix")
    }

    #[test]
    fn test_total_range() {
        let a = m(&[1.0, 2.0]);
        let b = m(&[-3.0, 0.5]);
        let r = total_range(&[&a, &b]);
        assert!((r.min() + 3.0).abs() < f32::EPSILON);
        assert!((r.max() - 2.0).abs() < f32::EPSILON);
        assert_eq!(total_range(&[]), QuantRange::ZERO);
    }

    #[test]
    fn test_harmonize_preserves_values() {
        let mut a = m(&[1.0, 2.0]);
        let mut b = m(&[-3.0, 0.5]);
        let range = harmonize(&mut [&mut a, &mut b]);
        assert_eq!(a.range(), range);
        assert_eq!(b.range(), range);
        let level = float_for_one_level::<u8>(range);
        // one level from the initial quantization plus one from requantizing
        let tol = level + float_for_one_level::<u8>(QuantRange::new(-3.0, 0.5));
        assert!((a.get_f32(0, 1) - 2.0).abs() <= tol);
        assert!((b.get_f32(0, 0) + 3.0).abs() <= tol);
    }

    #[test]
    fn test_harmonize_is_idempotent() {
        let mut a = m(&[1.0, 2.0, -0.25]);
        let mut b = m(&[-3.0, 0.5, 0.0]);
        harmonize(&mut [&mut a, &mut b]);
        let (da, db) = (a.data().to_vec(), b.data().to_vec());
        harmonize(&mut [&mut a, &mut b]);
        assert_eq!(a.data(), da.as_slice());
        assert_eq!(b.data(), db.as_slice());
    }

    #[test]
    fn test_matching_range_untouched() {
        let mut a = m(&[1.0, -1.0]);
        let before = a.data().to_vec();
        let range = a.range();
        requantize_total(&mut a, range);
        assert_eq!(a.data(), before.as_slice());
    }

    // =========================================================================
    // Fused Sum Tests
    // =========================================================================

    #[test]
    fn test_sum_biased_identity() {
        let mut a = QMatrix::from_f32(2, 2, &[1.0, 2.0, -1.0, 0.0]).expect("a");
        let mut b = QMatrix::from_f32(2, 2, &[0.5, -0.5, 0.25, 1.0]).expect("b");
        let mut bias = m(&[0.5, -1.0]);
        let mut out = QMatrix::new();
        sum_biased(
            &CpuBackend::new(),
            &mut [&mut a, &mut b],
            &mut [&mut bias],
            Activation::Identity,
            &mut out,
        )
        .expect("sum");
        let expected = [2.0, 0.5, -0.25, 0.0];
        let tol = 4.0 * float_for_one_level::<u8>(out.range());
        for (x, y) in out.to_f32().iter().zip(expected) {
            assert!((x - y).abs() <= tol, "{x} vs {y}");
        }
    }

    #[test]
    fn test_sum_biased_tanh_range() {
        let mut a = QMatrix::from_f32(1, 3, &[3.0, 0.0, -3.0]).expect("a");
        let mut out = QMatrix::new();
        sum_biased(
            &CpuBackend::new(),
            &mut [&mut a],
            &mut [],
            Activation::Tanh,
            &mut out,
        )
        .expect("sum");
        assert_eq!(out.range(), QuantRange::UNIT_SIGNED);
        let v = out.to_f32();
        assert!((v[0] - 3.0_f32.tanh()).abs() < 0.03);
        assert!(v[1].abs() < 0.03);
        assert!((v[2] + 3.0_f32.tanh()).abs() < 0.03);
    }

    #[test]
    fn test_sum_biased_shape_errors() {
        let backend = CpuBackend::new();
        let mut out = QMatrix::new();
        assert!(sum_biased(&backend, &mut [], &mut [], Activation::Identity, &mut out).is_err());
        let mut a = m(&[1.0, 2.0]);
        let mut bias = m(&[1.0, 2.0, 3.0]);
        assert!(sum_biased(
            &backend,
            &mut [&mut a],
            &mut [&mut bias],
            Activation::Identity,
            &mut out
        )
        .is_err());
    }
}
