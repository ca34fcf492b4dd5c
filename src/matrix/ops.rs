//! Row and column movement between quantized matrices
//!
//! Every function writes into a caller-owned output so scratch buffers can be
//! reused across decoding steps. Copies between matrices with different
//! ranges requantize into the destination range.

use super::QMatrix;
use crate::error::{NmtError, NmtResult};
use crate::quant::{requantize_many, QuantRange};

/// Copy `src` levels into `dst`, requantizing when the ranges differ
fn transfer(src: &[u8], from: QuantRange, dst: &mut [u8], to: QuantRange) {
    if from == to {
        dst.copy_from_slice(src);
    } else {
        requantize_many(src, from, to, dst);
    }
}

fn check_row(m: &QMatrix, row: usize, what: &str) -> NmtResult<()> {
    if row >= m.rows() {
        return Err(NmtError::ShapeMismatch(format!(
            "{what} row {row} out of {} rows",
            m.rows()
        )));
    }
    Ok(())
}

/// Copy row `row` of `src` into `out` as a `1 x cols` matrix
///
/// # Errors
///
/// Returns [`NmtError::ShapeMismatch`] if `row` is out of range.
pub fn copy_row(src: &QMatrix, row: usize, out: &mut QMatrix) -> NmtResult<()> {
    check_row(src, row, "source")?;
    out.resize(1, src.cols())?;
    out.set_range(src.range());
    out.data_mut().copy_from_slice(src.row(row));
    Ok(())
}

/// Write row `src_row` of `src` into `dst` at `(dst_row, col..)`
///
/// Levels are requantized into `dst`'s range; `dst` keeps its shape and range.
///
/// # Errors
///
/// Returns [`NmtError::ShapeMismatch`] if the row does not fit.
pub fn paste_row(
    dst: &mut QMatrix,
    dst_row: usize,
    col: usize,
    src: &QMatrix,
    src_row: usize,
) -> NmtResult<()> {
    check_row(src, src_row, "source")?;
    check_row(dst, dst_row, "destination")?;
    if col + src.cols() > dst.cols() {
        return Err(NmtError::ShapeMismatch(format!(
            "{} columns at offset {col} do not fit in {}",
            src.cols(),
            dst.cols()
        )));
    }
    let to = dst.range();
    let target = &mut dst.row_mut(dst_row)[col..col + src.cols()];
    transfer(src.row(src_row), src.range(), target, to);
    Ok(())
}

/// Gather rows of `src` by index into `out`
///
/// # Errors
///
/// Returns [`NmtError::ShapeMismatch`] if any index is out of range.
pub fn assemble(src: &QMatrix, indices: &[usize], out: &mut QMatrix) -> NmtResult<()> {
    if let Some(&bad) = indices.iter().find(|&&i| i >= src.rows()) {
        return Err(NmtError::ShapeMismatch(format!(
            "row {bad} out of {} rows",
            src.rows()
        )));
    }
    out.resize(indices.len(), src.cols())?;
    out.set_range(src.range());
    for (r, &i) in indices.iter().enumerate() {
        out.row_mut(r).copy_from_slice(src.row(i));
    }
    Ok(())
}

/// Stack `a` on top of `b` in the union of their ranges
///
/// # Errors
///
/// Returns [`NmtError::ShapeMismatch`] if the column counts differ.
pub fn concat_rows(a: &QMatrix, b: &QMatrix, out: &mut QMatrix) -> NmtResult<()> {
    if a.cols() != b.cols() {
        return Err(NmtError::ShapeMismatch(format!(
            "concat rows of {}x{} and {}x{}",
            a.rows(),
            a.cols(),
            b.rows(),
            b.cols()
        )));
    }
    let range = a.range().union(&b.range());
    out.resize(a.rows() + b.rows(), a.cols())?;
    out.set_range(range);
    let (top, bottom) = out.data_mut().split_at_mut(a.len());
    transfer(a.data(), a.range(), top, range);
    transfer(b.data(), b.range(), bottom, range);
    Ok(())
}

/// Place `a` left of `b` in the union of their ranges
///
/// Built as transpose, row concatenation, transpose.
///
/// # Errors
///
/// Returns [`NmtError::ShapeMismatch`] if the row counts differ.
pub fn concat_cols(a: &QMatrix, b: &QMatrix, out: &mut QMatrix) -> NmtResult<()> {
    if a.rows() != b.rows() {
        return Err(NmtError::ShapeMismatch(format!(
            "concat columns of {}x{} and {}x{}",
            a.rows(),
            a.cols(),
            b.rows(),
            b.cols()
        )));
    }
    let at = a.transpose()?;
    let bt = b.transpose()?;
    let mut stacked = QMatrix::new();
    concat_rows(&at, &bt, &mut stacked)?;
    stacked.transpose_into(out)
}

/// Gather columns of `src` by index into `out`
///
/// # Errors
///
/// Returns [`NmtError::ShapeMismatch`] if any index is out of range.
pub fn select_cols(src: &QMatrix, indices: &[usize], out: &mut QMatrix) -> NmtResult<()> {
    if let Some(&bad) = indices.iter().find(|&&i| i >= src.cols()) {
        return Err(NmtError::ShapeMismatch(format!(
            "column {bad} out of {} columns",
            src.cols()
        )));
    }
    out.resize(src.rows(), indices.len())?;
    out.set_range(src.range());
    for r in 0..src.rows() {
        let from = src.row(r);
        for (dst, &i) in out.row_mut(r).iter_mut().zip(indices) {
            *dst = from[i];
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quant::{dequantize, float_for_one_level};

    fn sample() -> QMatrix {
        QMatrix::from_raw(3, 2, vec![1, 2, 3, 4, 5, 6], QuantRange::UNIT).expect("sample")
    }

    #[test]
    fn test_copy_row() {
        let mut out = QMatrix::new();
        copy_row(&sample(), 2, &mut out).expect("copy_row");
        assert_eq!(out.shape(), (1, 2));
        assert_eq!(out.data(), &[5, 6]);
        assert!(copy_row(&sample(), 3, &mut out).is_err());
    }

    #[test]
    fn test_paste_row_same_range() {
        let mut dst: QMatrix = QMatrix::filled(2, 4, 0.0, QuantRange::UNIT).expect("dst");
        paste_row(&mut dst, 1, 2, &sample(), 0).expect("paste");
        assert_eq!(dst.row(1), &[0, 0, 1, 2]);
        assert_eq!(dst.row(0), &[0, 0, 0, 0]);
        assert!(paste_row(&mut dst, 0, 3, &sample(), 0).is_err());
    }

    #[test]
    fn test_paste_row_requantizes() {
        let src: QMatrix =
            QMatrix::from_f32_in_range(1, 2, &[0.5, -0.5], QuantRange::UNIT_SIGNED).expect("src");
        let to = QuantRange::new(-2.0, 2.0);
        let mut dst: QMatrix = QMatrix::filled(1, 2, 0.0, to).expect("dst");
        paste_row(&mut dst, 0, 0, &src, 0).expect("paste");
        let level = float_for_one_level::<u8>(to);
        assert!((dequantize(dst.get(0, 0), to) - 0.5).abs() <= level);
        assert!((dequantize(dst.get(0, 1), to) + 0.5).abs() <= level);
    }

    #[test]
    fn test_assemble_reorders_rows() {
        let mut out = QMatrix::new();
        assemble(&sample(), &[2, 0, 2], &mut out).expect("assemble");
        assert_eq!(out.data(), &[5, 6, 1, 2, 5, 6]);
        assert!(assemble(&sample(), &[3], &mut out).is_err());
    }

    #[test]
    fn test_concat_rows_merges_ranges() {
        let a: QMatrix = QMatrix::from_f32(1, 2, &[1.0, 0.0]).expect("a");
        let b: QMatrix = QMatrix::from_f32(1, 2, &[-3.0, 0.0]).expect("b");
        let mut out = QMatrix::new();
        concat_rows(&a, &b, &mut out).expect("concat");
        assert_eq!(out.shape(), (2, 2));
        assert!((out.range().min() + 3.0).abs() < f32::EPSILON);
        assert!((out.range().max() - 1.0).abs() < f32::EPSILON);
        let level = float_for_one_level::<u8>(out.range());
        assert!((out.get_f32(0, 0) - 1.0).abs() <= level);
        assert!((out.get_f32(1, 0) + 3.0).abs() <= level);
    }

    #[test]
    fn test_concat_cols() {
        let a: QMatrix = QMatrix::from_raw(2, 1, vec![1, 2], QuantRange::UNIT).expect("a");
        let b: QMatrix =
            QMatrix::from_raw(2, 2, vec![3, 4, 5, 6], QuantRange::UNIT).expect("b");
        let mut out = QMatrix::new();
        concat_cols(&a, &b, &mut out).expect("concat");
        assert_eq!(out.shape(), (2, 3));
        assert_eq!(out.data(), &[1, 3, 4, 2, 5, 6]);
    }

    #[test]
    fn test_select_cols() {
        let mut out = QMatrix::new();
        select_cols(&sample(), &[1, 1, 0], &mut out).expect("select");
        assert_eq!(out.shape(), (3, 3));
        assert_eq!(out.row(0), &[2, 2, 1]);
        assert!(select_cols(&sample(), &[2], &mut out).is_err());
    }
}
