//! Quantized matrix
//!
//! Row-major dense buffer of quantized levels tagged with the float range
//! the levels represent. Matrices are move-only; duplication goes through
//! [`QMatrix::copy_from`].
//!
//! Operations reuse the existing allocation where possible; [`QMatrix::resize`]
//! only grows the buffer and never shrinks its capacity.

pub mod ops;

use crate::error::{NmtError, NmtResult};
use crate::quant::{dequantize, dequantize_many, quantize, quantize_many, QuantLevel, QuantRange};

/// Number of elements in a `rows x cols` buffer
pub(crate) fn element_count(rows: usize, cols: usize) -> NmtResult<usize> {
    rows.checked_mul(cols)
        .ok_or_else(|| NmtError::Allocation(format!("{rows}x{cols} elements overflow usize")))
}

/// Grow or shrink `data` to `len` elements, reporting allocation failure
pub(crate) fn resize_buffer<T: Clone>(data: &mut Vec<T>, len: usize, fill: T) -> NmtResult<()> {
    if len > data.len() {
        data.try_reserve(len - data.len())
            .map_err(|e| NmtError::Allocation(format!("{len} elements: {e}")))?;
    }
    data.resize(len, fill);
    Ok(())
}

/// Quantized row-major matrix with a range tag
#[derive(Debug, Default, PartialEq)]
pub struct QMatrix<T: QuantLevel = u8> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
    range: QuantRange,
}

/// Wide `i32` accumulator matrix produced by GEMM before range shrinking
pub type WideMatrix = QMatrix<i32>;

impl<T: QuantLevel> QMatrix<T> {
    /// Empty `0 x 0` matrix
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: 0,
            cols: 0,
            data: Vec::new(),
            range: QuantRange::ZERO,
        }
    }

    /// `rows x cols` matrix of level zero in the degenerate range at `0.0`
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::Allocation`] if the buffer cannot be allocated.
    pub fn zeros(rows: usize, cols: usize) -> NmtResult<Self> {
        let mut m = Self::new();
        m.resize(rows, cols)?;
        Ok(m)
    }

    /// Matrix where every element represents `value` in `range`
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::Allocation`] if the buffer cannot be allocated.
    pub fn filled(rows: usize, cols: usize, value: f32, range: QuantRange) -> NmtResult<Self> {
        let len = element_count(rows, cols)?;
        let mut data = Vec::new();
        resize_buffer(&mut data, len, quantize::<T>(value, range))?;
        Ok(Self {
            rows,
            cols,
            data,
            range,
        })
    }

    /// Quantize float data using the smallest zero-containing covering range
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] if `values.len() != rows * cols`.
    pub fn from_f32(rows: usize, cols: usize, values: &[f32]) -> NmtResult<Self> {
        Self::from_f32_in_range(rows, cols, values, QuantRange::covering(values))
    }

    /// Quantize float data into a fixed range
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] if `values.len() != rows * cols`.
    pub fn from_f32_in_range(
        rows: usize,
        cols: usize,
        values: &[f32],
        range: QuantRange,
    ) -> NmtResult<Self> {
        let len = element_count(rows, cols)?;
        if values.len() != len {
            return Err(NmtError::ShapeMismatch(format!(
                "{} values for a {rows}x{cols} matrix",
                values.len()
            )));
        }
        let mut data = Vec::new();
        resize_buffer(&mut data, len, T::default())?;
        quantize_many(values, range, &mut data);
        Ok(Self {
            rows,
            cols,
            data,
            range,
        })
    }

    /// Wrap existing levels
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] if `data.len() != rows * cols`.
    pub fn from_raw(rows: usize, cols: usize, data: Vec<T>, range: QuantRange) -> NmtResult<Self> {
        if data.len() != element_count(rows, cols)? {
            return Err(NmtError::ShapeMismatch(format!(
                "{} levels for a {rows}x{cols} matrix",
                data.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            data,
            range,
        })
    }

    /// Dequantize every element
    #[must_use]
    pub fn to_f32(&self) -> Vec<f32> {
        dequantize_many(&self.data, self.range)
    }

    // ------------------------------------------------------------------
    // Shape and range
    // ------------------------------------------------------------------

    /// Number of rows
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`
    #[must_use]
    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the matrix has no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Float range represented by the levels
    #[must_use]
    pub const fn range(&self) -> QuantRange {
        self.range
    }

    /// Retag the levels without touching them
    pub fn set_range(&mut self, range: QuantRange) {
        self.range = range;
    }

    /// Resize to `rows x cols`, keeping the allocation when it is large enough
    ///
    /// Element contents after a resize are unspecified; callers overwrite them.
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::Allocation`] on size overflow or allocation failure.
    pub fn resize(&mut self, rows: usize, cols: usize) -> NmtResult<()> {
        let len = element_count(rows, cols)?;
        resize_buffer(&mut self.data, len, T::default())?;
        self.rows = rows;
        self.cols = cols;
        Ok(())
    }

    /// Reinterpret the row/column split without touching data
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] if the element count differs.
    pub fn reshape(&mut self, rows: usize, cols: usize) -> NmtResult<()> {
        if element_count(rows, cols)? != self.data.len() {
            return Err(NmtError::ShapeMismatch(format!(
                "cannot reshape {}x{} into {rows}x{cols}",
                self.rows, self.cols
            )));
        }
        self.rows = rows;
        self.cols = cols;
        Ok(())
    }

    /// Exchange buffers, shapes and ranges with `other`
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Make `self` an element-for-element copy of `other`
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::Allocation`] if the buffer cannot grow.
    pub fn copy_from(&mut self, other: &Self) -> NmtResult<()> {
        self.resize(other.rows, other.cols)?;
        self.data.copy_from_slice(&other.data);
        self.range = other.range;
        Ok(())
    }

    /// Drop all elements, keeping the allocation
    pub fn clear(&mut self) {
        self.data.clear();
        self.rows = 0;
        self.cols = 0;
    }

    // ------------------------------------------------------------------
    // Element access
    // ------------------------------------------------------------------

    /// Level at `(row, col)`
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    #[inline]
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> T {
        assert!(row < self.rows && col < self.cols, "index ({row}, {col}) out of bounds");
        self.data[row * self.cols + col]
    }

    /// Float value at `(row, col)`
    #[must_use]
    pub fn get_f32(&self, row: usize, col: usize) -> f32 {
        dequantize(self.get(row, col), self.range)
    }

    /// Set the level at `(row, col)`
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        assert!(row < self.rows && col < self.cols, "index ({row}, {col}) out of bounds");
        self.data[row * self.cols + col] = value;
    }

    /// Levels of one row
    #[inline]
    #[must_use]
    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Mutable levels of one row
    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// All levels in row-major order
    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable levels in row-major order
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    // ------------------------------------------------------------------
    // Transpose
    // ------------------------------------------------------------------

    /// New matrix with rows and columns exchanged and the same range
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::Allocation`] if the buffer cannot be allocated.
    pub fn transpose(&self) -> NmtResult<Self> {
        let mut out = Self::new();
        self.transpose_into(&mut out)?;
        Ok(out)
    }

    /// Write the transpose of `self` into `out`
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::Allocation`] if `out` cannot grow.
    pub fn transpose_into(&self, out: &mut Self) -> NmtResult<()> {
        out.resize(self.cols, self.rows)?;
        out.range = self.range;
        for r in 0..self.rows {
            for (c, &v) in self.row(r).iter().enumerate() {
                out.data[c * self.rows + r] = v;
            }
        }
        Ok(())
    }

    /// Transpose through a temporary and swap it in
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::Allocation`] if the temporary cannot be allocated.
    pub fn transpose_in_place(&mut self) -> NmtResult<()> {
        let mut temp = self.transpose()?;
        self.swap(&mut temp);
        Ok(())
    }
}

/// Dense `f32` matrix holding log-probabilities
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FloatMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl FloatMatrix {
    /// Empty `0 x 0` matrix
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap row-major data
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> NmtResult<Self> {
        if data.len() != element_count(rows, cols)? {
            return Err(NmtError::ShapeMismatch(format!(
                "{} values for a {rows}x{cols} matrix",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Resize to `rows x cols`
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::Allocation`] on size overflow or allocation failure.
    pub fn resize(&mut self, rows: usize, cols: usize) -> NmtResult<()> {
        let len = element_count(rows, cols)?;
        resize_buffer(&mut self.data, len, 0.0)?;
        self.rows = rows;
        self.cols = cols;
        Ok(())
    }

    /// Number of rows
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Value at `(row, col)`
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.row(row)[col]
    }

    /// One row
    #[must_use]
    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// One mutable row
    pub fn row_mut(&mut self, row: usize) -> &mut [f32] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Row-major data
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Construction Tests
    // =========================================================================

    #[test]
    fn test_zeros_shape() {
        let m: QMatrix = QMatrix::zeros(3, 4).expect("zeros");
        assert_eq!(m.shape(), (3, 4));
        assert_eq!(m.len(), 12);
        assert!(m.range().is_degenerate());
        assert!(m.to_f32().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_from_f32_roundtrip() {
        let values = [0.5, -1.0, 2.0, 0.0, 1.5, -0.25];
        let m: QMatrix = QMatrix::from_f32(2, 3, &values).expect("from_f32");
        let level = crate::quant::float_for_one_level::<u8>(m.range());
        for (a, b) in values.iter().zip(m.to_f32()) {
            assert!((a - b).abs() <= level);
        }
    }

    #[test]
    fn test_from_f32_shape_mismatch() {
        let err = QMatrix::<u8>::from_f32(2, 3, &[1.0; 5]).unwrap_err();
        assert!(matches!(err, NmtError::ShapeMismatch(_)));
    }

    #[test]
    fn test_filled() {
        let m: QMatrix = QMatrix::filled(2, 2, 0.0, QuantRange::UNIT_SIGNED).expect("filled");
        assert!(m.data().iter().all(|&q| q == 128));
    }

    #[test]
    fn test_resize_overflow_is_allocation_error() {
        let mut m: QMatrix = QMatrix::new();
        let err = m.resize(usize::MAX, 2).unwrap_err();
        assert!(matches!(err, NmtError::Allocation(_)));
        assert_eq!(m.shape(), (0, 0));
    }

    // =========================================================================
    // Shape Tests
    // =========================================================================

    #[test]
    fn test_reshape_keeps_data() {
        let mut m: QMatrix = QMatrix::from_raw(2, 3, vec![1, 2, 3, 4, 5, 6], QuantRange::UNIT)
            .expect("from_raw");
        m.reshape(3, 2).expect("reshape");
        assert_eq!(m.row(1), &[3, 4]);
        assert!(m.reshape(4, 2).is_err());
    }

    #[test]
    fn test_swap_exchanges_everything() {
        let mut a: QMatrix = QMatrix::from_raw(1, 2, vec![1, 2], QuantRange::UNIT).expect("a");
        let mut b: QMatrix =
            QMatrix::from_raw(2, 1, vec![7, 8], QuantRange::UNIT_SIGNED).expect("b");
        a.swap(&mut b);
        assert_eq!(a.shape(), (2, 1));
        assert_eq!(a.data(), &[7, 8]);
        assert_eq!(a.range(), QuantRange::UNIT_SIGNED);
        assert_eq!(b.data(), &[1, 2]);
    }

    #[test]
    fn test_transpose() {
        let m: QMatrix = QMatrix::from_raw(2, 3, vec![1, 2, 3, 4, 5, 6], QuantRange::UNIT)
            .expect("from_raw");
        let t = m.transpose().expect("transpose");
        assert_eq!(t.shape(), (3, 2));
        assert_eq!(t.data(), &[1, 4, 2, 5, 3, 6]);
        assert_eq!(t.range(), m.range());
    }

    #[test]
    fn test_transpose_in_place_twice_is_identity() {
        let mut m: QMatrix =
            QMatrix::from_raw(2, 3, vec![9, 8, 7, 6, 5, 4], QuantRange::UNIT).expect("from_raw");
        m.transpose_in_place().expect("t1");
        m.transpose_in_place().expect("t2");
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.data(), &[9, 8, 7, 6, 5, 4]);
    }

    #[test]
    fn test_copy_from() {
        let src: QMatrix =
            QMatrix::from_raw(1, 3, vec![3, 2, 1], QuantRange::UNIT_SIGNED).expect("src");
        let mut dst: QMatrix = QMatrix::zeros(5, 5).expect("dst");
        dst.copy_from(&src).expect("copy");
        assert_eq!(dst.shape(), (1, 3));
        assert_eq!(dst.data(), src.data());
        assert_eq!(dst.range(), src.range());
    }

    #[test]
    fn test_float_matrix_rows() {
        let mut m = FloatMatrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).expect("from_vec");
        m.row_mut(1)[0] = 9.0;
        assert!((m.get(1, 0) - 9.0).abs() < f32::EPSILON);
        assert_eq!(m.row(0), &[1.0, 2.0]);
    }
}
