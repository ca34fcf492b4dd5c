//! Quantization codec
//!
//! Linear mapping between `f32` values and fixed-width integers given a
//! `[min, max]` range.
//!
//! # Scheme
//!
//! For an integer type with `2^bits` levels and lowest value `lowest`:
//!
//! - `scale = 2^bits / ((max - min) * 2^bits / (2^bits - 1))`
//! - Quantize: `q = round(v * scale) - round(min * scale) + lowest`, saturated
//! - Dequantize: `v = min + (q - lowest) / scale`
//!
//! Narrow storage is `u8` (levels `0..=255`); GEMM accumulators are `i32`.
//! A degenerate range (`min == max`) quantizes everything to `0` and
//! dequantizes everything to `min`.

use core::fmt;

/// Float interval represented by a quantized buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantRange {
    min: f32,
    max: f32,
}

impl Default for QuantRange {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for QuantRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

impl QuantRange {
    /// Degenerate range at zero
    pub const ZERO: Self = Self { min: 0.0, max: 0.0 };

    /// Range used for recurrent state, gate and activation outputs
    pub const UNIT_SIGNED: Self = Self {
        min: -1.0,
        max: 1.0,
    };

    /// Range used for probabilities
    pub const UNIT: Self = Self { min: 0.0, max: 1.0 };

    /// Create a range; the endpoints are ordered so that `min <= max`
    #[must_use]
    pub fn new(a: f32, b: f32) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Smallest range covering every value in `data`
    ///
    /// The result always contains zero so that a zero point exists.
    #[must_use]
    pub fn covering(data: &[f32]) -> Self {
        let (min, max) = data
            .iter()
            .fold((0.0_f32, 0.0_f32), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Self { min, max }
    }

    /// Lower bound
    #[must_use]
    pub const fn min(&self) -> f32 {
        self.min
    }

    /// Upper bound
    #[must_use]
    pub const fn max(&self) -> f32 {
        self.max
    }

    /// Width of the interval
    #[must_use]
    pub fn width(&self) -> f32 {
        self.max - self.min
    }

    /// Whether `min == max`
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.min == self.max
    }

    /// Smallest range covering both `self` and `other`
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// Integer element type usable as quantized storage
pub trait QuantLevel: Copy + Default + PartialOrd + Send + Sync + fmt::Debug + 'static {
    /// Number of bits in the representation
    const BITS: u32;
    /// Lowest representable value
    const LOWEST: i64;
    /// Highest representable value
    const HIGHEST: i64;

    /// Widen to `i64`
    fn to_i64(self) -> i64;

    /// Narrow from `i64`, saturating at the type bounds
    fn saturate(value: i64) -> Self;
}

impl QuantLevel for u8 {
    const BITS: u32 = 8;
    const LOWEST: i64 = 0;
    const HIGHEST: i64 = 255;

    #[inline]
    fn to_i64(self) -> i64 {
        i64::from(self)
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn saturate(value: i64) -> Self {
        value.clamp(Self::LOWEST, Self::HIGHEST) as u8
    }
}

impl QuantLevel for i32 {
    const BITS: u32 = 32;
    const LOWEST: i64 = i32::MIN as i64;
    const HIGHEST: i64 = i32::MAX as i64;

    #[inline]
    fn to_i64(self) -> i64 {
        i64::from(self)
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn saturate(value: i64) -> Self {
        value.clamp(Self::LOWEST, Self::HIGHEST) as i32
    }
}

/// Number of levels `2^bits` as `f64`
#[inline]
fn steps<T: QuantLevel>() -> f64 {
    (1_u64 << T::BITS) as f64
}

/// Levels per unit float for `range` (the quantize-side scale)
#[inline]
fn range_scale<T: QuantLevel>(range: QuantRange) -> f64 {
    let n = steps::<T>();
    let adjusted = (f64::from(range.max) - f64::from(range.min)) * (n / (n - 1.0));
    n / adjusted
}

// ============================================================================
// Scalar conversions
// ============================================================================

/// Quantize without saturating; may fall outside the type bounds
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn quantize_unclamped<T: QuantLevel>(value: f32, range: QuantRange) -> i64 {
    if range.is_degenerate() {
        return 0;
    }
    let scale = range_scale::<T>(range);
    let q = (f64::from(value) * scale).round() - (f64::from(range.min) * scale).round();
    (q as i64).saturating_add(T::LOWEST)
}

/// Quantize `value` into `range`, saturating at the type bounds
#[must_use]
pub fn quantize<T: QuantLevel>(value: f32, range: QuantRange) -> T {
    T::saturate(quantize_unclamped::<T>(value, range))
}

/// Map a quantized level back to its float value
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn dequantize<T: QuantLevel>(q: T, range: QuantRange) -> f32 {
    if range.is_degenerate() {
        return range.min;
    }
    let step = 1.0 / range_scale::<T>(range);
    let offset = (q.to_i64() - T::LOWEST) as f64;
    (f64::from(range.min) + offset * step) as f32
}

/// Float distance between two adjacent levels of `T` in `range`
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn float_for_one_level<T: QuantLevel>(range: QuantRange) -> f32 {
    let levels = (T::HIGHEST - T::LOWEST) as f64;
    (f64::from(range.width()) / levels) as f32
}

/// Range of an `i32` accumulator holding products of `u8` operands
///
/// One accumulator level is worth one level of `a` times one level of `b`,
/// so the range follows analytically from the operand ranges.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn range_for_product(a: QuantRange, b: QuantRange) -> QuantRange {
    let level = float_for_one_level::<u8>(a) * float_for_one_level::<u8>(b);
    QuantRange::new(level * i32::MIN as f32, level * i32::MAX as f32)
}

// ============================================================================
// Bulk conversions
// ============================================================================

/// Quantize a slice into `out` (lengths must match)
pub fn quantize_many<T: QuantLevel>(input: &[f32], range: QuantRange, out: &mut [T]) {
    debug_assert_eq!(input.len(), out.len(), "quantize_many length mismatch");
    if range.is_degenerate() {
        out.fill(T::saturate(0));
        return;
    }
    let scale = range_scale::<T>(range);
    #[allow(clippy::cast_possible_truncation)]
    let rounding = (f64::from(range.min) * scale).round() as i64;
    for (dst, &v) in out.iter_mut().zip(input) {
        #[allow(clippy::cast_possible_truncation)]
        let q = ((f64::from(v) * scale).round() as i64)
            .saturating_sub(rounding)
            .saturating_add(T::LOWEST);
        *dst = T::saturate(q);
    }
}

/// Dequantize a slice into a new vector
#[must_use]
pub fn dequantize_many<T: QuantLevel>(input: &[T], range: QuantRange) -> Vec<f32> {
    input.iter().map(|&q| dequantize(q, range)).collect()
}

/// Precomputed affine map from one quantized range to another
#[derive(Debug, Clone, Copy)]
pub struct Requantizer {
    from: QuantRange,
    to: QuantRange,
    in_step: f64,
    in_lowest: i64,
    out_scale: f64,
    out_rounding: i64,
    out_lowest: i64,
}

impl Requantizer {
    /// Build the map from `from` levels of `T1` to `to` levels of `T2`
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new<T1: QuantLevel, T2: QuantLevel>(from: QuantRange, to: QuantRange) -> Self {
        let in_step = if from.is_degenerate() {
            0.0
        } else {
            1.0 / range_scale::<T1>(from)
        };
        let (out_scale, out_rounding) = if to.is_degenerate() {
            (0.0, 0)
        } else {
            let s = range_scale::<T2>(to);
            (s, (f64::from(to.min) * s).round() as i64)
        };
        Self {
            from,
            to,
            in_step,
            in_lowest: T1::LOWEST,
            out_scale,
            out_rounding,
            out_lowest: T2::LOWEST,
        }
    }

    /// Requantize one level
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn apply<T1: QuantLevel, T2: QuantLevel>(&self, q: T1) -> T2 {
        if self.to.is_degenerate() {
            return T2::saturate(0);
        }
        // Matches dequantize: single-precision value, then quantize in f64
        let value = (f64::from(self.from.min) + (q.to_i64() - self.in_lowest) as f64 * self.in_step)
            as f32;
        let level = ((f64::from(value) * self.out_scale).round() as i64)
            .saturating_sub(self.out_rounding)
            .saturating_add(self.out_lowest);
        T2::saturate(level)
    }
}

/// Requantize every element of `input` from range `from` into range `to`
pub fn requantize_many<T1: QuantLevel, T2: QuantLevel>(
    input: &[T1],
    from: QuantRange,
    to: QuantRange,
    out: &mut [T2],
) {
    debug_assert_eq!(input.len(), out.len(), "requantize_many length mismatch");
    let map = Requantizer::new::<T1, T2>(from, to);
    for (dst, &q) in out.iter_mut().zip(input) {
        *dst = map.apply(q);
    }
}

/// Requantize a narrow buffer in place
pub fn requantize_in_place(data: &mut [u8], from: QuantRange, to: QuantRange) {
    let map = Requantizer::new::<u8, u8>(from, to);
    for q in data.iter_mut() {
        *q = map.apply(*q);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Scalar Codec Tests
    // =========================================================================

    #[test]
    fn test_quantize_endpoints() {
        let range = QuantRange::new(-1.0, 1.0);
        assert_eq!(quantize::<u8>(-1.0, range), 0);
        assert_eq!(quantize::<u8>(1.0, range), 255);
    }

    #[test]
    fn test_quantize_zero_point_signed_unit() {
        // round(-127.5) rounds away from zero
        assert_eq!(quantize::<u8>(0.0, QuantRange::UNIT_SIGNED), 128);
    }

    #[test]
    fn test_quantize_saturates() {
        let range = QuantRange::new(-1.0, 1.0);
        assert_eq!(quantize::<u8>(50.0, range), 255);
        assert_eq!(quantize::<u8>(-50.0, range), 0);
        assert!(quantize_unclamped::<u8>(50.0, range) > 255);
    }

    #[test]
    fn test_degenerate_range() {
        let range = QuantRange::new(3.0, 3.0);
        assert!(range.is_degenerate());
        assert_eq!(quantize::<u8>(7.5, range), 0);
        assert!((dequantize::<u8>(200, range) - 3.0).abs() < f32::EPSILON);
        assert!(float_for_one_level::<u8>(range).abs() < f32::EPSILON);
    }

    #[test]
    fn test_dequantize_endpoints() {
        let range = QuantRange::new(-2.0, 6.0);
        assert!((dequantize::<u8>(0, range) + 2.0).abs() < 1e-6);
        assert!((dequantize::<u8>(255, range) - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_roundtrip_within_one_level() {
        let range = QuantRange::new(-3.0, 5.0);
        let level = float_for_one_level::<u8>(range);
        for i in 0..=800 {
            let v = -3.0 + i as f32 * 0.01;
            let back = dequantize(quantize::<u8>(v, range), range);
            assert!((back - v).abs() <= level + 1e-6, "v={v} back={back}");
        }
    }

    #[test]
    fn test_range_new_orders_endpoints() {
        let range = QuantRange::new(2.0, -1.0);
        assert!((range.min() + 1.0).abs() < f32::EPSILON);
        assert!((range.max() - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_range_covering_includes_zero() {
        let range = QuantRange::covering(&[0.5, 2.0, 1.0]);
        assert!(range.min().abs() < f32::EPSILON);
        assert!((range.max() - 2.0).abs() < f32::EPSILON);
    }

    // =========================================================================
    // Product Range Tests
    // =========================================================================

    #[test]
    fn test_range_for_product_accumulator_scale() {
        let a = QuantRange::new(-1.0, 1.0);
        let b = QuantRange::new(0.0, 2.55);
        let c = range_for_product(a, b);
        let level = float_for_one_level::<u8>(a) * float_for_one_level::<u8>(b);
        // One accumulator step is worth one level of a times one level of b
        let one = dequantize::<i32>(1, c) - dequantize::<i32>(0, c);
        assert!((one - level).abs() < level * 1e-3);
        assert!(dequantize::<i32>(0, c).abs() < 1e-3);
    }

    #[test]
    fn test_range_for_product_degenerate() {
        let c = range_for_product(QuantRange::ZERO, QuantRange::new(-1.0, 1.0));
        assert!(c.is_degenerate());
        assert!(dequantize::<i32>(12345, c).abs() < f32::EPSILON);
    }

    // =========================================================================
    // Bulk Conversion Tests
    // =========================================================================

    #[test]
    fn test_quantize_many_matches_scalar() {
        let range = QuantRange::new(-0.7, 1.3);
        let input: Vec<f32> = (0..50).map(|i| -0.7 + i as f32 * 0.04).collect();
        let mut out = vec![0_u8; input.len()];
        quantize_many(&input, range, &mut out);
        for (&v, &q) in input.iter().zip(&out) {
            assert_eq!(q, quantize::<u8>(v, range));
        }
    }

    #[test]
    fn test_requantize_identity_range() {
        let range = QuantRange::new(-1.5, 2.5);
        let data: Vec<u8> = (0..=255).collect();
        let mut out = data.clone();
        requantize_in_place(&mut out, range, range);
        assert_eq!(out, data);
    }

    #[test]
    fn test_requantize_wider_range_preserves_values() {
        let from = QuantRange::new(-1.0, 1.0);
        let to = QuantRange::new(-4.0, 4.0);
        let data: Vec<u8> = vec![0, 64, 128, 200, 255];
        let mut out = vec![0_u8; data.len()];
        requantize_many(&data, from, to, &mut out);
        let level = float_for_one_level::<u8>(to);
        for (&a, &b) in data.iter().zip(&out) {
            let va = dequantize(a, from);
            let vb = dequantize(b, to);
            assert!((va - vb).abs() <= level);
        }
    }

    #[test]
    fn test_requantize_into_degenerate_range_is_zero() {
        let mut data = vec![10_u8, 200, 255];
        requantize_in_place(&mut data, QuantRange::UNIT_SIGNED, QuantRange::ZERO);
        assert!(data.iter().all(|&q| q == 0));
    }

    #[test]
    fn test_requantize_wide_to_narrow() {
        let a = QuantRange::new(-1.0, 1.0);
        let b = QuantRange::new(-1.0, 1.0);
        let acc_range = range_for_product(a, b);
        let level = float_for_one_level::<u8>(a) * float_for_one_level::<u8>(b);
        // 5000 accumulator steps ~= 0.3076
        let acc = vec![0_i32, 5000, -5000];
        let target = QuantRange::new(-0.5, 0.5);
        let mut out = vec![0_u8; 3];
        requantize_many(&acc, acc_range, target, &mut out);
        let expected = 5000.0 * level;
        assert!((dequantize(out[1], target) - expected).abs() <= float_for_one_level::<u8>(target));
        assert!((dequantize(out[2], target) + expected).abs() <= float_for_one_level::<u8>(target));
    }
}
