//! Saturating fixed-point arithmetic on `u8` levels
//!
//! All operands must share one range whose zero maps to level `zero`.
//! Results are clamped to `0..=255` instead of wrapping.

/// Unclamped `sum(q) - (n - 1) * zero`
#[inline]
fn sum_unclamped(zero: u8, qs: impl IntoIterator<Item = u8>) -> i32 {
    let mut acc = 0_i32;
    for (i, q) in qs.into_iter().enumerate() {
        acc += i32::from(q);
        if i > 0 {
            acc -= i32::from(zero);
        }
    }
    acc
}

#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_level(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Add quantized values sharing a zero point
#[inline]
#[must_use]
pub fn qsum(zero: u8, qs: &[u8]) -> u8 {
    clamp_level(sum_unclamped(zero, qs.iter().copied()))
}

/// Add any number of quantized values sharing a zero point
#[inline]
#[must_use]
pub fn qsum_iter(zero: u8, qs: impl IntoIterator<Item = u8>) -> u8 {
    clamp_level(sum_unclamped(zero, qs))
}

/// Add two quantized values sharing a zero point
#[inline]
#[must_use]
pub fn qsum2(zero: u8, a: u8, b: u8) -> u8 {
    clamp_level(i32::from(a) + i32::from(b) - i32::from(zero))
}

/// Add three quantized values sharing a zero point
#[inline]
#[must_use]
pub fn qsum3(zero: u8, a: u8, b: u8, c: u8) -> u8 {
    clamp_level(i32::from(a) + i32::from(b) + i32::from(c) - 2 * i32::from(zero))
}

/// Subtract `b` from `a`
#[inline]
#[must_use]
pub fn qsub(zero: u8, a: u8, b: u8) -> u8 {
    clamp_level(i32::from(a) - i32::from(b) + i32::from(zero))
}

/// Multiply `a` by `b`, where level `one` represents 1.0
///
/// A degenerate scale (`one == zero`) yields `zero`.
#[inline]
#[must_use]
pub fn qmul(zero: u8, one: u8, a: u8, b: u8) -> u8 {
    let div = i32::from(one) - i32::from(zero);
    if div == 0 {
        return zero;
    }
    let a0 = i32::from(a) - i32::from(zero);
    let b0 = i32::from(b) - i32::from(zero);
    clamp_level(a0 * b0 / div + i32::from(zero))
}
