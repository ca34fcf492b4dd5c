//! 256-entry lookup tables for nonlinear functions of `u8` levels
//!
//! A table is tied to the input range it was built for; results from one
//! range must never be read through a table built for another.

use super::codec::{dequantize, quantize, QuantRange};

/// Number of entries in a `u8` lookup table
pub const TABLE_SIZE: usize = 256;

/// Logistic sigmoid
#[must_use]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Hyperbolic tangent
#[must_use]
pub fn tanh(x: f32) -> f32 {
    x.tanh()
}

/// Precomputed `u8 -> u8` map of `f` between two ranges
#[derive(Debug, Clone)]
pub struct LookupTable {
    input: QuantRange,
    output: QuantRange,
    entries: [u8; TABLE_SIZE],
}

impl LookupTable {
    /// Build the table: `entries[q] = quantize(f(dequantize(q, input)), output)`
    #[must_use]
    pub fn build(input: QuantRange, output: QuantRange, f: impl Fn(f32) -> f32) -> Self {
        let mut entries = [0_u8; TABLE_SIZE];
        for (q, entry) in (0_u8..=255).zip(entries.iter_mut()) {
            *entry = quantize::<u8>(f(dequantize(q, input)), output);
        }
        Self {
            input,
            output,
            entries,
        }
    }

    /// Sigmoid table from `input` into `output`
    #[must_use]
    pub fn sigmoid(input: QuantRange, output: QuantRange) -> Self {
        Self::build(input, output, sigmoid)
    }

    /// Tanh table from `input` into `output`
    #[must_use]
    pub fn tanh(input: QuantRange, output: QuantRange) -> Self {
        Self::build(input, output, tanh)
    }

    /// Look up one level
    #[inline]
    #[must_use]
    pub fn get(&self, q: u8) -> u8 {
        self.entries[usize::from(q)]
    }

    /// Apply the table to every element in place
    pub fn apply_in_place(&self, data: &mut [u8]) {
        for q in data.iter_mut() {
            *q = self.entries[usize::from(*q)];
        }
    }

    /// Range the table reads from
    #[must_use]
    pub fn input_range(&self) -> QuantRange {
        self.input
    }

    /// Range the table writes into
    #[must_use]
    pub fn output_range(&self) -> QuantRange {
        self.output
    }
}

/// Precomputed `exp(dequantize(q) - max)` for every level of a range
///
/// Subtracting the range maximum keeps every entry in `(0, 1]`, which is
/// the stable form of softmax numerators.
#[derive(Debug, Clone)]
pub struct ExpTable {
    range: QuantRange,
    entries: [f64; TABLE_SIZE],
}

impl ExpTable {
    /// Build the table for `range`
    #[must_use]
    pub fn new(range: QuantRange) -> Self {
        let shift = f64::from(range.max());
        let mut entries = [0.0_f64; TABLE_SIZE];
        for (q, entry) in (0_u8..=255).zip(entries.iter_mut()) {
            *entry = (f64::from(dequantize(q, range)) - shift).exp();
        }
        Self { range, entries }
    }

    /// Shifted exponential of one level
    #[inline]
    #[must_use]
    pub fn get(&self, q: u8) -> f64 {
        self.entries[usize::from(q)]
    }

    /// Amount subtracted before exponentiation (the range maximum)
    #[must_use]
    pub fn shift(&self) -> f64 {
        f64::from(self.range.max())
    }

    /// Range the table was built for
    #[must_use]
    pub fn range(&self) -> QuantRange {
        self.range
    }
}
