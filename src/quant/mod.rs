//! 8-bit quantization primitives
//!
//! - [`codec`]: float <-> integer level mapping for a `[min, max]` range
//! - [`ops`]: saturating arithmetic on levels sharing a zero point
//! - [`table`]: 256-entry lookup tables for nonlinearities

pub mod codec;
pub mod ops;
pub mod table;

pub use codec::{
    dequantize, dequantize_many, float_for_one_level, quantize, quantize_many,
    quantize_unclamped, range_for_product, requantize_in_place, requantize_many, QuantLevel,
    QuantRange, Requantizer,
};
pub use ops::{qmul, qsub, qsum, qsum2, qsum3, qsum_iter};
pub use table::{ExpTable, LookupTable};
