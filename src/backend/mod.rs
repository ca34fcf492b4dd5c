//! Backend abstraction and selection
//!
//! Provides a unified interface for the integer GEMM and row-map
//! primitives, with construction-time selection between a sequential CPU
//! reference and a worker-pool backend.
//!
//! # Usage
//!
//! ```rust,ignore
//! use nmt_q8::backend::BackendSelector;
//! use nmt_q8::EngineConfig;
//!
//! let backend = BackendSelector::create(&EngineConfig::default())?;
//! println!("Selected backend: {}", backend.capabilities());
//! ```

mod cpu;
#[cfg(feature = "parallel")]
mod parallel;
mod selector;
mod traits;

pub use cpu::CpuBackend;
#[cfg(feature = "parallel")]
pub use parallel::ParallelBackend;
pub use selector::{BackendSelection, BackendSelector};
pub use traits::{
    BackendCapabilities, BackendType, ComputeBackend, GemmOperand, GemmProblem, RowFn,
};
