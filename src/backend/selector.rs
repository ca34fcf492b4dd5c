//! Construction-time backend selection
//!
//! Resolves [`BackendType::Auto`] from the configured thread budget and
//! builds the chosen backend behind an `Arc<dyn ComputeBackend>` that every
//! component of one engine shares.

use std::fmt;
use std::sync::Arc;

use super::cpu::CpuBackend;
use super::traits::{BackendType, ComputeBackend};
use crate::error::NmtResult;
use crate::parallel::{is_parallel_available, resolve_threads};
use crate::EngineConfig;

/// Backend selection result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSelection {
    /// Selected backend
    pub backend: BackendType,
    /// Worker threads the backend will use
    pub threads: usize,
    /// Reason for selection
    pub reason: &'static str,
}

impl BackendSelection {
    fn cpu(reason: &'static str) -> Self {
        Self {
            backend: BackendType::Cpu,
            threads: 1,
            reason,
        }
    }

    fn parallel(threads: usize, reason: &'static str) -> Self {
        Self {
            backend: BackendType::Parallel,
            threads,
            reason,
        }
    }
}

impl fmt::Display for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{} ({})", self.backend, self.threads, self.reason)
    }
}

/// Backend selector
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendSelector;

impl BackendSelector {
    /// Decide which backend `config` asks for
    #[must_use]
    pub fn select(config: &EngineConfig) -> BackendSelection {
        let threads = resolve_threads(config.threads);
        match config.backend {
            BackendType::Cpu => BackendSelection::cpu("requested"),
            BackendType::Parallel if !is_parallel_available() => {
                BackendSelection::cpu("parallel feature not compiled in")
            }
            BackendType::Parallel => BackendSelection::parallel(threads, "requested"),
            BackendType::Auto if !is_parallel_available() => {
                BackendSelection::cpu("parallel feature not compiled in")
            }
            BackendType::Auto if threads > 1 => {
                BackendSelection::parallel(threads, "multiple threads available")
            }
            BackendType::Auto => BackendSelection::cpu("single thread available"),
        }
    }

    /// Build the backend `config` asks for
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::Backend`](crate::error::NmtError::Backend) if a
    /// worker pool cannot be built.
    pub fn create(config: &EngineConfig) -> NmtResult<Arc<dyn ComputeBackend>> {
        let selection = Self::select(config);
        crate::trace_event!(
            backend = selection.backend.name(),
            threads = selection.threads,
            reason = selection.reason,
            "backend selected"
        );
        Self::build(&selection)
    }

    #[cfg(feature = "parallel")]
    fn build(selection: &BackendSelection) -> NmtResult<Arc<dyn ComputeBackend>> {
        match selection.backend {
            BackendType::Parallel => Ok(Arc::new(super::ParallelBackend::new(
                selection.threads,
            )?)),
            BackendType::Cpu | BackendType::Auto => Ok(Arc::new(CpuBackend::new())),
        }
    }

    #[cfg(not(feature = "parallel"))]
    #[allow(clippy::unnecessary_wraps)]
    fn build(_selection: &BackendSelection) -> NmtResult<Arc<dyn ComputeBackend>> {
        Ok(Arc::new(CpuBackend::new()))
    }
}
