//! Bounded worker pools
//!
//! The thread count is a configuration input: each parallel backend owns
//! its own `rayon` pool instead of touching the global one, so independent
//! engines never share workers.
//!
//! Without the `parallel` feature only the thread-count helpers exist and
//! everything runs sequentially.

#[cfg(feature = "parallel")]
use crate::error::{NmtError, NmtResult};

/// Logical CPUs visible to the process
#[must_use]
pub fn available_threads() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// Resolve an optional configured thread count
///
/// `None` means all logical CPUs; `Some(0)` is treated as one thread.
#[must_use]
pub fn resolve_threads(requested: Option<usize>) -> usize {
    requested.unwrap_or_else(available_threads).max(1)
}

/// Check if parallel execution is compiled in
#[must_use]
pub const fn is_parallel_available() -> bool {
    cfg!(feature = "parallel")
}

/// Build a private pool with exactly `threads` workers
///
/// # Errors
///
/// Returns [`NmtError::Backend`] if the pool cannot be spawned.
#[cfg(feature = "parallel")]
pub fn build_pool(threads: usize) -> NmtResult<rayon::ThreadPool> {
    let threads = threads.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("nmt-q8-worker-{i}"))
        .build()
        .map_err(|e| NmtError::Backend(format!("thread pool with {threads} threads: {e}")))?;
    crate::trace_event!(threads, "worker pool built");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_threads() {
        assert_eq!(resolve_threads(Some(3)), 3);
        assert_eq!(resolve_threads(Some(0)), 1);
        assert!(resolve_threads(None) >= 1);
    }

    #[test]
    fn test_available_threads() {
        assert!(available_threads() >= 1);
    }

    #[test]
    fn test_is_parallel_available() {
        let available = is_parallel_available();
        #[cfg(feature = "parallel")]
        assert!(available, "parallel feature enabled but not available");
        #[cfg(not(feature = "parallel"))]
        assert!(!available, "parallel should not be available without feature");
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_build_pool_thread_count() {
        let pool = build_pool(2).expect("pool");
        assert_eq!(pool.current_num_threads(), 2);
    }
}
