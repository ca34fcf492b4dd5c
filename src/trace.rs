//! Tracing hooks for the inference pipeline
//!
//! With the `tracing` feature enabled these macros emit DEBUG-level spans
//! and events through the `tracing` crate; without it they compile to
//! nothing, so hot loops carry no cost.
//!
//! # Usage
//!
//! ```rust,ignore
//! fn make_step(&mut self) {
//!     let _guard = trace_enter!("decoder.make_step");
//!     trace_event!(rows = 4, "step");
//! }
//! ```
//!
//! Spans used by the crate: `encoder.get_context`, `decoder.make_step`,
//! `gru.next_state`, `qgemm`.

/// Create a tracing span (no-op when tracing feature is disabled)
#[macro_export]
#[cfg(feature = "tracing")]
macro_rules! trace_span {
    ($name:expr) => {
        tracing::span!(tracing::Level::DEBUG, $name)
    };
    ($name:expr, $($field:tt)*) => {
        tracing::span!(tracing::Level::DEBUG, $name, $($field)*)
    };
}

/// Create a tracing span (no-op when tracing feature is disabled)
#[macro_export]
#[cfg(not(feature = "tracing"))]
macro_rules! trace_span {
    ($name:expr) => {
        ()
    };
    ($name:expr, $($field:tt)*) => {
        ()
    };
}

/// Placeholder for span guard when tracing is disabled
#[cfg(not(feature = "tracing"))]
pub struct NoopSpanGuard;

/// Enter a tracing span (no-op when tracing feature is disabled)
#[macro_export]
#[cfg(feature = "tracing")]
macro_rules! trace_enter {
    ($name:expr) => {
        tracing::span!(tracing::Level::DEBUG, $name).entered()
    };
    ($name:expr, $($field:tt)*) => {
        tracing::span!(tracing::Level::DEBUG, $name, $($field)*).entered()
    };
}

/// Enter a tracing span (no-op when tracing feature is disabled)
#[macro_export]
#[cfg(not(feature = "tracing"))]
macro_rules! trace_enter {
    ($name:expr) => {
        $crate::trace::NoopSpanGuard
    };
    ($name:expr, $($field:tt)*) => {
        $crate::trace::NoopSpanGuard
    };
}

/// Log a tracing event (no-op when tracing feature is disabled)
#[macro_export]
#[cfg(feature = "tracing")]
macro_rules! trace_event {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

/// Log a tracing event (no-op when tracing feature is disabled)
#[macro_export]
#[cfg(not(feature = "tracing"))]
macro_rules! trace_event {
    ($($arg:tt)*) => {};
}

/// Install a `tracing_subscriber` fmt layer filtered by `RUST_LOG`
///
/// Falls back to `filter` when `RUST_LOG` is unset. Calling it twice is
/// harmless; the second install is ignored.
#[cfg(feature = "tracing")]
pub fn init_subscriber(filter: &str) {
    use tracing_subscriber::EnvFilter;

    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env)
        .with_target(false)
        .try_init();
}

// Re-export macros at module level
pub use trace_enter;
pub use trace_event;
pub use trace_span;

#[cfg(test)]
mod tests {

    #[test]
    fn test_trace_macros_compile() {
        // These should compile regardless of feature flag
        let _span = trace_span!("qgemm");
        let _guard = trace_enter!("gru.next_state");
        let _fields = trace_enter!("decoder.make_step", rows = 2);
        trace_event!("test event");
    }
}
