//! Error types for nmt-q8

use thiserror::Error;

/// Result type alias for inference operations
pub type NmtResult<T> = Result<T, NmtError>;

/// Errors that can occur during quantized inference
#[derive(Debug, Error)]
pub enum NmtError {
    /// Operand dimensions are incompatible
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A token or filter index exceeds the embedding/output row count
    #[error("vocabulary index {index} out of range {size}")]
    VocabularyIndexOutOfRange {
        /// Requested index
        index: u32,
        /// Number of rows available
        size: usize,
    },

    /// Matrix buffer could not be (re)allocated
    #[error("allocation failure: {0}")]
    Allocation(String),

    /// Missing or malformed model weight
    #[error("model error: {0}")]
    Model(String),

    /// Scorer used out of order or with inconsistent state
    #[error("inference error: {0}")]
    Inference(String),

    /// Compute backend could not be constructed
    #[error("backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NmtError::ShapeMismatch("2x3 vs 4x5".into());
        assert_eq!(err.to_string(), "shape mismatch: 2x3 vs 4x5");
    }

    #[test]
    fn test_vocabulary_error_display() {
        let err = NmtError::VocabularyIndexOutOfRange { index: 42, size: 6 };
        assert_eq!(err.to_string(), "vocabulary index 42 out of range 6");
    }

    #[test]
    fn test_error_variants() {
        let shape = NmtError::ShapeMismatch("test".into());
        let alloc = NmtError::Allocation("test".into());
        let model = NmtError::Model("test".into());
        let inference = NmtError::Inference("test".into());
        let backend = NmtError::Backend("test".into());

        assert!(matches!(shape, NmtError::ShapeMismatch(_)));
        assert!(matches!(alloc, NmtError::Allocation(_)));
        assert!(matches!(model, NmtError::Model(_)));
        assert!(matches!(inference, NmtError::Inference(_)));
        assert!(matches!(backend, NmtError::Backend(_)));
    }
}
