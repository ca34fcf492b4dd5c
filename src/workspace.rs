//! Caller-owned scratch buffers
//!
//! Every hot-path operation resizes buffers from a [`Workspace`] instead of
//! allocating. A workspace belongs to one scorer and must not be shared
//! between threads; independent scorers each own one.

use crate::gemm::GemmScratch;
use crate::model::{DecoderScratch, EncoderScratch, GruScratch};

/// Scratch for one encoder-decoder pipeline
#[derive(Debug, Default)]
pub struct Workspace {
    pub(crate) gemm: GemmScratch,
    pub(crate) gru: GruScratch,
    pub(crate) encoder: EncoderScratch,
    pub(crate) decoder: DecoderScratch,
}

impl Workspace {
    /// Empty workspace; buffers grow on first use
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// GEMM accumulator scratch
    #[must_use]
    pub fn gemm(&self) -> &GemmScratch {
        &self.gemm
    }

    /// Mutable GEMM scratch, for callers running standalone products
    pub fn gemm_mut(&mut self) -> &mut GemmScratch {
        &mut self.gemm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_workspace_is_empty() {
        let ws = Workspace::new();
        assert!(ws.gemm().accumulator().is_empty());
    }
}
