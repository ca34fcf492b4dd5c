//! Embedding lookup with out-of-vocabulary fallback

use crate::error::{NmtError, NmtResult};
use crate::matrix::ops::assemble;
use crate::matrix::QMatrix;
use crate::quant::QuantRange;

/// Quantized embedding table, one row per vocabulary id
#[derive(Debug)]
pub struct Embeddings {
    table: QMatrix,
    unk_id: u32,
}

impl Embeddings {
    /// Wrap `table`, substituting row `unk_id` for unknown ids
    #[must_use]
    pub fn new(table: QMatrix, unk_id: u32) -> Self {
        Self { table, unk_id }
    }

    /// Vocabulary size
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.table.rows()
    }

    /// Embedding width
    #[must_use]
    pub fn dim(&self) -> usize {
        self.table.cols()
    }

    /// Underlying table
    #[must_use]
    pub fn table(&self) -> &QMatrix {
        &self.table
    }

    /// Row of `id`
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::VocabularyIndexOutOfRange`] if `id` has no row.
    pub fn row_index(&self, id: u32) -> NmtResult<usize> {
        usize::try_from(id)
            .ok()
            .filter(|&i| i < self.table.rows())
            .ok_or(NmtError::VocabularyIndexOutOfRange {
                index: id,
                size: self.table.rows(),
            })
    }

    /// Row of `id`, or of the reserved unknown id
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::VocabularyIndexOutOfRange`] if the unknown id has
    /// no row either.
    pub fn resolve(&self, id: u32) -> NmtResult<usize> {
        match self.row_index(id) {
            Err(NmtError::VocabularyIndexOutOfRange { .. }) => {
                crate::trace_event!(
                    id,
                    size = self.table.rows(),
                    unk = self.unk_id,
                    "unknown id replaced"
                );
                self.row_index(self.unk_id)
            }
            other => other,
        }
    }

    /// Gather the rows of `ids` into `out` `(ids.len(), dim)`
    ///
    /// # Errors
    ///
    /// See [`Embeddings::resolve`].
    pub fn lookup(&self, ids: &[u32], rows: &mut Vec<usize>, out: &mut QMatrix) -> NmtResult<()> {
        rows.clear();
        for &id in ids {
            rows.push(self.resolve(id)?);
        }
        assemble(&self.table, rows, out)
    }

    /// Embedding fed before the first target word: `rows` zero rows
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::Allocation`] if `out` cannot grow.
    pub fn empty(&self, rows: usize, out: &mut QMatrix) -> NmtResult<()> {
        out.resize(rows, self.dim())?;
        out.data_mut().fill(0);
        out.set_range(QuantRange::ZERO);
        Ok(())
    }
}
