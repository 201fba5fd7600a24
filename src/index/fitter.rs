//! Lexical corpus state for the sparse (BM25) encoder.
//!
//! The sparse embedder must be fitted to a text corpus before it can produce
//! term weights. Fitting happens at most once per process: from a sample of
//! already-indexed text when the index has content, otherwise from the batch
//! currently being upserted. `reset()` is the only way back.

use anyhow::{bail, Result};
use bm25::{Embedder, EmbedderBuilder, Language};
use parking_lot::RwLock;
use std::sync::Arc;

/// `Unfitted → Fitting → Fitted`; a failed fit falls back to `Unfitted`.
enum LexicalState {
    Unfitted,
    Fitting,
    Fitted(Arc<Embedder>),
}

pub struct LexicalCorpus {
    state: RwLock<LexicalState>,
}

impl LexicalCorpus {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LexicalState::Unfitted),
        }
    }

    pub fn is_fitted(&self) -> bool {
        matches!(*self.state.read(), LexicalState::Fitted(_))
    }

    /// The fitted encoder, if any. Sparse vectors are unavailable otherwise.
    pub fn embedder(&self) -> Option<Arc<Embedder>> {
        match &*self.state.read() {
            LexicalState::Fitted(embedder) => Some(embedder.clone()),
            _ => None,
        }
    }

    /// Fit the sparse encoder on `corpus`.
    ///
    /// Idempotent short-circuit when already fitted. The lock is dropped
    /// while the embedder builds, so a concurrent caller may win the race;
    /// whichever encoder lands first is kept and returned to both.
    pub fn fit(&self, corpus: &[String]) -> Result<Arc<Embedder>> {
        {
            let mut state = self.state.write();
            if let LexicalState::Fitted(embedder) = &*state {
                return Ok(embedder.clone());
            }
            *state = LexicalState::Fitting;
        }

        let texts: Vec<&str> = corpus
            .iter()
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty())
            .collect();
        if texts.is_empty() {
            let mut state = self.state.write();
            if matches!(*state, LexicalState::Fitting) {
                *state = LexicalState::Unfitted;
            }
            bail!("Cannot fit lexical corpus: no non-empty texts to fit on");
        }

        let embedder = Arc::new(
            EmbedderBuilder::with_fit_to_corpus(Language::English, &texts).build(),
        );

        let mut state = self.state.write();
        if let LexicalState::Fitted(existing) = &*state {
            return Ok(existing.clone());
        }
        tracing::info!("Lexical corpus fitted on {} texts", texts.len());
        *state = LexicalState::Fitted(embedder.clone());
        Ok(embedder)
    }

    /// Discard the fitted encoder. Called by the destructive index
    /// operations, after which the old corpus no longer describes the data.
    pub fn reset(&self) {
        *self.state.write() = LexicalState::Unfitted;
    }
}

impl Default for LexicalCorpus {
    fn default() -> Self {
        Self::new()
    }
}
