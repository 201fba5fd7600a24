//! Retrieval pipeline: encode the question, query the index, rerank the
//! candidates, and shape the survivors into answer sources.

use anyhow::Result;
use serde_json::Value;

use crate::encode;
use crate::llm::rerank::rerank_chunks;
use crate::models::{RetrievedChunk, SourceEntry};
use crate::sanitize::sanitize_value;
use crate::state::AppState;

/// How many sources survive into the final answer context.
pub const FINAL_SOURCES: usize = 5;

/// Longest text preview a source entry carries back to the caller.
pub const MAX_PREVIEW_CHARS: usize = 500;

/// Outcome of the retrieval pipeline.
pub struct Retrieval {
    /// Best chunks, at most [`FINAL_SOURCES`], best first.
    pub chunks: Vec<RetrievedChunk>,
    /// How many candidates the index returned before filtering.
    pub total_candidates: usize,
    /// Whether the cross-encoder actually reordered the candidates.
    pub reranked: bool,
}

/// Run the full retrieval pipeline for `question`.
pub async fn retrieve(state: &AppState, question: &str, top_k: usize) -> Result<Retrieval> {
    // ── Step 1: Resolve hybrid capability ─────────────────
    let hybrid = state.index.hybrid_enabled().await;
    if hybrid {
        encode::ensure_fitted(state, &[]).await;
    }

    // ── Step 2: Encode the question ───────────────────────
    let (dense, sparse) = encode::encode_query(state, question, hybrid).await?;

    // ── Step 3: Query the index ───────────────────────────
    let mut chunks = state.index.query(dense, sparse, top_k).await?;
    let total_candidates = chunks.len();

    // ── Step 4: Drop textless matches ─────────────────────
    chunks.retain(|c| !c.text.trim().is_empty());

    // ── Step 5: Rerank (best-effort) ──────────────────────
    let reranked = rerank_chunks(
        &state.http_client,
        &state.config.reranker,
        question,
        &mut chunks,
    )
    .await;

    // ── Step 6: Keep the top sources ──────────────────────
    chunks.truncate(FINAL_SOURCES);

    Ok(Retrieval {
        chunks,
        total_candidates,
        reranked,
    })
}

/// Shape retrieved chunks into ranked source entries with bounded previews
/// and sanitized metadata.
pub fn to_source_entries(chunks: &[RetrievedChunk]) -> Vec<SourceEntry> {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| SourceEntry {
            rank: i + 1,
            content: truncate_preview(&chunk.text, MAX_PREVIEW_CHARS),
            metadata: source_metadata(&chunk.metadata),
            relevance_score: chunk.rerank_score,
        })
        .collect()
}

/// Sanitized copy of a chunk's metadata without the bulky content keys;
/// the entry's `content` field already carries the preview.
fn source_metadata(metadata: &Value) -> Value {
    let mut value = sanitize_value(metadata);
    if let Value::Object(map) = &mut value {
        map.remove("text");
        map.remove("page_content");
    }
    value
}

/// First `max_chars` characters of `text`.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
