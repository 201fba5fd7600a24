//! Dual encoding: dense embeddings plus optional sparse term weights.
//!
//! Every chunk gets a dense vector from the embedding provider. When hybrid
//! retrieval is on and the lexical corpus has been fitted, a BM25 sparse
//! vector rides along; chunks whose text yields no scorable terms stay
//! dense-only rather than failing the batch.

use anyhow::Result;
use bm25::Embedder;
use serde_json::Value;

use crate::index::client::{IndexRecord, SparseValues};
use crate::llm::embeddings;
use crate::models::Chunk;
use crate::state::AppState;

/// How many indexed chunks to sample when fitting the sparse encoder from
/// an index that already has content.
pub const FIT_SAMPLE_SIZE: usize = 100;

/// Flat metadata stored with each record. `text` is the canonical content
/// key the retrieval side reads back; `page_content` duplicates it for
/// consumers that still read the legacy key. Typed chunk fields follow,
/// then any extra entries that don't collide with them.
fn record_metadata(chunk: &Chunk) -> Value {
    let mut map = serde_json::Map::new();
    let meta = &chunk.metadata;
    map.insert("text".to_string(), Value::String(chunk.text.clone()));
    map.insert(
        "page_content".to_string(),
        Value::String(chunk.text.clone()),
    );
    map.insert("source".to_string(), Value::String(meta.source.clone()));
    map.insert("page".to_string(), Value::from(meta.page));
    map.insert(
        "indexed_at".to_string(),
        Value::String(chrono::Utc::now().to_rfc3339()),
    );
    if let Some(section) = &meta.section {
        map.insert("section".to_string(), Value::String(section.clone()));
    }
    if let Some(subsection) = &meta.subsection {
        map.insert("subsection".to_string(), Value::String(subsection.clone()));
    }
    if let Some(citations) = &meta.citations {
        map.insert("citations".to_string(), string_list(citations));
    }
    if let Some(figure_refs) = &meta.figure_refs {
        map.insert("figure_refs".to_string(), string_list(figure_refs));
    }
    for (key, value) in &meta.extra {
        map.entry(key.clone())
            .or_insert_with(|| Value::String(value.clone()));
    }
    Value::Object(map)
}

fn string_list(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

/// Sparse term weights for `text`, `None` when the text has no scorable terms.
pub fn sparse_embedding(embedder: &Embedder, text: &str) -> Option<SparseValues> {
    let embedding = embedder.embed(text);
    let indices: Vec<u32> = embedding.indices().copied().collect();
    if indices.is_empty() {
        return None;
    }
    let values: Vec<f32> = embedding.values().copied().collect();
    Some(SparseValues { indices, values })
}

/// Encode `chunks` into index records. A dense embedding failure aborts the
/// whole batch; sparse vectors are attached per-chunk when `hybrid` is on.
pub async fn encode_chunks(
    state: &AppState,
    chunks: &[Chunk],
    hybrid: bool,
) -> Result<Vec<IndexRecord>> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let dense = embeddings::embed_batch(&state.http_client, &state.config.llm, &texts).await?;
    if dense.len() != chunks.len() {
        anyhow::bail!(
            "Embedding API returned {} vectors for {} chunks",
            dense.len(),
            chunks.len()
        );
    }

    let embedder = if hybrid {
        state.lexical.embedder()
    } else {
        None
    };

    Ok(chunks
        .iter()
        .zip(dense)
        .map(|(chunk, dense)| {
            let sparse = embedder.as_deref().and_then(|e| {
                let sv = sparse_embedding(e, &chunk.text);
                if sv.is_none() {
                    tracing::debug!(
                        "Chunk {} produced no sparse terms, storing dense-only",
                        chunk.id
                    );
                }
                sv
            });
            IndexRecord {
                id: chunk.id.clone(),
                dense,
                sparse,
                metadata: record_metadata(chunk),
            }
        })
        .collect())
}

/// Encode the question side of a query.
pub async fn encode_query(
    state: &AppState,
    question: &str,
    hybrid: bool,
) -> Result<(Vec<f32>, Option<SparseValues>)> {
    let dense = embeddings::embed_single(&state.http_client, &state.config.llm, question).await?;
    let sparse = if hybrid {
        state
            .lexical
            .embedder()
            .as_deref()
            .and_then(|e| sparse_embedding(e, question))
    } else {
        None
    };
    Ok((dense, sparse))
}

/// Make sure the sparse encoder is fitted before hybrid encoding.
///
/// Prefers a sample of text already in the index so term weights reflect
/// the whole corpus; falls back to the batch being indexed right now. A fit
/// failure downgrades the caller to dense-only instead of erroring.
pub async fn ensure_fitted(state: &AppState, fallback: &[Chunk]) {
    if state.lexical.is_fitted() {
        return;
    }

    let mut corpus: Vec<String> = match state.index.sample(FIT_SAMPLE_SIZE).await {
        Ok(sampled) => sampled
            .into_iter()
            .map(|c| c.text)
            .filter(|t| !t.trim().is_empty())
            .collect(),
        Err(err) => {
            tracing::warn!("Could not sample index for corpus fitting: {err:#}");
            Vec::new()
        }
    };
    if corpus.is_empty() {
        corpus = fallback.iter().map(|c| c.text.clone()).collect();
    }

    if let Err(err) = state.lexical.fit(&corpus) {
        tracing::warn!("Lexical corpus fit failed, continuing dense-only: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::ChunkMetadata;
    use bm25::{EmbedderBuilder, Language};

    fn make_chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            metadata: ChunkMetadata {
                source: "paper.pdf".to_string(),
                page: 1,
                section: None,
                subsection: None,
                citations: None,
                figure_refs: None,
                extra: Default::default(),
            },
        }
    }

    fn fitted_embedder() -> Embedder {
        EmbedderBuilder::with_fit_to_corpus(
            Language::English,
            &[
                "transformers process sequences with attention",
                "recurrent networks process sequences step by step",
            ],
        )
        .build()
    }

    #[test]
    fn test_record_metadata_carries_text_and_provenance() {
        let mut chunk = make_chunk("paper.pdf_page_1_chunk_0", "Attention is all you need.");
        chunk.metadata.section = Some("Introduction".to_string());
        let meta = record_metadata(&chunk);
        assert_eq!(meta["text"], "Attention is all you need.");
        assert_eq!(meta["page_content"], meta["text"]);
        assert_eq!(meta["source"], "paper.pdf");
        assert_eq!(meta["page"], 1);
        assert_eq!(meta["section"], "Introduction");
        assert!(meta.get("indexed_at").is_some());
        assert!(meta.get("subsection").is_none());
    }

    #[test]
    fn test_record_metadata_extra_cannot_shadow_canonical_keys() {
        let mut chunk = make_chunk("id", "real text");
        chunk
            .metadata
            .extra
            .insert("text".to_string(), "bogus".to_string());
        chunk
            .metadata
            .extra
            .insert("license".to_string(), "CC-BY".to_string());
        let meta = record_metadata(&chunk);
        assert_eq!(meta["text"], "real text");
        assert_eq!(meta["license"], "CC-BY");
    }

    #[test]
    fn test_record_metadata_lists_serialize_as_arrays() {
        let mut chunk = make_chunk("id", "t");
        chunk.metadata.citations = Some(vec!["12".to_string(), "3".to_string()]);
        let meta = record_metadata(&chunk);
        assert_eq!(meta["citations"][0], "12");
        assert_eq!(meta["citations"][1], "3");
    }

    #[test]
    fn test_sparse_embedding_produces_parallel_arrays() {
        let embedder = fitted_embedder();
        let sparse = sparse_embedding(&embedder, "attention over sequences").unwrap();
        assert!(!sparse.indices.is_empty());
        assert_eq!(sparse.indices.len(), sparse.values.len());
    }

    #[test]
    fn test_sparse_embedding_empty_text_is_none() {
        let embedder = fitted_embedder();
        assert!(sparse_embedding(&embedder, "").is_none());
    }

    #[tokio::test]
    async fn test_ensure_fitted_falls_back_to_upload_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();
        // Unreachable index: the sample fails fast and the fallback corpus wins
        config.index.base_url = "http://127.0.0.1:1".to_string();
        let state = AppState::new(config).unwrap();

        let batch = vec![
            make_chunk("a", "first chunk of text"),
            make_chunk("b", "second chunk of text"),
        ];
        ensure_fitted(&state, &batch).await;
        assert!(state.lexical.is_fitted());
    }

    #[tokio::test]
    async fn test_ensure_fitted_with_nothing_to_fit_stays_unfitted() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();
        config.index.base_url = "http://127.0.0.1:1".to_string();
        let state = AppState::new(config).unwrap();

        ensure_fitted(&state, &[]).await;
        assert!(!state.lexical.is_fitted());
    }
}
