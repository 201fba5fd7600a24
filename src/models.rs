use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A text span cut from one page of a source PDF — the atomic unit of
/// indexing and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic id: `{filename}_page_{page}_chunk_{global_index}`.
    /// Re-indexing the same document overwrites in place, never duplicates.
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Structured chunk metadata. Known fields are explicit; `extra` is the
/// escape hatch for unstructured key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Uploaded filename of the source document
    pub source: String,
    /// 1-based page number
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsection: Option<String>,
    /// Bracketed reference numbers mentioned in the chunk, e.g. ["12", "7"]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<String>>,
    /// Figure mentions in the chunk, e.g. ["Figure 3"]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figure_refs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// A retrieval candidate before/after reranking.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    /// Similarity score reported by the vector index
    pub score: f32,
    /// Stored metadata as returned by the index
    pub metadata: serde_json::Value,
    pub rerank_score: Option<f32>,
}

// ─── Document endpoints ──────────────────────────────────

/// Query parameters for POST /documents/upload
#[derive(Debug, Clone, Deserialize)]
pub struct UploadParams {
    #[serde(default = "default_true")]
    pub upsert_to_index: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub pages: usize,
    pub chunks: usize,
    pub upserted: bool,
    pub chunks_upserted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_stats: Option<IndexStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResponse {
    pub total_documents: usize,
    pub total_chunks: usize,
    pub documents: Vec<DocumentSummary>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DocumentSummary {
    pub name: String,
    pub chunk_count: usize,
    pub page_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveRequest {
    pub document_name: String,
    /// Match on `source` metadata (true, default) or on the chunk-id prefix
    #[serde(default = "default_true")]
    pub use_metadata: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveResponse {
    pub success: bool,
    pub message: String,
    pub chunks_removed: usize,
    pub document_name: String,
    pub file_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

// ─── Index administration ────────────────────────────────

/// Snapshot of the vector index, as exposed by GET /index/stats.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub total_vector_count: usize,
    pub dimension: usize,
    pub index_fullness: f32,
    pub namespaces: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecreateRequest {
    /// Distance metric for the new index; defaults to the configured one
    pub metric: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixMetadataResponse {
    pub success: bool,
    pub message: String,
    pub documents_updated: usize,
}

// ─── Question answering ──────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceEntry {
    /// 1-based final rank
    pub rank: usize,
    /// Chunk text truncated to a preview
    pub content: String,
    /// Sanitized stored metadata
    pub metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskMetadata {
    /// Number of candidates retrieved before the final cut
    pub total_sources: usize,
    pub model_used: String,
    pub reranked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceEntry>,
    pub metadata: AskMetadata,
}

// ─── Health ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// Lexical encoder fitted for this process
    pub embeddings_cached: bool,
    /// Hybrid capability of the index has been resolved
    pub vector_store_initialized: bool,
    /// Answer generation is configured
    pub qa_chain_initialized: bool,
}

fn default_top_k() -> usize {
    20
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_request_defaults_top_k() {
        let req: AskRequest = serde_json::from_str(r#"{"question": "what is x?"}"#).unwrap();
        assert_eq!(req.top_k, 20);
    }

    #[test]
    fn test_remove_request_defaults_use_metadata() {
        let req: RemoveRequest =
            serde_json::from_str(r#"{"document_name": "paper.pdf"}"#).unwrap();
        assert!(req.use_metadata);
    }

    #[test]
    fn test_chunk_metadata_omits_empty_fields() {
        let meta = ChunkMetadata {
            source: "paper.pdf".to_string(),
            page: 3,
            ..ChunkMetadata::default()
        };
        let json = serde_json::to_value(&meta).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["source"], "paper.pdf");
        assert_eq!(obj["page"], 3);
    }

    #[test]
    fn test_chunk_metadata_round_trips() {
        let meta = ChunkMetadata {
            source: "paper.pdf".to_string(),
            page: 1,
            section: Some("Introduction".to_string()),
            citations: Some(vec!["4".to_string()]),
            ..ChunkMetadata::default()
        };
        let json = serde_json::to_string(&meta).unwrap();
        let back: ChunkMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_upload_params_default_upsert() {
        let params: UploadParams = serde_json::from_str("{}").unwrap();
        assert!(params.upsert_to_index);
    }
}
