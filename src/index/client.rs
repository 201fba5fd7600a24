//! Client for the vector index data and control planes.
//!
//! Speaks the Pinecone-compatible REST wire format: per-record dense
//! `values` plus optional `sparseValues`, camelCase request fields, and an
//! `Api-Key` header when one is configured. The data plane lives at
//! `INDEX_BASE_URL`; index lifecycle operations (create/delete) go to the
//! separate control plane at `INDEX_CONTROL_URL`.

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::config::{HybridMode, IndexConfig};
use crate::models::{IndexStats, RetrievedChunk};
use crate::sanitize::sanitize_value;

/// Records per upsert request. Matches the batch size the index accepts
/// without tripping request-size limits.
pub const UPSERT_BATCH_SIZE: usize = 100;

/// Ids per delete request.
const DELETE_BATCH_SIZE: usize = 100;

/// Upper bound on how many records a metadata scan (list, remove, repair)
/// will pull back in one probe query.
pub const REMOVE_SCAN_LIMIT: usize = 10_000;

/// Weight given to the dense side of a hybrid query; the sparse side gets
/// `1.0 - HYBRID_ALPHA`. Applied client-side before the query is sent.
pub const HYBRID_ALPHA: f32 = 0.5;

/// Near-zero component used for probe vectors that should match everything
/// roughly equally.
const NEUTRAL_PROBE_VALUE: f32 = 0.001;

// ─── Wire types ───

/// Parallel term-index / weight arrays, the sparse half of a hybrid record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseValues {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

/// A fully encoded record ready for the index: dense vector, optional
/// sparse vector, and flat metadata carrying the chunk text.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: String,
    pub dense: Vec<f32>,
    pub sparse: Option<SparseValues>,
    pub metadata: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireVector<'a> {
    id: &'a str,
    values: &'a [f32],
    #[serde(skip_serializing_if = "Option::is_none")]
    sparse_values: Option<&'a SparseValues>,
    metadata: &'a Value,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [WireVector<'a>],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    top_k: usize,
    vector: &'a [f32],
    #[serde(skip_serializing_if = "Option::is_none")]
    sparse_vector: Option<&'a SparseValues>,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    ids: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delete_all: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    id: &'a str,
    set_metadata: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    namespaces: Value,
    #[serde(default)]
    dimension: usize,
    #[serde(default)]
    index_fullness: f32,
    #[serde(default)]
    total_vector_count: usize,
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
}

// ─── Upsert outcome ───

/// What actually happened to a batch-wise upsert. Degradation (sparse
/// vectors stripped after a rejected batch) commits the data but is worth
/// surfacing; a hard failure reports how far we got.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Committed {
        upserted: usize,
    },
    DegradedCommitted {
        upserted: usize,
        degraded_batches: usize,
    },
    Failed {
        upserted: usize,
        error: String,
    },
}

impl UpsertOutcome {
    pub fn upserted(&self) -> usize {
        match self {
            Self::Committed { upserted }
            | Self::DegradedCommitted { upserted, .. }
            | Self::Failed { upserted, .. } => *upserted,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

// ─── Client ───

pub struct IndexClient {
    client: reqwest::Client,
    config: IndexConfig,
    dimension: usize,
    /// Resolved hybrid capability. `None` until the first probe.
    hybrid: RwLock<Option<bool>>,
}

impl IndexClient {
    pub fn new(client: reqwest::Client, config: IndexConfig, dimension: usize) -> Self {
        Self {
            client,
            config,
            dimension,
            hybrid: RwLock::new(None),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether the hybrid capability has been resolved (probed or forced).
    pub fn hybrid_resolved(&self) -> bool {
        self.hybrid.read().is_some()
    }

    fn data_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn namespace(&self) -> Option<&str> {
        if self.config.namespace.is_empty() {
            None
        } else {
            Some(&self.config.namespace)
        }
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => req.header("Api-Key", key),
            None => req,
        }
    }

    fn neutral_probe(&self) -> Vec<f32> {
        vec![NEUTRAL_PROBE_VALUE; self.dimension]
    }

    // ─── Hybrid capability ───

    /// Whether sparse vectors may be attached to upserts and queries.
    ///
    /// `off` never allows them. `on` forces them (a probe still runs once so
    /// a rejecting index shows up in the logs). `auto` sends one sparse probe
    /// query and caches the verdict; a probe that errors outright falls back
    /// to dense-only for the current request without caching, so a briefly
    /// unreachable index does not pin the process to dense-only.
    pub async fn hybrid_enabled(&self) -> bool {
        if let Some(resolved) = *self.hybrid.read() {
            return resolved;
        }
        match self.config.hybrid_mode {
            HybridMode::Off => {
                *self.hybrid.write() = Some(false);
                false
            }
            HybridMode::On => {
                match self.probe_sparse_support().await {
                    Ok(true) => tracing::info!("Vector index accepted the sparse probe"),
                    Ok(false) => tracing::warn!(
                        "Vector index rejected the sparse probe but hybrid mode is forced on"
                    ),
                    Err(err) => {
                        tracing::warn!("Sparse probe failed (hybrid mode is forced on): {err:#}")
                    }
                }
                *self.hybrid.write() = Some(true);
                true
            }
            HybridMode::Auto => match self.probe_sparse_support().await {
                Ok(supported) => {
                    if supported {
                        tracing::info!(
                            "Vector index accepted the sparse probe, hybrid retrieval enabled"
                        );
                    } else {
                        tracing::info!(
                            "Vector index rejected the sparse probe, using dense-only retrieval"
                        );
                    }
                    *self.hybrid.write() = Some(supported);
                    supported
                }
                Err(err) => {
                    tracing::warn!(
                        "Sparse probe failed, using dense-only retrieval for this request: {err:#}"
                    );
                    false
                }
            },
        }
    }

    /// One sparse query against the index. A 2xx means sparse vectors are
    /// accepted, a 4xx means they are not; anything else is indeterminate.
    async fn probe_sparse_support(&self) -> Result<bool> {
        let probe_sparse = SparseValues {
            indices: vec![0],
            values: vec![1.0],
        };
        let dense = self.neutral_probe();
        let body = QueryRequest {
            top_k: 1,
            vector: &dense,
            sparse_vector: Some(&probe_sparse),
            include_metadata: false,
            include_values: false,
            namespace: self.namespace(),
        };
        let response = self
            .authed(self.client.post(self.data_url("query")))
            .json(&body)
            .send()
            .await
            .context("Failed to reach vector index for sparse probe")?;
        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else if status.is_client_error() {
            Ok(false)
        } else {
            let body = response.text().await.unwrap_or_default();
            bail!("Sparse probe returned {status}: {body}");
        }
    }

    // ─── Upsert ───

    /// Upsert `records` in batches. Never returns `Err`: every failure mode
    /// is folded into the outcome so the caller can report partial progress.
    pub async fn upsert(&self, records: &[IndexRecord]) -> UpsertOutcome {
        let mut upserted = 0usize;
        let mut degraded_batches = 0usize;

        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let vectors: Vec<WireVector> = batch.iter().map(|r| wire_vector(r, true)).collect();
            let has_sparse = vectors.iter().any(|v| v.sparse_values.is_some());
            match self.upsert_batch(&vectors).await {
                Ok(()) => upserted += batch.len(),
                Err(err) if has_sparse => {
                    tracing::warn!(
                        "Upsert batch of {} rejected with sparse vectors attached, retrying dense-only: {err:#}",
                        batch.len()
                    );
                    let stripped: Vec<WireVector> =
                        batch.iter().map(|r| wire_vector(r, false)).collect();
                    match self.upsert_batch(&stripped).await {
                        Ok(()) => {
                            upserted += batch.len();
                            degraded_batches += 1;
                        }
                        Err(retry_err) => {
                            return UpsertOutcome::Failed {
                                upserted,
                                error: format!("{retry_err:#}"),
                            }
                        }
                    }
                }
                Err(err) => {
                    return UpsertOutcome::Failed {
                        upserted,
                        error: format!("{err:#}"),
                    }
                }
            }
        }

        if degraded_batches > 0 {
            UpsertOutcome::DegradedCommitted {
                upserted,
                degraded_batches,
            }
        } else {
            UpsertOutcome::Committed { upserted }
        }
    }

    async fn upsert_batch(&self, vectors: &[WireVector<'_>]) -> Result<()> {
        let body = UpsertRequest {
            vectors,
            namespace: self.namespace(),
        };
        let response = self
            .authed(self.client.post(self.data_url("vectors/upsert")))
            .json(&body)
            .send()
            .await
            .context("Failed to reach vector index for upsert")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Vector index upsert returned {status}: {body}");
        }
        Ok(())
    }

    // ─── Query ───

    /// Similarity query. When `sparse` is present the dense and sparse sides
    /// are weighted client-side by [`HYBRID_ALPHA`] before sending.
    pub async fn query(
        &self,
        dense: Vec<f32>,
        sparse: Option<SparseValues>,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let (vector, sparse_vector) = match sparse {
            Some(sv) => blend(dense, sv, HYBRID_ALPHA),
            None => (dense, None),
        };
        let body = QueryRequest {
            top_k,
            vector: &vector,
            sparse_vector: sparse_vector.as_ref(),
            include_metadata: true,
            include_values: false,
            namespace: self.namespace(),
        };
        let response = self
            .authed(self.client.post(self.data_url("query")))
            .json(&body)
            .send()
            .await
            .context("Failed to reach vector index for query")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Vector index query returned {status}: {body}");
        }
        let parsed: QueryResponse = response
            .json()
            .await
            .context("Failed to decode vector index query response")?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| {
                let metadata = m
                    .metadata
                    .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
                RetrievedChunk {
                    id: m.id,
                    text: text_from_metadata(&metadata),
                    score: m.score,
                    metadata,
                    rerank_score: None,
                }
            })
            .collect())
    }

    /// Pull back up to `limit` records with metadata via a neutral probe
    /// query. The index has no list endpoint, so scans ride on `query`.
    pub async fn sample(&self, limit: usize) -> Result<Vec<RetrievedChunk>> {
        self.query(self.neutral_probe(), None, limit).await
    }

    // ─── Stats ───

    pub async fn stats(&self) -> Result<IndexStats> {
        let response = self
            .authed(self.client.post(self.data_url("describe_index_stats")))
            .json(&serde_json::json!({}))
            .send()
            .await
            .context("Failed to reach vector index for stats")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Vector index stats returned {status}: {body}");
        }
        let stats: StatsResponse = response
            .json()
            .await
            .context("Failed to decode vector index stats response")?;
        Ok(IndexStats {
            total_vector_count: stats.total_vector_count,
            dimension: stats.dimension,
            index_fullness: stats.index_fullness,
            // Namespace maps come from the index verbatim; sanitize like any
            // other metadata this service returns.
            namespaces: sanitize_value(&stats.namespaces),
        })
    }

    // ─── Delete / update ───

    /// Delete records by id in batches. Returns how many ids were submitted.
    pub async fn delete_ids(&self, ids: &[String]) -> Result<usize> {
        for batch in ids.chunks(DELETE_BATCH_SIZE) {
            let body = DeleteRequest {
                ids: Some(batch),
                delete_all: None,
                namespace: self.namespace(),
            };
            let response = self
                .authed(self.client.post(self.data_url("vectors/delete")))
                .json(&body)
                .send()
                .await
                .context("Failed to reach vector index for delete")?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                bail!("Vector index delete returned {status}: {body}");
            }
        }
        Ok(ids.len())
    }

    /// Delete every record in the namespace. The index itself survives.
    pub async fn clear(&self) -> Result<()> {
        let body = DeleteRequest {
            ids: None,
            delete_all: Some(true),
            namespace: self.namespace(),
        };
        let response = self
            .authed(self.client.post(self.data_url("vectors/delete")))
            .json(&body)
            .send()
            .await
            .context("Failed to reach vector index for clear")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Vector index clear returned {status}: {body}");
        }
        Ok(())
    }

    async fn update_metadata(&self, id: &str, set_metadata: Value) -> Result<()> {
        let body = UpdateRequest {
            id,
            set_metadata,
            namespace: self.namespace(),
        };
        let response = self
            .authed(self.client.post(self.data_url("vectors/update")))
            .json(&body)
            .send()
            .await
            .context("Failed to reach vector index for metadata update")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Vector index update returned {status}: {body}");
        }
        Ok(())
    }

    // ─── Document removal ───

    /// Scan the index and delete every chunk belonging to `document`.
    /// Matching is by metadata `source` when `use_metadata`, otherwise by
    /// the `{document}_page_` id prefix.
    pub async fn remove_document(&self, document: &str, use_metadata: bool) -> Result<usize> {
        let scanned = self.sample(REMOVE_SCAN_LIMIT).await?;
        let ids: Vec<String> = scanned
            .into_iter()
            .filter(|c| chunk_belongs_to(&c.id, &c.metadata, document, use_metadata))
            .map(|c| c.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        self.delete_ids(&ids).await
    }

    // ─── Metadata repair ───

    /// Backfill the canonical `text` metadata key on records that only carry
    /// the legacy `page_content` key. Idempotent: repaired records no longer
    /// match. Returns `(chunks_updated, documents_touched)`.
    pub async fn repair_metadata(&self) -> Result<(usize, usize)> {
        let scanned = self.sample(REMOVE_SCAN_LIMIT).await?;
        let mut chunks_updated = 0usize;
        let mut documents: BTreeSet<String> = BTreeSet::new();

        for chunk in scanned {
            if let Some(page_content) = needs_text_repair(&chunk.metadata) {
                self.update_metadata(&chunk.id, serde_json::json!({ "text": page_content }))
                    .await?;
                chunks_updated += 1;
                if let Some(source) = chunk.metadata.get("source").and_then(Value::as_str) {
                    documents.insert(source.to_string());
                }
            }
        }

        Ok((chunks_updated, documents.len()))
    }

    // ─── Control plane ───

    fn control_url(&self) -> Result<&str> {
        self.config.control_url.as_deref().ok_or_else(|| {
            anyhow!("INDEX_CONTROL_URL is not configured; index lifecycle operations are unavailable")
        })
    }

    /// Create the configured index on the control plane. `metric` overrides
    /// the configured distance metric for this call.
    pub async fn create_index(&self, metric: Option<&str>) -> Result<()> {
        let control = self.control_url()?;
        let url = format!("{}/indexes", control.trim_end_matches('/'));
        let body = CreateIndexRequest {
            name: &self.config.name,
            dimension: self.dimension,
            metric: metric.unwrap_or(&self.config.metric),
        };
        let response = self
            .authed(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .context("Failed to reach index control plane for create")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Index create returned {status}: {body}");
        }
        tracing::info!(
            "Created index '{}' (dimension {}, metric {})",
            self.config.name,
            self.dimension,
            metric.unwrap_or(&self.config.metric)
        );
        Ok(())
    }

    /// Drop the configured index. An index that does not exist counts as
    /// dropped.
    pub async fn drop_index(&self) -> Result<()> {
        let control = self.control_url()?;
        let url = format!(
            "{}/indexes/{}",
            control.trim_end_matches('/'),
            self.config.name
        );
        let response = self
            .authed(self.client.delete(&url))
            .send()
            .await
            .context("Failed to reach index control plane for delete")?;
        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            bail!("Index delete returned {status}: {body}");
        }
        tracing::info!("Dropped index '{}'", self.config.name);
        Ok(())
    }
}

// ─── Helpers ───

fn wire_vector(record: &IndexRecord, include_sparse: bool) -> WireVector<'_> {
    WireVector {
        id: &record.id,
        values: &record.dense,
        sparse_values: if include_sparse {
            record.sparse.as_ref()
        } else {
            None
        },
        metadata: &record.metadata,
    }
}

/// Scale the dense and sparse sides of a hybrid query so their scores mix
/// at the requested ratio.
fn blend(dense: Vec<f32>, sparse: SparseValues, alpha: f32) -> (Vec<f32>, Option<SparseValues>) {
    let dense = dense.into_iter().map(|v| v * alpha).collect();
    let values = sparse.values.into_iter().map(|v| v * (1.0 - alpha)).collect();
    (
        dense,
        Some(SparseValues {
            indices: sparse.indices,
            values,
        }),
    )
}

/// Chunk text as stored in index metadata. The canonical key is `text`;
/// `page_content` is the legacy key repaired by `repair_metadata`.
pub fn text_from_metadata(metadata: &Value) -> String {
    for key in ["text", "page_content"] {
        if let Some(text) = metadata.get(key).and_then(Value::as_str) {
            if !text.trim().is_empty() {
                return text.to_string();
            }
        }
    }
    String::new()
}

/// The backfill value for a record missing its canonical `text` key: the
/// non-blank legacy `page_content`, or `None` when there is nothing to copy
/// or `text` is already populated. Repaired records select nothing, which is
/// what makes `repair_metadata` idempotent.
pub fn needs_text_repair(metadata: &Value) -> Option<&str> {
    let page_content = metadata
        .get("page_content")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())?;
    let text_missing = metadata
        .get("text")
        .and_then(Value::as_str)
        .map(|t| t.trim().is_empty())
        .unwrap_or(true);
    text_missing.then_some(page_content)
}

/// Whether an indexed chunk belongs to `document`.
///
/// Metadata matching is by containment so sources stored with a path
/// qualifier still match on the bare file name.
pub fn chunk_belongs_to(id: &str, metadata: &Value, document: &str, use_metadata: bool) -> bool {
    if use_metadata {
        metadata
            .get("source")
            .and_then(Value::as_str)
            .is_some_and(|source| source.contains(document))
    } else {
        id.starts_with(&format!("{document}_page_"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn test_client() -> IndexClient {
        IndexClient::new(
            reqwest::Client::new(),
            IndexConfig::default(),
            8,
        )
    }

    fn offline_client(mode: HybridMode) -> IndexClient {
        let config = IndexConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            hybrid_mode: mode,
            ..IndexConfig::default()
        };
        IndexClient::new(reqwest::Client::new(), config, 8)
    }

    /// In-process stand-in for the index data plane: accepts dense-only
    /// upserts, rejects any batch carrying sparse values, and counts the
    /// requests it saw.
    async fn spawn_sparse_rejecting_index() -> (String, Arc<AtomicUsize>) {
        let requests = Arc::new(AtomicUsize::new(0));
        let seen = requests.clone();
        let app = Router::new().route(
            "/vectors/upsert",
            post(move |Json(body): Json<Value>| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    let sparse_attached = body["vectors"].as_array().is_some_and(|vectors| {
                        vectors.iter().any(|v| v.get("sparseValues").is_some())
                    });
                    if sparse_attached {
                        (StatusCode::BAD_REQUEST, "sparse values not supported")
                    } else {
                        (StatusCode::OK, "ok")
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), requests)
    }

    #[test]
    fn test_blend_scales_both_sides() {
        let sparse = SparseValues {
            indices: vec![2, 9],
            values: vec![1.0, 2.0],
        };
        let (dense, sparse) = blend(vec![1.0, 0.5], sparse, 0.5);
        assert_eq!(dense, vec![0.5, 0.25]);
        let sparse = sparse.unwrap();
        assert_eq!(sparse.indices, vec![2, 9]);
        assert_eq!(sparse.values, vec![0.5, 1.0]);
    }

    #[test]
    fn test_neutral_probe_matches_dimension() {
        let client = test_client();
        let probe = client.neutral_probe();
        assert_eq!(probe.len(), 8);
        assert!(probe.iter().all(|v| *v == NEUTRAL_PROBE_VALUE));
    }

    #[test]
    fn test_query_request_wire_casing() {
        let dense = vec![0.1_f32];
        let sparse = SparseValues {
            indices: vec![1],
            values: vec![0.5],
        };
        let body = QueryRequest {
            top_k: 5,
            vector: &dense,
            sparse_vector: Some(&sparse),
            include_metadata: true,
            include_values: false,
            namespace: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["topK"], 5);
        assert_eq!(value["includeMetadata"], true);
        assert_eq!(value["includeValues"], false);
        assert_eq!(value["sparseVector"]["indices"][0], 1);
        assert!(value.get("namespace").is_none());
    }

    #[test]
    fn test_upsert_request_omits_absent_sparse() {
        let record = IndexRecord {
            id: "paper.pdf_page_1_chunk_0".to_string(),
            dense: vec![0.1, 0.2],
            sparse: None,
            metadata: json!({ "text": "hello" }),
        };
        let vectors = vec![wire_vector(&record, true)];
        let body = UpsertRequest {
            vectors: &vectors,
            namespace: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value["vectors"][0].get("sparseValues").is_none());
        assert_eq!(value["vectors"][0]["id"], "paper.pdf_page_1_chunk_0");
    }

    #[test]
    fn test_wire_vector_strips_sparse_on_request() {
        let record = IndexRecord {
            id: "a".to_string(),
            dense: vec![0.1],
            sparse: Some(SparseValues {
                indices: vec![3],
                values: vec![0.7],
            }),
            metadata: json!({}),
        };
        assert!(wire_vector(&record, true).sparse_values.is_some());
        assert!(wire_vector(&record, false).sparse_values.is_none());
    }

    #[test]
    fn test_delete_request_delete_all_casing() {
        let body = DeleteRequest {
            ids: None,
            delete_all: Some(true),
            namespace: Some("papers"),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["deleteAll"], true);
        assert_eq!(value["namespace"], "papers");
        assert!(value.get("ids").is_none());
    }

    #[test]
    fn test_update_request_set_metadata_casing() {
        let body = UpdateRequest {
            id: "x",
            set_metadata: json!({ "text": "restored" }),
            namespace: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["setMetadata"]["text"], "restored");
    }

    #[test]
    fn test_upsert_outcome_accessors() {
        assert_eq!(UpsertOutcome::Committed { upserted: 7 }.upserted(), 7);
        assert!(!UpsertOutcome::Committed { upserted: 7 }.is_failed());
        let degraded = UpsertOutcome::DegradedCommitted {
            upserted: 120,
            degraded_batches: 1,
        };
        assert_eq!(degraded.upserted(), 120);
        assert!(!degraded.is_failed());
        let failed = UpsertOutcome::Failed {
            upserted: 100,
            error: "boom".to_string(),
        };
        assert_eq!(failed.upserted(), 100);
        assert!(failed.is_failed());
    }

    #[test]
    fn test_text_from_metadata_prefers_canonical_key() {
        let meta = json!({ "text": "canonical", "page_content": "legacy" });
        assert_eq!(text_from_metadata(&meta), "canonical");
    }

    #[test]
    fn test_text_from_metadata_falls_back_to_legacy_key() {
        let meta = json!({ "page_content": "legacy" });
        assert_eq!(text_from_metadata(&meta), "legacy");
        let blank = json!({ "text": "   ", "page_content": "legacy" });
        assert_eq!(text_from_metadata(&blank), "legacy");
    }

    #[test]
    fn test_text_from_metadata_empty_when_absent() {
        assert_eq!(text_from_metadata(&json!({ "source": "a.pdf" })), "");
    }

    #[test]
    fn test_chunk_belongs_to_by_metadata_source() {
        let meta = json!({ "source": "paper.pdf" });
        assert!(chunk_belongs_to("any_id", &meta, "paper.pdf", true));
        assert!(!chunk_belongs_to("any_id", &meta, "other.pdf", true));
        assert!(!chunk_belongs_to("any_id", &json!({}), "paper.pdf", true));

        // Source stored as a path still matches on the file name
        let pathy = json!({ "source": "uploads/paper.pdf" });
        assert!(chunk_belongs_to("any_id", &pathy, "paper.pdf", true));
    }

    #[test]
    fn test_chunk_belongs_to_by_id_prefix() {
        let meta = json!({});
        assert!(chunk_belongs_to(
            "paper.pdf_page_3_chunk_17",
            &meta,
            "paper.pdf",
            false
        ));
        assert!(!chunk_belongs_to(
            "other.pdf_page_1_chunk_0",
            &meta,
            "paper.pdf",
            false
        ));
        // Prefix match must include the page marker, not just the name
        assert!(!chunk_belongs_to(
            "paper.pdf.bak_page_1_chunk_0",
            &meta,
            "paper.pdf",
            false
        ));
    }

    #[test]
    fn test_needs_text_repair_selects_legacy_only_records() {
        let legacy = json!({ "page_content": "stored text", "source": "a.pdf" });
        assert_eq!(needs_text_repair(&legacy), Some("stored text"));
        // Blank canonical text counts as missing
        let blank_text = json!({ "page_content": "stored text", "text": "   " });
        assert_eq!(needs_text_repair(&blank_text), Some("stored text"));
    }

    #[test]
    fn test_needs_text_repair_skips_repaired_records() {
        let repaired = json!({ "page_content": "stored text", "text": "stored text" });
        assert_eq!(needs_text_repair(&repaired), None);
    }

    #[test]
    fn test_needs_text_repair_skips_blank_or_absent_page_content() {
        assert_eq!(needs_text_repair(&json!({ "page_content": "   " })), None);
        assert_eq!(needs_text_repair(&json!({ "text": "fine" })), None);
        assert_eq!(needs_text_repair(&json!({})), None);
    }

    #[tokio::test]
    async fn test_hybrid_mode_off_resolves_false_without_network() {
        let client = offline_client(HybridMode::Off);
        assert!(!client.hybrid_resolved());
        assert!(!client.hybrid_enabled().await);
        // Off is a definitive verdict: cached, and the second call agrees
        assert!(client.hybrid_resolved());
        assert!(!client.hybrid_enabled().await);
    }

    #[tokio::test]
    async fn test_hybrid_mode_on_trusts_operator_when_index_is_down() {
        let client = offline_client(HybridMode::On);
        assert!(client.hybrid_enabled().await);
        assert!(client.hybrid_resolved());
    }

    #[tokio::test]
    async fn test_hybrid_auto_transport_error_is_not_cached() {
        let client = offline_client(HybridMode::Auto);
        assert!(!client.hybrid_enabled().await);
        // An unreachable index is indeterminate, not a verdict: the next
        // call gets to try again
        assert!(!client.hybrid_resolved());
        assert!(!client.hybrid_enabled().await);
        assert!(!client.hybrid_resolved());
    }

    #[tokio::test]
    async fn test_upsert_retries_rejected_sparse_batch_dense_only() {
        let (base_url, requests) = spawn_sparse_rejecting_index().await;
        let config = IndexConfig {
            base_url,
            ..IndexConfig::default()
        };
        let client = IndexClient::new(reqwest::Client::new(), config, 2);
        let records = vec![
            IndexRecord {
                id: "paper.pdf_page_1_chunk_0".to_string(),
                dense: vec![0.1, 0.2],
                sparse: Some(SparseValues {
                    indices: vec![1],
                    values: vec![0.5],
                }),
                metadata: json!({ "text": "alpha" }),
            },
            IndexRecord {
                id: "paper.pdf_page_1_chunk_1".to_string(),
                dense: vec![0.3, 0.4],
                sparse: None,
                metadata: json!({ "text": "beta" }),
            },
        ];

        let outcome = client.upsert(&records).await;

        assert_eq!(
            outcome,
            UpsertOutcome::DegradedCommitted {
                upserted: 2,
                degraded_batches: 1,
            }
        );
        // One rejected sparse attempt, one dense-only retry
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }
}
