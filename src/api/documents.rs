//! Document endpoints: upload/ingest, list, remove.

use std::collections::{BTreeMap, BTreeSet};

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;

use crate::chunking::{self, pdf};
use crate::encode;
use crate::index::client::{UpsertOutcome, REMOVE_SCAN_LIMIT};
use crate::models::{
    DocumentSummary, ListResponse, RemoveRequest, RemoveResponse, RetrievedChunk, UploadParams,
    UploadResponse,
};
use crate::state::AppState;

/// POST /documents/upload — persist a PDF, chunk it, and index the chunks.
pub async fn upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    // ── Step 1: Pull the file out of the multipart form ───
    let mut filename: Option<String> = None;
    let mut data: Option<axum::body::Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid multipart form: {e}"),
        )
    })? {
        match field.name().unwrap_or("") {
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                data = Some(field.bytes().await.map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read uploaded file: {e}"),
                    )
                })?);
            }
            _ => continue,
        }
    }

    let data = data.ok_or((
        StatusCode::BAD_REQUEST,
        "No file field in upload".to_string(),
    ))?;
    let filename = filename
        .as_deref()
        .and_then(sanitize_filename)
        .ok_or((
            StatusCode::BAD_REQUEST,
            "A file name is required".to_string(),
        ))?;
    if !filename.to_lowercase().ends_with(".pdf") {
        return Err((
            StatusCode::BAD_REQUEST,
            "Only PDF files are supported".to_string(),
        ));
    }

    // ── Step 2: Extract page text ─────────────────────────
    // Parse before persisting so a corrupt upload leaves nothing on disk.
    let pages =
        pdf::extract_pages(&data).map_err(|e| (StatusCode::BAD_REQUEST, format!("{e:#}")))?;

    // ── Step 3: Persist the original upload ───────────────
    let path = state.config.uploads_dir().join(&filename);
    tokio::fs::write(&path, &data).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to store upload: {e}"),
        )
    })?;

    // ── Step 4: Chunk ─────────────────────────────────────
    let chunks = chunking::chunk_pages(
        &filename,
        &pages,
        state.config.chunking.chunk_size,
        state.config.chunking.chunk_overlap,
    );
    let page_count = pages.len();

    if chunks.is_empty() {
        tracing::info!("Uploaded {filename}: no extractable text, nothing to index");
        return Ok(Json(UploadResponse {
            filename,
            pages: page_count,
            chunks: 0,
            upserted: false,
            chunks_upserted: 0,
            index_stats: None,
        }));
    }

    // ── Step 5: Encode and upsert ─────────────────────────
    let mut upserted = false;
    let mut chunks_upserted = 0usize;

    if params.upsert_to_index {
        let hybrid = state.index.hybrid_enabled().await;
        if hybrid {
            encode::ensure_fitted(&state, &chunks).await;
        }
        let records = encode::encode_chunks(&state, &chunks, hybrid)
            .await
            .map_err(|e| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to embed chunks: {e:#}"),
                )
            })?;

        match state.index.upsert(&records).await {
            UpsertOutcome::Committed { upserted: n } => {
                upserted = true;
                chunks_upserted = n;
            }
            UpsertOutcome::DegradedCommitted {
                upserted: n,
                degraded_batches,
            } => {
                tracing::warn!(
                    "{degraded_batches} batch(es) committed without sparse vectors for {filename}"
                );
                upserted = true;
                chunks_upserted = n;
            }
            UpsertOutcome::Failed { upserted: n, error } => {
                return Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!(
                        "Indexed {n} of {} chunks before the index rejected the upsert: {error}",
                        records.len()
                    ),
                ));
            }
        }
    }

    // ── Step 6: Fresh index stats (best-effort) ───────────
    let index_stats = if upserted {
        match state.index.stats().await {
            Ok(stats) => Some(stats),
            Err(err) => {
                tracing::warn!("Could not fetch index stats after upload: {err:#}");
                None
            }
        }
    } else {
        None
    };

    tracing::info!(
        "Uploaded {filename}: {page_count} page(s), {} chunk(s), {chunks_upserted} upserted",
        chunks.len()
    );

    Ok(Json(UploadResponse {
        filename,
        pages: page_count,
        chunks: chunks.len(),
        upserted,
        chunks_upserted,
        index_stats,
    }))
}

/// GET /documents/list — group indexed chunks by source document.
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<ListResponse>, (StatusCode, String)> {
    let stats = state.index.stats().await.map_err(internal)?;
    let sampled = state
        .index
        .sample(REMOVE_SCAN_LIMIT)
        .await
        .map_err(internal)?;

    let documents = group_documents(&sampled);
    let total_documents = documents.len();
    let summary = format!(
        "{total_documents} document(s), {} chunk(s) indexed",
        stats.total_vector_count
    );

    Ok(Json(ListResponse {
        total_documents,
        // The stats endpoint is authoritative; the sample is capped
        total_chunks: stats.total_vector_count,
        documents,
        summary,
    }))
}

/// DELETE /documents/remove — drop a document's chunks and its stored file.
pub async fn remove(
    State(state): State<AppState>,
    Json(req): Json<RemoveRequest>,
) -> Result<Json<RemoveResponse>, (StatusCode, String)> {
    let document_name = req.document_name.trim().to_string();
    if document_name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "document_name is required".to_string(),
        ));
    }

    let chunks_removed = state
        .index
        .remove_document(&document_name, req.use_metadata)
        .await
        .map_err(internal)?;

    // Remove the stored upload alongside the index entries
    let mut file_deleted = false;
    let mut file_path = None;
    if let Some(path) = sanitize_filename(&document_name)
        .map(|name| state.config.uploads_dir().join(name))
        .filter(|p| p.is_file())
    {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                file_deleted = true;
                file_path = Some(path.display().to_string());
            }
            Err(err) => {
                tracing::warn!("Failed to delete stored file {}: {err}", path.display())
            }
        }
    }

    let success = chunks_removed > 0 || file_deleted;
    let message = if success {
        format!("Removed {chunks_removed} chunk(s) for '{document_name}'")
    } else {
        format!("No chunks or stored file found for '{document_name}'")
    };

    Ok(Json(RemoveResponse {
        success,
        message,
        chunks_removed,
        document_name,
        file_deleted,
        file_path,
    }))
}

// ─── Helpers ─────────────────────────────────────────────

fn internal(err: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}

/// Last path component of a client-supplied file name. Upload names go
/// straight into the uploads directory, so traversal parts must not survive.
fn sanitize_filename(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

fn group_documents(chunks: &[RetrievedChunk]) -> Vec<DocumentSummary> {
    let mut groups: BTreeMap<String, (usize, BTreeSet<u64>)> = BTreeMap::new();
    for chunk in chunks {
        let source = chunk
            .metadata
            .get("source")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .unwrap_or_else(|| source_from_id(&chunk.id));
        let entry = groups.entry(source).or_default();
        entry.0 += 1;
        if let Some(page) = chunk.metadata.get("page").and_then(Value::as_u64) {
            entry.1.insert(page);
        }
    }
    groups
        .into_iter()
        .map(|(name, (chunk_count, pages))| DocumentSummary {
            name,
            chunk_count,
            page_count: pages.len(),
        })
        .collect()
}

/// A chunk id is `{filename}_page_{n}_chunk_{m}`; everything before the
/// page marker is the document name.
fn source_from_id(id: &str) -> String {
    id.split("_page_").next().unwrap_or(id).to_string()
}
