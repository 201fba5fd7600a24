//! Cross-encoder reranking via an OpenAI-compatible `/v1/rerank` endpoint.
//!
//! Sends a single batch request with all question-chunk pairs instead of
//! making N individual LLM chat calls. Typical latency: 50-100ms vs 1-3s.
//! Reranking is best-effort: with no endpoint configured, or a failing one,
//! the similarity ordering from the index stands.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::RerankerConfig;
use crate::models::RetrievedChunk;

/// Relevance verdict for one document, best first after sorting.
#[derive(Debug, Clone)]
pub struct RerankResult {
    /// Position of the document in the submitted batch.
    pub index: usize,
    /// Sigmoid-normalized relevance, 0.0 to 1.0.
    pub score: f32,
}

/// Score `documents` against `question` with the cross-encoder.
///
/// Returns verdicts sorted by score descending, or an error when the
/// endpoint is unconfigured, unreachable, or rejects the request.
pub async fn rerank(
    client: &reqwest::Client,
    config: &RerankerConfig,
    question: &str,
    documents: &[String],
) -> Result<Vec<RerankResult>> {
    let base_url = config
        .base_url
        .as_deref()
        .context("RERANKER_BASE_URL is not configured")?;
    let url = format!("{}/v1/rerank", base_url.trim_end_matches('/'));

    let body = RerankRequest {
        model: config.model.as_deref().unwrap_or("default"),
        query: question,
        documents,
        top_n: documents.len(),
    };
    let response = client
        .post(&url)
        .timeout(Duration::from_secs(config.timeout_secs.min(30)))
        .json(&body)
        .send()
        .await
        .context("Failed to reach the reranker")?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("Reranker returned {status}: {body}");
    }
    let parsed: RerankResponse = response
        .json()
        .await
        .context("Failed to decode reranker response")?;

    let mut scored: Vec<RerankResult> = parsed
        .results
        .into_iter()
        .map(|r| RerankResult {
            index: r.index,
            score: sigmoid(r.relevance_score),
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(scored)
}

/// Rerank `chunks` in place, attaching scores and reordering best-first.
///
/// Returns whether reranking actually happened. An unconfigured or failing
/// reranker leaves the chunks untouched.
pub async fn rerank_chunks(
    client: &reqwest::Client,
    config: &RerankerConfig,
    question: &str,
    chunks: &mut Vec<RetrievedChunk>,
) -> bool {
    let configured = config
        .base_url
        .as_deref()
        .is_some_and(|url| !url.trim().is_empty());
    if !configured || chunks.is_empty() {
        return false;
    }

    let documents: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    match rerank(client, config, question, &documents).await {
        Ok(results) => {
            apply_rerank(chunks, &results);
            true
        }
        Err(err) => {
            tracing::warn!("Reranking failed, keeping similarity order: {err:#}");
            false
        }
    }
}

/// Reorder `chunks` to follow `results`. Unscored chunks (the endpoint may
/// return fewer results than documents) keep their relative order at the tail.
fn apply_rerank(chunks: &mut Vec<RetrievedChunk>, results: &[RerankResult]) {
    let mut reordered = Vec::with_capacity(chunks.len());
    let mut taken = vec![false; chunks.len()];

    for result in results {
        if result.index < chunks.len() && !taken[result.index] {
            let mut chunk = chunks[result.index].clone();
            chunk.rerank_score = Some(result.score);
            taken[result.index] = true;
            reordered.push(chunk);
        }
    }
    for (i, chunk) in chunks.iter().enumerate() {
        if !taken[i] {
            reordered.push(chunk.clone());
        }
    }

    *chunks = reordered;
}

/// Sigmoid normalization: maps raw logits to 0-1 range.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

// ─── Wire types ──────────────────────────────────────────

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<WireRerankResult>,
}

#[derive(Deserialize)]
struct WireRerankResult {
    index: usize,
    relevance_score: f32,
}
