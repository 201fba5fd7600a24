//! Dense embeddings via the configured provider.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

/// Upper bound on characters per text sent for embedding.
/// nomic-embed-text has an 8 192-token context.  Clean English prose
/// tokenises at roughly 1 token per 4 chars, but OCR-damaged PDF text with
/// run-together words or raw equation dumps can be far denser.  3 000 chars
/// keeps even pathological pages safely under the limit.
/// Ollama is also asked to truncate server-side, but some versions reject
/// over-long inputs with a 400 anyway, so the cap is enforced here first.
const MAX_EMBED_CHARS: usize = 3_000;

/// Texts per request to Ollama's batch endpoint.
const OLLAMA_EMBED_BATCH: usize = 32;

/// Texts per request to the OpenAI-compatible endpoint.
const OPENAI_EMBED_BATCH: usize = 64;

/// Cap `text` at `MAX_EMBED_CHARS`, backing up to a UTF-8 char boundary.
fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    // Back up to the nearest char boundary
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Embed a batch of texts with the configured provider.
///
/// Every returned vector is checked against `LLM_EMBEDDING_DIM`; a mismatch
/// here fails loudly instead of surfacing later as an opaque index error.
pub async fn embed_batch(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let truncated: Vec<String> = texts
        .iter()
        .map(|t| truncate_for_embedding(t).to_string())
        .collect();

    let embeddings = match config.provider.as_str() {
        "ollama" => embed_ollama(client, config, &truncated).await?,
        "openai" => embed_openai(client, config, &truncated).await?,
        other => bail!("Unknown LLM provider: {other}"),
    };

    if let Some(odd) = embeddings.iter().find(|e| e.len() != config.embedding_dim) {
        bail!(
            "Embedding model '{}' returned {}-dimensional vectors but LLM_EMBEDDING_DIM is {}",
            config.embedding_model,
            odd.len(),
            config.embedding_dim
        );
    }

    Ok(embeddings)
}

/// Embed a single text (the question side of a query).
pub async fn embed_single(
    client: &reqwest::Client,
    config: &LlmConfig,
    text: &str,
) -> Result<Vec<f32>> {
    let results = embed_batch(client, config, &[text.to_string()]).await?;
    results.into_iter().next().context("No embedding returned")
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    /// Server-side truncation for inputs past the model context, instead of
    /// a hard 400.
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn embed_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let url = format!("{}/api/embed", config.base_url.trim_end_matches('/'));
    let mut embeddings = Vec::with_capacity(texts.len());

    for batch in texts.chunks(OLLAMA_EMBED_BATCH) {
        let body = OllamaEmbedRequest {
            model: &config.embedding_model,
            input: batch,
            truncate: true,
        };
        let response = client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to reach Ollama for embeddings")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Ollama embeddings returned {status}: {body}");
        }
        let parsed: OllamaEmbedResponse = response
            .json()
            .await
            .context("Failed to decode Ollama embeddings response")?;
        embeddings.extend(parsed.embeddings);
    }

    Ok(embeddings)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    embedding: Vec<f32>,
}

async fn embed_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let url = format!("{}/v1/embeddings", config.base_url.trim_end_matches('/'));
    let api_key = config.api_key.as_deref().unwrap_or_default();
    let mut embeddings = Vec::with_capacity(texts.len());

    for batch in texts.chunks(OPENAI_EMBED_BATCH) {
        let body = OpenAiEmbedRequest {
            model: &config.embedding_model,
            input: batch,
        };
        let response = client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await
            .context("Failed to reach embedding API")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Embedding API returned {status}: {body}");
        }
        let parsed: OpenAiEmbedResponse = response
            .json()
            .await
            .context("Failed to decode embedding API response")?;
        embeddings.extend(parsed.data.into_iter().map(|d| d.embedding));
    }

    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_leaves_short_text_alone() {
        assert_eq!(truncate_for_embedding("hello"), "hello");
    }

    #[test]
    fn test_truncate_caps_long_text() {
        let text = "x".repeat(MAX_EMBED_CHARS + 500);
        assert_eq!(truncate_for_embedding(&text).len(), MAX_EMBED_CHARS);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        // One leading ASCII char pushes every 3-byte char off the limit
        let text = format!("a{}", "日".repeat(1_500));
        let out = truncate_for_embedding(&text);
        assert!(out.len() <= MAX_EMBED_CHARS);
        assert!(text.is_char_boundary(out.len()));
    }
}
