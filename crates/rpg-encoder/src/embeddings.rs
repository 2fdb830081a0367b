//! Embedding generation for semantic drift and routing.
//!
//! Providers yield fixed-dimension dense vectors. Batch failure falls back
//! to per-text parallel calls so one bad input does not sink the batch.

use anyhow::{Context, Result};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

/// Input truncation horizon: ~4 characters per token.
const MAX_EMBED_TOKENS: usize = 8192;

/// Embedding provider configuration.
#[derive(Debug, Clone)]
pub enum EmbeddingProvider {
    /// OpenAI text-embedding API.
    OpenAI { api_key: String, model: String },
    /// Any OpenAI-compatible embeddings endpoint.
    OpenAICompatible {
        api_key: String,
        base_url: String,
        model: String,
    },
}

/// A single embedding with its dimension.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub dimension: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Embedding generator over a configured provider.
pub struct EmbeddingGenerator {
    provider: EmbeddingProvider,
    http: reqwest::Client,
}

impl EmbeddingGenerator {
    pub fn new(provider: EmbeddingProvider) -> Self {
        Self {
            provider,
            http: reqwest::Client::new(),
        }
    }

    /// Create from environment variables, if an embedding key is present.
    pub fn from_env() -> Result<Self> {
        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            let model = std::env::var("RPG_EMBED_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string());
            return Ok(Self::new(EmbeddingProvider::OpenAI { api_key, model }));
        }
        if let (Ok(api_key), Ok(base_url)) =
            (std::env::var("RPG_API_KEY"), std::env::var("RPG_BASE_URL"))
        {
            let model = std::env::var("RPG_EMBED_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string());
            return Ok(Self::new(EmbeddingProvider::OpenAICompatible {
                api_key,
                base_url,
                model,
            }));
        }
        anyhow::bail!("no embedding provider configured")
    }

    pub fn provider_name(&self) -> &str {
        match &self.provider {
            EmbeddingProvider::OpenAI { .. } => "OpenAI",
            EmbeddingProvider::OpenAICompatible { .. } => "OpenAI-Compatible",
        }
    }

    /// The dimension of vectors produced by the configured model.
    pub fn dimension(&self) -> usize {
        match &self.provider {
            EmbeddingProvider::OpenAI { model, .. }
            | EmbeddingProvider::OpenAICompatible { model, .. } => match model.as_str() {
                "text-embedding-3-large" => 3072,
                _ => 1536,
            },
        }
    }

    /// Embed one text.
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut batch = self.request(vec![preprocess(text)]).await?;
        batch
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedding API returned no vectors"))
    }

    /// Embed a batch of texts. On batch failure, falls back to per-text
    /// parallel calls; texts that still fail yield an error for that slot.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Result<Embedding>>> {
        let inputs: Vec<String> = texts.iter().map(|t| preprocess(t)).collect();
        match self.request(inputs.clone()).await {
            Ok(embeddings) if embeddings.len() == texts.len() => {
                Ok(embeddings.into_iter().map(Ok).collect())
            }
            Ok(_) | Err(_) => {
                tracing::warn!("embedding batch failed, falling back to per-text calls");
                let futures = inputs.iter().map(|text| self.embed(text));
                Ok(join_all(futures).await)
            }
        }
    }

    async fn request(&self, input: Vec<String>) -> Result<Vec<Embedding>> {
        let (url, api_key, model) = match &self.provider {
            EmbeddingProvider::OpenAI { api_key, model } => (
                "https://api.openai.com/v1/embeddings".to_string(),
                api_key,
                model,
            ),
            EmbeddingProvider::OpenAICompatible {
                api_key,
                base_url,
                model,
            } => (
                format!("{}/embeddings", base_url.trim_end_matches('/')),
                api_key,
                model,
            ),
        };

        let req = EmbeddingRequest {
            model: model.clone(),
            input,
        };

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("content-type", "application/json")
            .json(&req)
            .send()
            .await
            .with_context(|| format!("failed to call embeddings API at {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("embeddings API returned {}: {}", status, text);
        }

        let body = resp
            .json::<EmbeddingResponse>()
            .await
            .context("failed to parse embeddings response")?;

        Ok(body
            .data
            .into_iter()
            .map(|d| Embedding {
                dimension: d.embedding.len(),
                vector: d.embedding,
            })
            .collect())
    }
}

/// Truncate input to the model's context horizon (~4 chars per token).
fn preprocess(text: &str) -> String {
    let max_chars = MAX_EMBED_TOKENS * 4;
    if text.len() <= max_chars {
        text.to_string()
    } else {
        let mut end = max_chars;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }
}

/// Cosine similarity of two vectors. Returns 0.0 for mismatched dimensions
/// or zero-magnitude inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
