use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// A text-to-vector embedding backend for the query side of `search_mcps`.
/// The offline indexer (out of scope) is what embeds catalog entries; this
/// trait only covers embedding the live query string.
#[async_trait::async_trait]
pub trait EmbeddingsProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// `OPENAI_API_KEY`-gated OpenAI embeddings client. Absence of the env var
/// means no provider is configured at all — callers check that before
/// constructing one and fall back to keyword search instead.
pub struct OpenAiEmbeddings {
    api_key: String,
    client: reqwest::Client,
    model: String,
}

const DEFAULT_MODEL: &str = "text-embedding-ada-002";
const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

impl OpenAiEmbeddings {
    /// Returns `None` when `OPENAI_API_KEY` isn't set, matching §6's
    /// "absence forces the text-fallback branch".
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())?;
        Some(Self {
            api_key,
            client: reqwest::Client::new(),
            model: DEFAULT_MODEL.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsDatum {
    embedding: Vec<f32>,
}

#[async_trait::async_trait]
impl EmbeddingsProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(EMBEDDINGS_URL)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "input": text }))
            .send()
            .await
            .context("embeddings request failed")?;

        if !response.status().is_success() {
            bail!("embeddings API returned {}", response.status());
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .context("failed to parse embeddings response")?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|datum| datum.embedding)
            .ok_or_else(|| anyhow::anyhow!("embeddings response contained no vectors"))
    }
}
