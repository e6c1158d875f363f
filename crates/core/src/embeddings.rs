use crate::error::IngestError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1_536;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Text-to-vector seam. One batched round trip per call; output length and
/// order must match the input. Implementations must return an empty list
/// for an empty input without touching the network.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError>;
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout: Duration,
}

impl EmbeddingConfig {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Reads `EMBEDDINGS_ENDPOINT`, `EMBEDDINGS_API_KEY`, `EMBEDDINGS_MODEL`
    /// and `EMBEDDINGS_DIMENSIONS` from the environment.
    pub fn from_env() -> Result<Self, IngestError> {
        let endpoint = require_env("EMBEDDINGS_ENDPOINT")?;
        let api_key = require_env("EMBEDDINGS_API_KEY")?;
        let model = require_env("EMBEDDINGS_MODEL")?;
        let dimensions = std::env::var("EMBEDDINGS_DIMENSIONS")
            .ok()
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_EMBEDDING_DIMENSIONS);

        Ok(Self::new(endpoint, api_key, model, dimensions))
    }
}

fn require_env(name: &str) -> Result<String, IngestError> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| IngestError::InvalidArgument(format!("{name} is not set")))
}

/// Client for an OpenAI-style `/embeddings` endpoint with a fixed model
/// identifier. All failures are fatal for the batch; there is no partial
/// output.
pub struct HttpEmbedder {
    config: EmbeddingConfig,
    client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| IngestError::Embedding(error.to_string()))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.model,
                "input": texts,
            }))
            .send()
            .await
            .map_err(|error| IngestError::Embedding(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(IngestError::Embedding(format!("{status}: {details}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|error| IngestError::Embedding(error.to_string()))?;

        let vectors = parse_embedding_response(&payload)?;

        if vectors.len() != texts.len() {
            return Err(IngestError::Embedding(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        for vector in &vectors {
            if vector.len() != self.config.dimensions {
                return Err(IngestError::Embedding(format!(
                    "vector dimension {} does not match configured {}",
                    vector.len(),
                    self.config.dimensions
                )));
            }
        }

        Ok(vectors)
    }
}

// Rows carry an `index` field; sort by it so output order matches input
// order regardless of how the service ordered the response.
fn parse_embedding_response(payload: &Value) -> Result<Vec<Vec<f32>>, IngestError> {
    let data = payload
        .pointer("/data")
        .and_then(Value::as_array)
        .ok_or_else(|| IngestError::Embedding("response has no data array".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .pointer("/index")
            .and_then(Value::as_u64)
            .unwrap_or(position as u64);

        let embedding = item
            .pointer("/embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| IngestError::Embedding("row has no embedding array".to_string()))?
            .iter()
            .map(|value| value.as_f64().unwrap_or(0.0) as f32)
            .collect::<Vec<f32>>();

        indexed.push((index, embedding));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, embedding)| embedding).collect())
}
