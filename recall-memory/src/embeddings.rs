//! Embedding providers.
//!
//! Text is embedded with an [`EmbeddingIntent`]: stored turns use the
//! document form, lookups use the query form. Asymmetric models such as
//! nomic-embed expect a different textual prefix for each.

use crate::error::EmbeddingError;
use async_trait::async_trait;
use recall_common::config::EmbeddingConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// How a piece of text is going to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbeddingIntent {
    /// A lookup string
    Query,
    /// A stored turn
    Document,
}

impl EmbeddingIntent {
    /// Default prefix convention for this intent.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Query => "search_query: ",
            Self::Document => "search_document: ",
        }
    }
}

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name (e.g., "openai", "noop")
    fn name(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts, one vector per input in input order.
    async fn embed(
        &self,
        texts: &[&str],
        intent: EmbeddingIntent,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    async fn embed_one(
        &self,
        text: &str,
        intent: EmbeddingIntent,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(&[text], intent).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Parse("no embedding returned".into()))
    }
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible provider
// ─────────────────────────────────────────────────────────────────────────────

/// Client for any server exposing the OpenAI `/embeddings` API
/// (llama.cpp server, Ollama, OpenAI itself).
pub struct OpenAiEmbedding {
    base_url: String,
    model: String,
    api_key: Option<String>,
    dims: usize,
    query_prefix: String,
    document_prefix: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl OpenAiEmbedding {
    /// Create a provider from config, expecting vectors of `dims` components.
    pub fn new(config: &EmbeddingConfig, dims: usize) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            dims,
            query_prefix: config.query_prefix.clone(),
            document_prefix: config.document_prefix.clone(),
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs.max(1)))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn prefix(&self, intent: EmbeddingIntent) -> &str {
        match intent {
            EmbeddingIntent::Query => &self.query_prefix,
            EmbeddingIntent::Document => &self.document_prefix,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(
        &self,
        texts: &[&str],
        intent: EmbeddingIntent,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prefix = self.prefix(intent);
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts.iter().map(|t| format!("{prefix}{t}")).collect(),
        };

        let url = format!("{}/embeddings", self.base_url);
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Parse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::Parse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        parsed
            .data
            .into_iter()
            .map(|d| {
                let mut v = d.embedding;
                if v.len() != self.dims {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: self.dims,
                        actual: v.len(),
                    });
                }
                normalize(&mut v);
                Ok(v)
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Noop provider
// ─────────────────────────────────────────────────────────────────────────────

/// Provider used when embeddings are switched off. Every call fails, so the
/// store keeps working as recency-only memory.
pub struct NoopEmbedding {
    dims: usize,
}

impl NoopEmbedding {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingProvider for NoopEmbedding {
    fn name(&self) -> &str {
        "noop"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(
        &self,
        _texts: &[&str],
        _intent: EmbeddingIntent,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }
}

/// Build the provider named in config.
pub fn create_embedding_provider(
    config: &EmbeddingConfig,
    dimension: usize,
) -> Arc<dyn EmbeddingProvider> {
    match config.provider.as_str() {
        "openai" => Arc::new(OpenAiEmbedding::new(config, dimension)),
        "noop" => Arc::new(NoopEmbedding::new(dimension)),
        other => {
            tracing::warn!(provider = %other, "Unknown embedding provider, embeddings disabled");
            Arc::new(NoopEmbedding::new(dimension))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> EmbeddingConfig {
        EmbeddingConfig {
            base_url: format!("{}/v1/", server.uri()),
            model: "test-embed".into(),
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn intent_prefixes() {
        assert_eq!(EmbeddingIntent::Query.prefix(), "search_query: ");
        assert_eq!(EmbeddingIntent::Document.prefix(), "search_document: ");
    }

    #[test]
    fn normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn openai_embeds_with_query_prefix_and_normalizes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_partial_json(json!({
                "model": "test-embed",
                "input": ["search_query: outdoor activities"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "embedding": [0.0, 2.0, 0.0], "index": 0 }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiEmbedding::new(&config_for(&server), 3);
        let v = provider
            .embed_one("outdoor activities", EmbeddingIntent::Query)
            .await
            .unwrap();
        assert_eq!(v, vec![0.0, 1.0, 0.0]);
    }

    #[tokio::test]
    async fn openai_uses_document_prefix_and_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "input": ["search_document: I love hiking"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "embedding": [1.0, 0.0, 0.0], "index": 0 }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.api_key = Some("sk-test".into());
        let provider = OpenAiEmbedding::new(&config, 3);
        assert!(provider
            .embed_one("I love hiking", EmbeddingIntent::Document)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn openai_orders_batch_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "embedding": [0.0, 1.0], "index": 1 },
                    { "embedding": [1.0, 0.0], "index": 0 }
                ]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiEmbedding::new(&config_for(&server), 2);
        let vs = provider
            .embed(&["first", "second"], EmbeddingIntent::Document)
            .await
            .unwrap();
        assert_eq!(vs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn openai_rejects_wrong_dimension() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "embedding": [1.0, 0.0], "index": 0 }]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiEmbedding::new(&config_for(&server), 768);
        let err = provider
            .embed_one("hello", EmbeddingIntent::Query)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch { expected: 768, actual: 2 }
        ));
    }

    #[tokio::test]
    async fn openai_maps_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
            .mount(&server)
            .await;

        let provider = OpenAiEmbedding::new(&config_for(&server), 3);
        let err = provider
            .embed_one("hello", EmbeddingIntent::Query)
            .await
            .unwrap_err();
        match err {
            EmbeddingError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "loading model");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn noop_always_disabled() {
        let provider = NoopEmbedding::new(768);
        assert_eq!(provider.dimensions(), 768);
        assert!(matches!(
            provider.embed_one("x", EmbeddingIntent::Document).await,
            Err(EmbeddingError::Disabled)
        ));
    }

    #[test]
    fn factory_selects_provider() {
        let mut config = EmbeddingConfig::default();
        assert_eq!(create_embedding_provider(&config, 768).name(), "openai");

        config.provider = "noop".into();
        assert_eq!(create_embedding_provider(&config, 768).name(), "noop");

        config.provider = "mystery".into();
        assert_eq!(create_embedding_provider(&config, 768).name(), "noop");
    }
}
