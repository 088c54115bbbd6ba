use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
    time::Duration,
};

use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};

use crate::{
    error::AppError,
    utils::config::{AppConfig, EmbeddingBackendKind},
};

/// Client for the external embedding capability.
///
/// The `openai` backend talks to the configured API with a per-call timeout
/// and bounded retry. The `hashed` backend is a deterministic, network-free
/// bag-of-words projection used by tests and offline runs.
#[derive(Clone)]
pub struct EmbeddingProvider {
    inner: EmbeddingInner,
}

#[derive(Clone)]
enum EmbeddingInner {
    OpenAI {
        client: Arc<Client<OpenAIConfig>>,
        model: String,
        dimensions: u32,
        timeout: Duration,
        max_retries: usize,
    },
    Hashed {
        dimension: usize,
    },
}

impl EmbeddingProvider {
    pub fn new_openai(
        client: Arc<Client<OpenAIConfig>>,
        model: String,
        dimensions: u32,
        timeout: Duration,
        max_retries: usize,
    ) -> Self {
        Self {
            inner: EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
                timeout,
                max_retries,
            },
        }
    }

    pub fn new_hashed(dimension: usize) -> Self {
        Self {
            inner: EmbeddingInner::Hashed {
                dimension: dimension.max(1),
            },
        }
    }

    pub fn from_config(config: &AppConfig, client: Option<Arc<Client<OpenAIConfig>>>) -> Self {
        match config.embedding_backend {
            EmbeddingBackendKind::OpenAI => {
                let client = client.unwrap_or_else(|| {
                    Arc::new(Client::with_config(
                        OpenAIConfig::new()
                            .with_api_key(&config.openai_api_key)
                            .with_api_base(&config.openai_base_url),
                    ))
                });
                Self::new_openai(
                    client,
                    config.embedding_model.clone(),
                    config.embedding_dimensions,
                    Duration::from_secs(config.provider_timeout_secs),
                    config.provider_max_retries,
                )
            }
            EmbeddingBackendKind::Hashed => {
                Self::new_hashed(config.embedding_dimensions as usize)
            }
        }
    }

    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            EmbeddingInner::OpenAI { .. } => "openai",
            EmbeddingInner::Hashed { .. } => "hashed",
        }
    }

    pub fn dimension(&self) -> usize {
        match &self.inner {
            EmbeddingInner::OpenAI { dimensions, .. } => *dimensions as usize,
            EmbeddingInner::Hashed { dimension } => *dimension,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let mut embeddings = self.embed_batch(vec![text.to_owned()]).await?;
        embeddings.pop().ok_or_else(|| {
            AppError::EmbeddingProvider("provider returned no embedding for input".into())
        })
    }

    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        match &self.inner {
            EmbeddingInner::Hashed { dimension } => Ok(texts
                .iter()
                .map(|text| hashed_embedding(text, *dimension))
                .collect()),
            EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
                timeout,
                max_retries,
            } => {
                let retry_strategy = ExponentialBackoff::from_millis(100)
                    .map(jitter)
                    .take(*max_retries);

                let embeddings = Retry::spawn(retry_strategy, || {
                    request_openai_embeddings(client, model, *dimensions, *timeout, &texts)
                })
                .await?;

                if embeddings.len() != texts.len() {
                    return Err(AppError::EmbeddingProvider(format!(
                        "provider returned {} embeddings for {} inputs",
                        embeddings.len(),
                        texts.len()
                    )));
                }

                Ok(embeddings)
            }
        }
    }
}

async fn request_openai_embeddings(
    client: &Client<OpenAIConfig>,
    model: &str,
    dimensions: u32,
    timeout: Duration,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, AppError> {
    let request = CreateEmbeddingRequestArgs::default()
        .model(model)
        .dimensions(dimensions)
        .input(texts.to_vec())
        .build()
        .map_err(|e| AppError::EmbeddingProvider(e.to_string()))?;

    let response = tokio::time::timeout(timeout, client.embeddings().create(request))
        .await
        .map_err(|_| {
            AppError::EmbeddingProvider(format!(
                "embedding request timed out after {}s",
                timeout.as_secs()
            ))
        })?
        .map_err(|e| AppError::EmbeddingProvider(e.to_string()))?;

    Ok(response
        .data
        .into_iter()
        .map(|item| item.embedding)
        .collect())
}

// Helper functions for hashed embeddings
fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dim = dimension.max(1);
    let mut vector = vec![0.0f32; dim];
    if text.is_empty() {
        return vector;
    }

    for token in tokens(text) {
        let idx = bucket(&token, dim);
        vector[idx] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }

    vector
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_lowercase())
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % dimension
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashed_embeddings_are_deterministic() {
        let provider = EmbeddingProvider::new_hashed(64);
        let first = provider.embed("the cell membrane").await.unwrap();
        let second = provider.embed("the cell membrane").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[tokio::test]
    async fn hashed_embeddings_are_normalized() {
        let provider = EmbeddingProvider::new_hashed(32);
        let vector = provider.embed("mitochondria powerhouse").await.unwrap();
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn batch_matches_single_embedding() {
        let provider = EmbeddingProvider::new_hashed(32);
        let single = provider.embed("ribosome").await.unwrap();
        let batch = provider
            .embed_batch(vec!["ribosome".into(), "nucleus".into()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], single);
        assert_ne!(batch[0], batch[1]);
    }

    #[tokio::test]
    async fn empty_batch_short_circuits() {
        let provider = EmbeddingProvider::new_hashed(16);
        let batch = provider.embed_batch(Vec::new()).await.unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let vector = hashed_embedding("", 8);
        assert!(vector.iter().all(|v| *v == 0.0));
    }
}
