use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    OpenAI,
    Hashed,
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompletionBackendKind {
    OpenAI,
    Echo,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: EmbeddingBackendKind,
    #[serde(default = "default_completion_backend")]
    pub completion_backend: CompletionBackendKind,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_completion_model")]
    pub completion_model: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
    #[serde(default = "default_chat_max_tokens")]
    pub chat_max_tokens: u32,
    #[serde(default = "default_artifact_max_tokens")]
    pub artifact_max_tokens: u32,
    #[serde(default = "default_artifact_context_chars")]
    pub artifact_context_chars: usize,
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    #[serde(default = "default_provider_max_retries")]
    pub provider_max_retries: usize,
    #[serde(default = "default_upload_max_body_bytes")]
    pub upload_max_body_bytes: usize,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

fn default_embedding_backend() -> EmbeddingBackendKind {
    EmbeddingBackendKind::OpenAI
}

fn default_completion_backend() -> CompletionBackendKind {
    CompletionBackendKind::OpenAI
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimensions() -> u32 {
    1536
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_retrieval_top_k() -> usize {
    4
}

fn default_chat_max_tokens() -> u32 {
    1024
}

fn default_artifact_max_tokens() -> u32 {
    2000
}

fn default_artifact_context_chars() -> usize {
    12_000
}

fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_provider_max_retries() -> usize {
    3
}

fn default_upload_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: default_base_url(),
            data_dir: default_data_dir(),
            http_port: default_http_port(),
            storage: default_storage_kind(),
            embedding_backend: default_embedding_backend(),
            completion_backend: default_completion_backend(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            completion_model: default_completion_model(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            retrieval_top_k: default_retrieval_top_k(),
            chat_max_tokens: default_chat_max_tokens(),
            artifact_max_tokens: default_artifact_max_tokens(),
            artifact_context_chars: default_artifact_context_chars(),
            provider_timeout_secs: default_provider_timeout_secs(),
            provider_max_retries: default_provider_max_retries(),
            upload_max_body_bytes: default_upload_max_body_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_tuning() {
        let config = AppConfig::default();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.artifact_context_chars, 12_000);
        assert_eq!(config.storage, StorageKind::Local);
        assert_eq!(config.embedding_backend, EmbeddingBackendKind::OpenAI);
    }
}
