pub mod artifacts;
pub mod cache;
pub mod chat;
pub mod index;

/// Tunables shared by the query-time pipeline.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the prompt for one question.
    pub top_k: usize,
    /// Completion budget for chat answers.
    pub chat_max_tokens: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            chat_max_tokens: 1024,
        }
    }
}

impl RetrievalConfig {
    pub fn from_app_config(config: &common::utils::config::AppConfig) -> Self {
        Self {
            top_k: config.retrieval_top_k,
            chat_max_tokens: config.chat_max_tokens,
        }
    }
}
