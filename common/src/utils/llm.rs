use std::{sync::Arc, time::Duration};

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};

use crate::{
    error::AppError,
    utils::config::{AppConfig, CompletionBackendKind},
};

/// Client for the external completion capability.
///
/// The `echo` backend returns the tail of the prompt verbatim; like the
/// hashed embedding backend it keeps the whole pipeline runnable without
/// network access.
#[derive(Clone)]
pub struct CompletionProvider {
    inner: CompletionInner,
}

#[derive(Clone)]
enum CompletionInner {
    OpenAI {
        client: Arc<Client<OpenAIConfig>>,
        model: String,
        timeout: Duration,
        max_retries: usize,
    },
    Echo,
}

impl CompletionProvider {
    pub fn new_openai(
        client: Arc<Client<OpenAIConfig>>,
        model: String,
        timeout: Duration,
        max_retries: usize,
    ) -> Self {
        Self {
            inner: CompletionInner::OpenAI {
                client,
                model,
                timeout,
                max_retries,
            },
        }
    }

    pub fn new_echo() -> Self {
        Self {
            inner: CompletionInner::Echo,
        }
    }

    pub fn from_config(config: &AppConfig, client: Option<Arc<Client<OpenAIConfig>>>) -> Self {
        match config.completion_backend {
            CompletionBackendKind::OpenAI => {
                let client = client.unwrap_or_else(|| {
                    Arc::new(Client::with_config(
                        OpenAIConfig::new()
                            .with_api_key(&config.openai_api_key)
                            .with_api_base(&config.openai_base_url),
                    ))
                });
                Self::new_openai(
                    client,
                    config.completion_model.clone(),
                    Duration::from_secs(config.provider_timeout_secs),
                    config.provider_max_retries,
                )
            }
            CompletionBackendKind::Echo => Self::new_echo(),
        }
    }

    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            CompletionInner::OpenAI { .. } => "openai",
            CompletionInner::Echo => "echo",
        }
    }

    pub async fn complete(
        &self,
        system_prompt: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, AppError> {
        match &self.inner {
            CompletionInner::Echo => Ok(echo_completion(prompt, max_tokens)),
            CompletionInner::OpenAI {
                client,
                model,
                timeout,
                max_retries,
            } => {
                let retry_strategy = ExponentialBackoff::from_millis(100)
                    .map(jitter)
                    .take(*max_retries);

                Retry::spawn(retry_strategy, || {
                    request_openai_completion(
                        client,
                        model,
                        *timeout,
                        system_prompt,
                        prompt,
                        max_tokens,
                    )
                })
                .await
            }
        }
    }
}

async fn request_openai_completion(
    client: &Client<OpenAIConfig>,
    model: &str,
    timeout: Duration,
    system_prompt: &str,
    prompt: &str,
    max_tokens: u32,
) -> Result<String, AppError> {
    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .max_tokens(max_tokens)
        .messages([
            ChatCompletionRequestSystemMessage::from(system_prompt.to_owned()).into(),
            ChatCompletionRequestUserMessage::from(prompt.to_owned()).into(),
        ])
        .build()
        .map_err(|e| AppError::CompletionProvider(e.to_string()))?;

    let response = tokio::time::timeout(timeout, client.chat().create(request))
        .await
        .map_err(|_| {
            AppError::CompletionProvider(format!(
                "completion request timed out after {}s",
                timeout.as_secs()
            ))
        })?
        .map_err(|e| AppError::CompletionProvider(e.to_string()))?;

    response
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .map(|content| content.trim().to_owned())
        .ok_or_else(|| {
            AppError::CompletionProvider("no content found in completion response".into())
        })
}

// Roughly four characters per token keeps the echo output within the same
// budget a real model would honor.
fn echo_completion(prompt: &str, max_tokens: u32) -> String {
    let budget = (max_tokens as usize).saturating_mul(4);
    let text = prompt.trim();
    if text.chars().count() <= budget {
        return text.to_owned();
    }
    let skip = text.chars().count().saturating_sub(budget);
    text.chars().skip(skip).collect()
}
