//! OpenAI-compatible LLM provider implementation.
//!
//! A single [`OpenAiCompatibleProvider`] serves OpenAI, DeepSeek, ZhipuAI,
//! Gemini's OpenAI endpoint and any generic compatible gateway. They differ
//! only in base URL, default model and endpoint layout.

pub mod endpoint;
pub mod streaming;
pub mod types;

use std::sync::Arc;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};

use switchboard_core::llm::provider::{ChunkStream, LlmProvider};
use switchboard_types::llm::{
    CompletionRequest, CompletionResponse, InvocationError, ProviderConfig, ProviderKind,
};

use super::http::{check_status, read_json, transport_error};
use self::types::{ChatRequest, ChatResponse};

/// Where and how to send chat-completions requests.
///
/// Shared with spawned streams, so it lives behind an `Arc`.
pub(crate) struct ChatTarget {
    client: reqwest::Client,
    api_key: SecretString,
    endpoints: Vec<String>,
}

impl ChatTarget {
    /// POST `body`, moving to the next endpoint only on a 404.
    pub(crate) async fn post(&self, body: &ChatRequest) -> Result<reqwest::Response, InvocationError> {
        let mut endpoints = self.endpoints.iter().peekable();
        while let Some(endpoint) = endpoints.next() {
            let response = self
                .client
                .post(endpoint)
                .bearer_auth(self.api_key.expose_secret())
                .json(body)
                .send()
                .await
                .map_err(transport_error)?;

            if response.status() == StatusCode::NOT_FOUND && endpoints.peek().is_some() {
                tracing::debug!(endpoint = %endpoint, "Endpoint not found, trying alternate path");
                continue;
            }
            return check_status(response).await;
        }

        Err(InvocationError::Transport {
            message: "no chat-completions endpoint to call".to_string(),
        })
    }
}

/// Unified provider for any OpenAI-compatible API.
///
/// Does NOT derive Debug; the API key must never be printed.
pub struct OpenAiCompatibleProvider {
    kind: ProviderKind,
    target: Arc<ChatTarget>,
}

impl OpenAiCompatibleProvider {
    /// Create a provider for `config`, sharing `client`.
    ///
    /// Fails when the configuration has no usable base URL, which only
    /// happens for generic backends.
    pub fn new(client: reqwest::Client, config: &ProviderConfig) -> Result<Self, InvocationError> {
        let base_url = config
            .effective_base_url()
            .ok_or_else(|| InvocationError::ConfigNotFound {
                reference: format!("base URL for configuration '{}'", config.id),
            })?;

        Ok(Self {
            kind: config.kind.clone(),
            target: Arc::new(ChatTarget {
                client,
                api_key: SecretString::from(config.api_key.expose_secret().to_owned()),
                endpoints: endpoint::chat_endpoints(&config.kind, base_url),
            }),
        })
    }

    /// The endpoints this provider calls, in order.
    pub fn endpoints(&self) -> &[String] {
        &self.target.endpoints
    }
}

impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, InvocationError> {
        let body = ChatRequest::from_completion(request, false);
        let response = self.target.post(&body).await?;
        let envelope: ChatResponse = read_json(response).await?;

        let choices = envelope.choices.ok_or_else(|| InvocationError::MalformedEnvelope {
            detail: "missing choices".to_string(),
        })?;
        let choice = choices
            .into_iter()
            .next()
            .ok_or_else(|| InvocationError::EmptyResponse {
                field: "choices".to_string(),
            })?;

        let content = choice
            .message
            .and_then(|message| message.content)
            .ok_or_else(|| InvocationError::MalformedEnvelope {
                detail: "missing choices[0].message.content".to_string(),
            })?;

        Ok(CompletionResponse {
            content,
            model: envelope.model.unwrap_or(body.model),
        })
    }

    fn stream(&self, request: CompletionRequest) -> ChunkStream {
        let body = ChatRequest::from_completion(&request, true);
        streaming::chat_stream(Arc::clone(&self.target), body)
    }
}
