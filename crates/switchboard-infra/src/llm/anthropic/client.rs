//! AnthropicProvider -- concrete [`LlmProvider`] implementation for Anthropic Claude.
//!
//! Sends requests to the Anthropic Messages API (`/v1/messages`) with the
//! `x-api-key` and `anthropic-version` headers, in both buffered and
//! streaming modes.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use switchboard_core::llm::provider::{ChunkStream, LlmProvider};
use switchboard_types::llm::{
    CompletionRequest, CompletionResponse, InvocationError, ProviderConfig,
};

use super::streaming::create_anthropic_stream;
use super::types::{AnthropicRequest, AnthropicResponse};
use crate::llm::http::{check_status, read_json, transport_error};

/// The Anthropic API version header value.
pub const API_VERSION: &str = "2023-06-01";

/// Build the Messages endpoint for a base URL.
pub fn messages_url(base_url: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    if base.ends_with("/messages") {
        base.to_string()
    } else if base.contains("/v1") {
        format!("{base}/messages")
    } else {
        format!("{base}/v1/messages")
    }
}

pub(crate) struct MessagesTarget {
    client: reqwest::Client,
    api_key: SecretString,
    url: String,
}

impl MessagesTarget {
    pub(crate) async fn post(&self, body: &AnthropicRequest) -> Result<reqwest::Response, InvocationError> {
        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response).await
    }
}

/// Anthropic Claude LLM provider.
///
/// Intentionally does NOT derive Debug.
pub struct AnthropicProvider {
    target: Arc<MessagesTarget>,
}

impl AnthropicProvider {
    pub fn new(client: reqwest::Client, config: &ProviderConfig) -> Self {
        let base_url = config
            .effective_base_url()
            .unwrap_or("https://api.anthropic.com");

        Self {
            target: Arc::new(MessagesTarget {
                client,
                api_key: SecretString::from(config.api_key.expose_secret().to_owned()),
                url: messages_url(base_url),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.target.url
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, InvocationError> {
        let body = AnthropicRequest::from_completion(request, false);
        let response = self.target.post(&body).await?;
        let envelope: AnthropicResponse = read_json(response).await?;

        let blocks = envelope.content.ok_or_else(|| InvocationError::MalformedEnvelope {
            detail: "missing content".to_string(),
        })?;
        let block = blocks
            .into_iter()
            .next()
            .ok_or_else(|| InvocationError::EmptyResponse {
                field: "content".to_string(),
            })?;

        if let Some(kind) = block.block_type.as_deref()
            && kind != "text"
        {
            tracing::debug!(block_type = kind, "First content block is not text");
        }

        let content = block.text.ok_or_else(|| InvocationError::MalformedEnvelope {
            detail: "missing content[0].text".to_string(),
        })?;

        Ok(CompletionResponse {
            content,
            model: envelope.model.unwrap_or(body.model),
        })
    }

    fn stream(&self, request: CompletionRequest) -> ChunkStream {
        let body = AnthropicRequest::from_completion(&request, true);
        create_anthropic_stream(Arc::clone(&self.target), body)
    }
}
