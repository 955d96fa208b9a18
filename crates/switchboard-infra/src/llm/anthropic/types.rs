//! Anthropic Messages API types.
//!
//! These are Anthropic-specific request/response structures used for HTTP
//! communication with the Messages API. They are NOT the provider-neutral
//! types from switchboard-types.

use serde::{Deserialize, Serialize};

use switchboard_types::llm::{CompletionRequest, InvocationError};

/// Request body for the Anthropic Messages API.
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// A single message in an Anthropic conversation.
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: String,
}

impl AnthropicRequest {
    pub fn from_completion(request: &CompletionRequest, stream: bool) -> Self {
        let messages = request
            .messages
            .iter()
            .map(|m| AnthropicMessage {
                role: m.role.to_string(),
                content: m.content.clone(),
            })
            .collect();

        Self {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            messages,
            system: request.system.clone(),
            stream,
            temperature: request.temperature,
        }
    }
}

/// Non-streaming response. Missing fields are reported by name.
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub content: Option<Vec<ContentBlock>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub block_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Payload of an in-band `{"type":"error"}` stream event.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamErrorPayload {
    pub error: StreamErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamErrorDetail {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub message: String,
}

impl StreamErrorDetail {
    /// Classify by Anthropic error type, using the status it documents.
    pub fn into_error(self) -> InvocationError {
        let status = match self.error_type.as_str() {
            "overloaded_error" => 529,
            "rate_limit_error" => 429,
            "api_error" => 500,
            "authentication_error" => 401,
            "permission_error" => 403,
            "invalid_request_error" => 400,
            _ => {
                return InvocationError::Transport {
                    message: format!("stream error ({}): {}", self.error_type, self.message),
                };
            }
        };
        InvocationError::from_status(status, &self.message)
    }
}
