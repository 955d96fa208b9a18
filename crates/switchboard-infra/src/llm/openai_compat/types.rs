//! Chat-completions wire types.
//!
//! Only the fields Switchboard reads are modelled. Every response field is
//! optional so a partial envelope is reported by name instead of failing
//! deserialization as a whole.

use serde::{Deserialize, Serialize};

use switchboard_types::llm::CompletionRequest;

/// Request body for `POST .../chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatRequest {
    /// The system instruction, when present, becomes the first message.
    pub fn from_completion(request: &CompletionRequest, stream: bool) -> Self {
        let system = request.system.iter().map(|content| ChatMessage {
            role: "system".to_string(),
            content: content.clone(),
        });
        let conversation = request.messages.iter().map(|m| ChatMessage {
            role: m.role.to_string(),
            content: m.content.clone(),
        });

        Self {
            model: request.model.clone(),
            messages: system.chain(conversation).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}
