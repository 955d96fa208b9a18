//! LLM request/response types for Switchboard.
//!
//! These types model the data shapes shared by every backend: provider
//! configuration, provider-neutral completion requests, streamed chunks,
//! invocation results, and the invocation error taxonomy.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Maximum number of upstream body characters kept in an error message.
const ERROR_BODY_LIMIT: usize = 200;

/// Role of a message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A single message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Provider-neutral request handed to a backend.
///
/// Temperature and max tokens are already clamped by the time a backend
/// sees this value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub stream: bool,
}

/// Full (non-streamed) response text from a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
}

/// A unit of incrementally produced model output.
///
/// Concatenating every chunk of one call reconstructs the full response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub text: String,
}

impl StreamChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

// ---------------------------------------------------------------------------
// Provider kinds
// ---------------------------------------------------------------------------

/// Wire protocol family spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `POST .../chat/completions` with a bearer token.
    OpenAiCompatible,
    /// `POST /v1/messages` with `x-api-key` and a version header.
    Anthropic,
}

/// Which backend a configuration targets.
///
/// Any name that is not one of the well-known kinds is kept verbatim and
/// treated as a generic OpenAI-compatible backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProviderKind {
    ZhipuAi,
    OpenAi,
    Gemini,
    Anthropic,
    DeepSeek,
    Compatible(String),
}

impl ProviderKind {
    pub fn as_str(&self) -> &str {
        match self {
            ProviderKind::ZhipuAi => "zhipuai",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Compatible(name) => name,
        }
    }

    pub fn wire_format(&self) -> WireFormat {
        match self {
            ProviderKind::Anthropic => WireFormat::Anthropic,
            _ => WireFormat::OpenAiCompatible,
        }
    }

    /// Base URL used when a configuration leaves it blank.
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::ZhipuAi => Some("https://open.bigmodel.cn/api/paas/v4"),
            ProviderKind::OpenAi => Some("https://api.openai.com/v1"),
            ProviderKind::Gemini => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
            ProviderKind::Anthropic => Some("https://api.anthropic.com"),
            ProviderKind::DeepSeek => Some("https://api.deepseek.com/v1"),
            ProviderKind::Compatible(_) => None,
        }
    }

    /// Model used when a configuration leaves it blank.
    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            ProviderKind::ZhipuAi => Some("glm-4"),
            ProviderKind::OpenAi => Some("gpt-4"),
            ProviderKind::Gemini => Some("gemini-2.5-flash"),
            ProviderKind::Anthropic => Some("claude-3-sonnet-20240229"),
            ProviderKind::DeepSeek => Some("deepseek-chat"),
            ProviderKind::Compatible(_) => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "" => Err("provider kind must not be empty".to_string()),
            "zhipuai" | "zhipu" | "glm" => Ok(ProviderKind::ZhipuAi),
            "openai" => Ok(ProviderKind::OpenAi),
            "gemini" => Ok(ProviderKind::Gemini),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "deepseek" => Ok(ProviderKind::DeepSeek),
            _ => Ok(ProviderKind::Compatible(normalized)),
        }
    }
}

impl TryFrom<String> for ProviderKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProviderKind> for String {
    fn from(kind: ProviderKind) -> Self {
        kind.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// ProviderConfig
// ---------------------------------------------------------------------------

/// Credentials and model parameters for one backend.
///
/// Read-only once resolved. The API key is held as a [`SecretString`] and
/// never appears in `Debug` output.
#[derive(Debug)]
pub struct ProviderConfig {
    /// Store identifier of this configuration.
    pub id: String,
    pub kind: ProviderKind,
    /// Empty means "use the kind's default".
    pub base_url: String,
    pub api_key: SecretString,
    /// Empty means "use the kind's default".
    pub model_name: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl ProviderConfig {
    /// Create a configuration with the kind's default base URL and model.
    pub fn new(id: impl Into<String>, kind: ProviderKind, api_key: SecretString) -> Self {
        let base_url = kind.default_base_url().unwrap_or_default().to_string();
        let model_name = kind.default_model().unwrap_or_default().to_string();
        Self {
            id: id.into(),
            kind,
            base_url,
            api_key,
            model_name,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// True when the API key is non-blank.
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().trim().is_empty()
    }

    /// The configured base URL, or the kind's default when blank.
    pub fn effective_base_url(&self) -> Option<&str> {
        let trimmed = self.base_url.trim();
        if trimmed.is_empty() {
            self.kind.default_base_url()
        } else {
            Some(trimmed)
        }
    }

    /// The configured model, or the kind's default when blank.
    pub fn effective_model(&self) -> &str {
        let trimmed = self.model_name.trim();
        if trimmed.is_empty() {
            self.kind.default_model().unwrap_or("default-model")
        } else {
            trimmed
        }
    }
}

impl Clone for ProviderConfig {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            kind: self.kind.clone(),
            base_url: self.base_url.clone(),
            api_key: SecretString::from(self.api_key.expose_secret().to_owned()),
            model_name: self.model_name.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a single invocation (or a whole fallback run) did not produce content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvocationError {
    #[error("configuration not found: {reference}")]
    ConfigNotFound { reference: String },

    #[error("authentication failure (HTTP {status}): {message}")]
    AuthenticationFailure { status: u16, message: String },

    #[error("rate limited or server error (HTTP {status}): {message}")]
    RateLimitedOrServerError { status: u16, message: String },

    #[error("timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("empty response: no {field} returned")]
    EmptyResponse { field: String },

    #[error("malformed response envelope: {detail}")]
    MalformedEnvelope { detail: String },

    #[error("structured extraction failed: {reason}")]
    ExtractionFailed { reason: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("invocation cancelled")]
    Cancelled,

    #[error(
        "All AI providers failed. Please check your AI model configurations and try again.{}",
        failure_summary(.failures)
    )]
    Exhausted {
        attempts: u32,
        /// One provider-attributed message per backend that was tried.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        failures: Vec<String>,
    },
}

fn failure_summary(failures: &[String]) -> String {
    if failures.is_empty() {
        String::new()
    } else {
        format!(" Tried: {}", failures.join("; "))
    }
}

impl InvocationError {
    /// Errors worth retrying against the same backend.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InvocationError::RateLimitedOrServerError { .. }
                | InvocationError::Timeout { .. }
                | InvocationError::Transport { .. }
        )
    }

    /// Deadline-exceeded error, rounding partial seconds up.
    pub fn timeout(deadline: Duration) -> Self {
        let mut seconds = deadline.as_secs();
        if deadline.subsec_nanos() > 0 {
            seconds += 1;
        }
        InvocationError::Timeout { seconds }
    }

    /// Classify a non-2xx HTTP status and its (possibly long) body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = truncate_body(body);
        match status {
            429 | 500..=599 => InvocationError::RateLimitedOrServerError { status, message },
            400..=499 => InvocationError::AuthenticationFailure { status, message },
            _ => InvocationError::MalformedEnvelope {
                detail: format!("unexpected HTTP status {status}: {message}"),
            },
        }
    }
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= ERROR_BODY_LIMIT {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(ERROR_BODY_LIMIT).collect();
    cut.push_str("...");
    cut
}

// ---------------------------------------------------------------------------
// InvocationResult
// ---------------------------------------------------------------------------

/// Label used for the provider/model fields of an exhausted fallback run.
pub const FALLBACK_LABEL: &str = "fallback";

/// Outcome of one invocation, or of a full fallback run.
///
/// `outcome` carries either the response text or the typed failure, so a
/// failed result can never also carry content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub provider: String,
    pub model_name: String,
    pub model_id: String,
    pub outcome: Result<String, InvocationError>,
    pub elapsed_ms: u64,
    /// Set when the answer came from a backend other than the one asked for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover_warning: Option<String>,
}

impl InvocationResult {
    pub fn succeeded(config: &ProviderConfig, content: String, elapsed: Duration) -> Self {
        Self::from_config(config, Ok(content), elapsed)
    }

    pub fn failed(config: &ProviderConfig, error: InvocationError, elapsed: Duration) -> Self {
        Self::from_config(config, Err(error), elapsed)
    }

    /// Terminal result once every fallback state has been tried.
    pub fn exhausted(attempts: u32, elapsed: Duration) -> Self {
        Self::exhausted_after(attempts, Vec::new(), elapsed)
    }

    /// Like [`InvocationResult::exhausted`], keeping why each backend failed.
    pub fn exhausted_after(attempts: u32, failures: Vec<String>, elapsed: Duration) -> Self {
        Self {
            provider: FALLBACK_LABEL.to_string(),
            model_name: FALLBACK_LABEL.to_string(),
            model_id: FALLBACK_LABEL.to_string(),
            outcome: Err(InvocationError::Exhausted { attempts, failures }),
            elapsed_ms: elapsed.as_millis() as u64,
            failover_warning: None,
        }
    }

    fn from_config(
        config: &ProviderConfig,
        outcome: Result<String, InvocationError>,
        elapsed: Duration,
    ) -> Self {
        Self {
            provider: config.kind.to_string(),
            model_name: config.effective_model().to_string(),
            model_id: config.id.clone(),
            outcome,
            elapsed_ms: elapsed.as_millis() as u64,
            failover_warning: None,
        }
    }

    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn content(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }

    pub fn error(&self) -> Option<&InvocationError> {
        self.outcome.as_ref().err()
    }

    /// Human-readable, provider-attributed failure message.
    pub fn error_message(&self) -> Option<String> {
        self.error().map(|err| match err {
            InvocationError::Exhausted { .. } => err.to_string(),
            _ => format!("{} ({}): {err}", self.provider, self.model_name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: ProviderKind) -> ProviderConfig {
        ProviderConfig::new("cfg-1", kind, SecretString::from("sk-test-not-real"))
    }

    #[test]
    fn test_message_role_roundtrip() {
        for role in [MessageRole::System, MessageRole::User, MessageRole::Assistant] {
            let s = role.to_string();
            let parsed: MessageRole = s.parse().unwrap();
            assert_eq!(role, parsed);
        }
    }

    #[test]
    fn test_provider_kind_aliases() {
        assert_eq!("Claude".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!("ANTHROPIC".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!("glm".parse::<ProviderKind>().unwrap(), ProviderKind::ZhipuAi);
        assert_eq!(
            "Moonshot".parse::<ProviderKind>().unwrap(),
            ProviderKind::Compatible("moonshot".to_string())
        );
        assert!("  ".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_kind_serde() {
        let json = serde_json::to_string(&ProviderKind::DeepSeek).unwrap();
        assert_eq!(json, "\"deepseek\"");
        let parsed: ProviderKind = serde_json::from_str("\"claude\"").unwrap();
        assert_eq!(parsed, ProviderKind::Anthropic);
        assert!(serde_json::from_str::<ProviderKind>("\"\"").is_err());
    }

    #[test]
    fn test_wire_format_by_kind() {
        assert_eq!(ProviderKind::Anthropic.wire_format(), WireFormat::Anthropic);
        assert_eq!(ProviderKind::Gemini.wire_format(), WireFormat::OpenAiCompatible);
        assert_eq!(
            ProviderKind::Compatible("local".into()).wire_format(),
            WireFormat::OpenAiCompatible
        );
    }

    #[test]
    fn test_config_defaults_from_kind() {
        let cfg = config(ProviderKind::ZhipuAi);
        assert_eq!(cfg.effective_base_url(), Some("https://open.bigmodel.cn/api/paas/v4"));
        assert_eq!(cfg.effective_model(), "glm-4");

        let custom = config(ProviderKind::Compatible("local".into()));
        assert_eq!(custom.effective_base_url(), None);
        assert_eq!(custom.effective_model(), "default-model");
    }

    #[test]
    fn test_config_debug_hides_api_key() {
        let cfg = config(ProviderKind::OpenAi);
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("sk-test-not-real"));
    }

    #[test]
    fn test_config_credentials() {
        assert!(config(ProviderKind::OpenAi).has_credentials());
        let blank = ProviderConfig::new("x", ProviderKind::OpenAi, SecretString::from("   "));
        assert!(!blank.has_credentials());
    }

    #[test]
    fn test_config_clone_keeps_key() {
        let cfg = config(ProviderKind::OpenAi).with_temperature(0.3);
        let cloned = cfg.clone();
        assert_eq!(cloned.api_key.expose_secret(), "sk-test-not-real");
        assert_eq!(cloned.temperature, Some(0.3));
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            InvocationError::from_status(401, "bad key"),
            InvocationError::AuthenticationFailure { status: 401, .. }
        ));
        assert!(matches!(
            InvocationError::from_status(429, ""),
            InvocationError::RateLimitedOrServerError { status: 429, .. }
        ));
        assert!(matches!(
            InvocationError::from_status(503, "down"),
            InvocationError::RateLimitedOrServerError { status: 503, .. }
        ));
    }

    #[test]
    fn test_status_body_truncated() {
        let body = "x".repeat(500);
        let err = InvocationError::from_status(500, &body);
        match err {
            InvocationError::RateLimitedOrServerError { message, .. } => {
                assert_eq!(message.len(), ERROR_BODY_LIMIT + 3);
                assert!(message.ends_with("..."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(InvocationError::Timeout { seconds: 3 }.is_transient());
        assert!(InvocationError::from_status(502, "").is_transient());
        assert!(!InvocationError::from_status(403, "").is_transient());
        assert!(!InvocationError::MalformedEnvelope { detail: "x".into() }.is_transient());
        assert!(!InvocationError::ConfigNotFound { reference: "7".into() }.is_transient());
    }

    #[test]
    fn test_timeout_display_rounds_up() {
        let err = InvocationError::timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "timeout after 2s");
        let err = InvocationError::timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "timeout after 30s");
    }

    #[test]
    fn test_result_accessors() {
        let cfg = config(ProviderKind::OpenAi).with_model("gpt-4o");
        let ok = InvocationResult::succeeded(&cfg, "hi".into(), Duration::from_millis(12));
        assert!(ok.success());
        assert_eq!(ok.content(), Some("hi"));
        assert_eq!(ok.provider, "openai");
        assert_eq!(ok.model_name, "gpt-4o");
        assert_eq!(ok.model_id, "cfg-1");
        assert!(ok.error_message().is_none());

        let err = InvocationResult::failed(
            &cfg,
            InvocationError::Timeout { seconds: 5 },
            Duration::from_secs(5),
        );
        assert!(!err.success());
        assert!(err.content().is_none());
        assert_eq!(err.error_message().unwrap(), "openai (gpt-4o): timeout after 5s");
    }

    #[test]
    fn test_exhausted_result() {
        let result = InvocationResult::exhausted(4, Duration::from_secs(1));
        assert_eq!(result.provider, FALLBACK_LABEL);
        assert_eq!(result.model_id, FALLBACK_LABEL);
        assert_eq!(
            result.error_message().unwrap(),
            "All AI providers failed. Please check your AI model configurations and try again."
        );
    }

    #[test]
    fn test_exhausted_lists_each_failure() {
        let failures = vec![
            "openai (gpt-4o): timeout after 30s".to_string(),
            "deepseek (deepseek-chat): authentication failure (HTTP 401): bad key".to_string(),
        ];
        let result = InvocationResult::exhausted_after(2, failures, Duration::from_secs(31));
        assert_eq!(
            result.error_message().unwrap(),
            "All AI providers failed. Please check your AI model configurations and try again. \
             Tried: openai (gpt-4o): timeout after 30s; \
             deepseek (deepseek-chat): authentication failure (HTTP 401): bad key"
        );

        // Records written before the summary existed still load.
        let old = r#"{"kind":"exhausted","attempts":3}"#;
        let parsed: InvocationError = serde_json::from_str(old).unwrap();
        assert_eq!(parsed, InvocationError::Exhausted { attempts: 3, failures: Vec::new() });
    }

    #[test]
    fn test_result_serde_roundtrip() {
        let cfg = config(ProviderKind::Anthropic);
        let result = InvocationResult::failed(
            &cfg,
            InvocationError::EmptyResponse { field: "content".into() },
            Duration::from_millis(3),
        );
        let json = serde_json::to_string(&result).unwrap();
        let parsed: InvocationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
    }
}
