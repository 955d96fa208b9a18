//! Global configuration types for Switchboard.
//!
//! `SwitchboardConfig` represents the top-level `config.toml` that controls
//! invocation limits, retry policy, the audit queue, the system default
//! backend, and the file-backed provider list.

use std::fmt;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::llm::{ProviderConfig, ProviderKind};

/// Lower bound for the per-call deadline.
pub const MIN_TIMEOUT_SECS: u64 = 10;
/// Upper bound for the per-call deadline.
pub const MAX_TIMEOUT_SECS: u64 = 60;

/// Top-level configuration for Switchboard.
///
/// Loaded from `~/.switchboard/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchboardConfig {
    #[serde(default)]
    pub invocation: InvocationSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub audit: AuditSettings,

    /// Backend used when nothing configured for the caller works.
    #[serde(default = "default_system_provider")]
    pub system_default: ProviderEntry,

    /// Provider configurations served by the file-backed config store.
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

/// Limits applied to every invocation regardless of what a configuration asks for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationSettings {
    /// Per-call deadline, clamped to 10..=60 seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub default_temperature: f64,

    #[serde(default = "default_temperature_ceiling")]
    pub temperature_ceiling: f64,

    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    #[serde(default = "default_max_tokens_ceiling")]
    pub max_tokens_ceiling: u32,

    /// Channel capacity between a streaming producer task and its consumer.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,

    /// System message sent ahead of every prompt, if any.
    #[serde(default)]
    pub system_instruction: Option<String>,
}

impl InvocationSettings {
    /// The configured deadline, clamped to the supported range.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS))
    }
}

impl Default for InvocationSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            default_temperature: default_temperature(),
            temperature_ceiling: default_temperature_ceiling(),
            default_max_tokens: default_max_tokens(),
            max_tokens_ceiling: default_max_tokens_ceiling(),
            stream_buffer: default_stream_buffer(),
            system_instruction: None,
        }
    }
}

/// Bounded retry against a single backend for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per backend, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

/// Which audit sink records call history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    /// Structured `tracing` events.
    #[default]
    Log,
    /// The `llm_call_audit` SQLite table.
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Records beyond this many pending items are dropped, never awaited.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub sink: AuditSinkKind,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: default_queue_capacity(),
            sink: AuditSinkKind::default(),
        }
    }
}

/// A provider configuration as written in `config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Owner of this configuration. `None` makes it visible to every caller.
    #[serde(default)]
    pub caller: Option<String>,
    /// Whether this is the owner's default configuration.
    #[serde(default)]
    pub default: bool,
}

impl ProviderEntry {
    /// Convert into a resolved [`ProviderConfig`], filling kind defaults.
    pub fn to_config(&self) -> Result<ProviderConfig, ConfigError> {
        let kind: ProviderKind = self.kind.parse().map_err(|message| ConfigError::InvalidProvider {
            id: self.id.clone(),
            message,
        })?;

        let mut config = ProviderConfig::new(
            self.id.clone(),
            kind,
            SecretString::from(self.api_key.clone()),
        );
        if !self.base_url.trim().is_empty() {
            config.base_url = self.base_url.trim().to_string();
        }
        if !self.model.trim().is_empty() {
            config.model_name = self.model.trim().to_string();
        }
        config.temperature = self.temperature.filter(|t| *t > 0.0);
        config.max_tokens = self.max_tokens.filter(|t| *t > 0);
        Ok(config)
    }

    /// True when this entry belongs to `caller` (or to everyone).
    pub fn visible_to(&self, caller: &str) -> bool {
        self.caller.as_deref().is_none_or(|owner| owner == caller)
    }
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("caller", &self.caller)
            .field("default", &self.default)
            .finish()
    }
}

fn default_system_provider() -> ProviderEntry {
    ProviderEntry {
        id: "system-default".to_string(),
        kind: "zhipuai".to_string(),
        base_url: "https://open.bigmodel.cn/api/paas/v4".to_string(),
        api_key: String::new(),
        model: "glm-4".to_string(),
        temperature: Some(0.7),
        max_tokens: Some(8192),
        caller: None,
        default: false,
    }
}

impl Default for ProviderEntry {
    fn default() -> Self {
        default_system_provider()
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_temperature() -> f64 {
    0.7
}

fn default_temperature_ceiling() -> f64 {
    0.8
}

fn default_max_tokens() -> u32 {
    3000
}

fn default_max_tokens_ceiling() -> u32 {
    4000
}

fn default_stream_buffer() -> usize {
    64
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    4000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_queue_capacity() -> usize {
    256
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_config_default_values() {
        let config = SwitchboardConfig::default();
        assert_eq!(config.invocation.timeout(), Duration::from_secs(30));
        assert_eq!(config.invocation.max_tokens_ceiling, 4000);
        assert!((config.invocation.temperature_ceiling - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.audit.enabled);
        assert_eq!(config.audit.sink, AuditSinkKind::Log);
        assert_eq!(config.system_default.kind, "zhipuai");
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_config_deserialize_with_defaults() {
        let config: SwitchboardConfig = toml::from_str("").unwrap();
        assert_eq!(config.invocation.timeout_secs, 30);
        assert_eq!(config.retry.initial_delay_ms, 500);
        assert_eq!(config.audit.queue_capacity, 256);
        assert_eq!(config.system_default.model, "glm-4");
    }

    #[test]
    fn test_timeout_is_clamped() {
        let mut settings = InvocationSettings::default();
        settings.timeout_secs = 2;
        assert_eq!(settings.timeout(), Duration::from_secs(MIN_TIMEOUT_SECS));
        settings.timeout_secs = 600;
        assert_eq!(settings.timeout(), Duration::from_secs(MAX_TIMEOUT_SECS));
    }

    #[test]
    fn test_config_deserialize_with_values() {
        let toml_str = r#"
[invocation]
timeout_secs = 45
max_tokens_ceiling = 2000

[retry]
max_attempts = 2

[audit]
sink = "sqlite"
queue_capacity = 16

[system_default]
id = "sys"
kind = "openai"
api_key = "sk-system"

[[providers]]
id = "p1"
kind = "claude"
api_key = "sk-ant"
caller = "alice"
default = true

[[providers]]
id = "p2"
kind = "deepseek"
model = "deepseek-coder"
"#;
        let config: SwitchboardConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.invocation.timeout_secs, 45);
        assert_eq!(config.invocation.max_tokens_ceiling, 2000);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.audit.sink, AuditSinkKind::Sqlite);
        assert_eq!(config.system_default.kind, "openai");
        assert_eq!(config.providers.len(), 2);
        assert!(config.providers[0].default);
        assert!(config.providers[0].visible_to("alice"));
        assert!(!config.providers[0].visible_to("bob"));
        assert!(config.providers[1].visible_to("bob"));
    }

    #[test]
    fn test_entry_to_config_fills_defaults() {
        let entry = ProviderEntry {
            id: "p1".to_string(),
            kind: "claude".to_string(),
            base_url: String::new(),
            api_key: "sk-ant".to_string(),
            model: String::new(),
            temperature: Some(0.0),
            max_tokens: Some(0),
            caller: None,
            default: false,
        };
        let config = entry.to_config().unwrap();
        assert_eq!(config.kind, ProviderKind::Anthropic);
        assert_eq!(config.base_url, "https://api.anthropic.com");
        assert_eq!(config.model_name, "claude-3-sonnet-20240229");
        assert_eq!(config.api_key.expose_secret(), "sk-ant");
        assert_eq!(config.temperature, None);
        assert_eq!(config.max_tokens, None);
    }

    #[test]
    fn test_entry_with_empty_kind_is_rejected() {
        let mut entry = ProviderEntry::default();
        entry.kind = String::new();
        assert!(matches!(
            entry.to_config(),
            Err(ConfigError::InvalidProvider { .. })
        ));
    }

    #[test]
    fn test_entry_debug_redacts_key() {
        let mut entry = ProviderEntry::default();
        entry.api_key = "sk-very-secret".to_string();
        let debug = format!("{entry:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_entry_serialization_skips_key() {
        let mut entry = ProviderEntry::default();
        entry.api_key = "sk-very-secret".to_string();
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("sk-very-secret"));
    }
}
