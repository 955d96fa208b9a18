//! Provider-neutral request shaping.
//!
//! Every backend receives parameters clamped to the configured ceilings,
//! whatever the stored configuration asks for.

use switchboard_types::config::InvocationSettings;
use switchboard_types::llm::{CompletionRequest, Message, ProviderConfig};

/// User prompt plus an optional per-request system instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prompt<'a> {
    pub text: &'a str,
    pub system: Option<&'a str>,
}

impl<'a> Prompt<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, system: None }
    }

    pub fn with_system(mut self, system: Option<&'a str>) -> Self {
        self.system = system;
        self
    }
}

impl<'a> From<&'a str> for Prompt<'a> {
    fn from(text: &'a str) -> Self {
        Self::new(text)
    }
}

impl<'a> From<&'a String> for Prompt<'a> {
    fn from(text: &'a String) -> Self {
        Self::new(text)
    }
}

/// Build the request sent to a backend for `prompt`.
///
/// `system` overrides the configured system instruction when non-blank.
pub fn build_request(
    prompt: &str,
    system: Option<&str>,
    config: &ProviderConfig,
    settings: &InvocationSettings,
    stream: bool,
) -> CompletionRequest {
    let non_blank = |s: &&str| !s.trim().is_empty();
    let system = system
        .filter(non_blank)
        .or(settings.system_instruction.as_deref().filter(non_blank))
        .map(str::to_string);

    CompletionRequest {
        model: config.effective_model().to_string(),
        messages: vec![Message::user(prompt)],
        system,
        max_tokens: clamp_max_tokens(config.max_tokens, settings),
        temperature: Some(clamp_temperature(config.temperature, settings)),
        stream,
    }
}

/// Configured temperature (or the default), capped at the ceiling.
pub fn clamp_temperature(requested: Option<f64>, settings: &InvocationSettings) -> f64 {
    let temperature = requested
        .filter(|t| t.is_finite() && *t > 0.0)
        .unwrap_or(settings.default_temperature);
    temperature.clamp(0.0, settings.temperature_ceiling)
}

/// Configured max tokens (or the default), capped at the ceiling.
pub fn clamp_max_tokens(requested: Option<u32>, settings: &InvocationSettings) -> u32 {
    requested
        .filter(|t| *t > 0)
        .unwrap_or(settings.default_max_tokens)
        .min(settings.max_tokens_ceiling)
}
