//! Sensitive token protection.
//!
//! Bearer tokens pasted into user input (typically inside a curl command)
//! are swapped for `__AUTH_TOKEN_<n>__` placeholders before the text is sent
//! to a backend, then swapped back into whatever comes out. The map lives
//! for one request only and its values are never logged.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// JWTs shorter than this are left alone.
const MIN_JWT_LEN: usize = 50;

/// Three dot-separated base64url segments.
const JWT: &str = r"([A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+)";

/// JWT bearer tokens inside a curl `-H` authorization header, single-quoted,
/// double-quoted or unquoted.
static CURL_AUTH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        format!(r"-H\s+'[Aa]uthorization:\s*Bearer\s+{JWT}'"),
        format!(r#"-H\s+"[Aa]uthorization:\s*Bearer\s+{JWT}""#),
        format!(r"-H\s+[Aa]uthorization:\s*Bearer\s+{JWT}"),
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Any long bearer token, whatever its shape.
static LONG_BEARER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Bearer\s+([A-Za-z0-9_\-\.=+/]{100,})").ok());

/// Placeholder → original token, in insertion order.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenPlaceholderMap {
    entries: Vec<(String, String)>,
    next_index: usize,
}

impl TokenPlaceholderMap {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Placeholders in the order they were assigned.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(placeholder, _)| placeholder.as_str())
    }

    /// The token behind `placeholder`.
    pub fn token(&self, placeholder: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| p == placeholder)
            .map(|(_, token)| token.as_str())
    }

    /// Placeholder for `token`. Indices whose placeholder already occurs in
    /// `source` are skipped so restoring never touches text the user wrote.
    fn placeholder_for(&mut self, token: &str, source: &str) -> String {
        if let Some((placeholder, _)) = self.entries.iter().find(|(_, t)| t == token) {
            return placeholder.clone();
        }
        let placeholder = loop {
            let candidate = format!("__AUTH_TOKEN_{}__", self.next_index);
            self.next_index += 1;
            if !source.contains(candidate.as_str()) {
                break candidate;
            }
        };
        self.entries.push((placeholder.clone(), token.to_string()));
        placeholder
    }
}

impl fmt::Debug for TokenPlaceholderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPlaceholderMap")
            .field("placeholders", &self.placeholders().collect::<Vec<_>>())
            .field("tokens", &"[REDACTED]")
            .finish()
    }
}

/// Text with tokens replaced, plus the map needed to undo it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedText {
    pub text: String,
    pub map: TokenPlaceholderMap,
}

/// Stateless token protector; one [`TokenPlaceholderMap`] per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensitiveTokenVault;

impl SensitiveTokenVault {
    pub fn new() -> Self {
        Self
    }

    /// Replace every detected token in `text` with a placeholder.
    pub fn protect(&self, text: &str) -> ProtectedText {
        let mut map = TokenPlaceholderMap::default();
        let mut tokens: Vec<String> = Vec::new();

        for pattern in CURL_AUTH_PATTERNS.iter() {
            for caps in pattern.captures_iter(text) {
                if let Some(token) = caps.get(1).map(|m| m.as_str())
                    && token.len() > MIN_JWT_LEN
                {
                    tokens.push(token.to_string());
                }
            }
        }
        if let Some(pattern) = LONG_BEARER.as_ref() {
            for caps in pattern.captures_iter(text) {
                if let Some(token) = caps.get(1) {
                    tokens.push(token.as_str().to_string());
                }
            }
        }

        // Longest first, so a token that contains another is replaced whole.
        let mut ordered: Vec<(String, String)> = Vec::new();
        for token in &tokens {
            let placeholder = map.placeholder_for(token, text);
            if !ordered.iter().any(|(t, _)| t == token) {
                ordered.push((token.clone(), placeholder));
            }
        }
        ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let mut protected = text.to_string();
        for (token, placeholder) in &ordered {
            protected = protected.replace(token.as_str(), placeholder);
        }

        if !map.is_empty() {
            tracing::debug!(
                protected_tokens = map.len(),
                token_lengths = ?ordered.iter().map(|(t, _)| t.len()).collect::<Vec<_>>(),
                "Protected sensitive tokens"
            );
        }

        ProtectedText {
            text: protected,
            map,
        }
    }

    /// Put the original tokens back. Unknown placeholders are left as-is.
    pub fn restore(&self, text: &str, map: &TokenPlaceholderMap) -> String {
        let mut restored = text.to_string();
        for (placeholder, token) in &map.entries {
            if restored.contains(placeholder.as_str()) {
                restored = restored.replace(placeholder.as_str(), token);
            }
        }
        restored
    }

    /// Restore inside every string of a JSON value, keys included.
    pub fn restore_value(&self, value: Value, map: &TokenPlaceholderMap) -> Value {
        if map.is_empty() {
            return value;
        }
        match value {
            Value::String(s) => Value::String(self.restore(&s, map)),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.restore_value(item, map))
                    .collect(),
            ),
            Value::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(key, item)| (self.restore(&key, map), self.restore_value(item, map)))
                    .collect(),
            ),
            other => other,
        }
    }
}
