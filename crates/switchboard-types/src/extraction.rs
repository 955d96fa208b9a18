//! Structured-extraction types: hints describing the expected shape, the
//! outcome of an extraction attempt, and the heuristically rebuilt action.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Describes the structured value the caller expects from the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaHints {
    /// Expected top-level field (e.g. `actionPlan`). `None` accepts any value.
    pub root_field: Option<String>,
    /// Alternate names for `root_field`, matched case-insensitively.
    #[serde(default)]
    pub synonyms: Vec<String>,
    /// Array-valued fields that can stand in for a missing `root_field`.
    #[serde(default)]
    pub array_fields: Vec<String>,
}

impl SchemaHints {
    /// Hints that accept whatever JSON value is found.
    pub fn any() -> Self {
        Self::default()
    }

    /// The action-plan shape produced by the HTTP-action generator.
    pub fn action_plan() -> Self {
        Self {
            root_field: Some("actionPlan".to_string()),
            synonyms: vec![
                "action_plan".to_string(),
                "plan".to_string(),
                "actionplan".to_string(),
            ],
            array_fields: vec![
                "actions".to_string(),
                "action".to_string(),
                "items".to_string(),
                "steps".to_string(),
            ],
        }
    }
}

/// Which extraction step produced a structured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    FencedBlock,
    BraceSpan,
    Rescan,
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionStrategy::FencedBlock => write!(f, "fenced_block"),
            ExtractionStrategy::BraceSpan => write!(f, "brace_span"),
            ExtractionStrategy::Rescan => write!(f, "rescan"),
        }
    }
}

/// HTTP verb of a reconstructed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "DELETE" => Some(HttpMethod::Delete),
            "PATCH" => Some(HttpMethod::Patch),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimal HTTP action rebuilt from the user's own text when the model's
/// output could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeuristicAction {
    pub name: String,
    pub method: HttpMethod,
    /// Scheme, host and path only. The query string lives in `params`.
    pub url: String,
    pub params: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
}

impl HeuristicAction {
    /// Render in the same `actionPlan` shape the model is asked to produce.
    pub fn to_action_plan(&self) -> serde_json::Value {
        serde_json::json!({
            "actionPlan": {
                "actions": [{
                    "name": self.name,
                    "httpConfig": {
                        "method": self.method.as_str(),
                        "url": self.url,
                        "headers": self.headers,
                        "params": self.params,
                    }
                }]
            }
        })
    }
}

/// Result of running the extractor. Never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Structured {
        value: serde_json::Value,
        strategy: ExtractionStrategy,
    },
    Reconstructed {
        action: HeuristicAction,
    },
    NotFound {
        reason: String,
    },
}

impl ExtractionOutcome {
    pub fn is_structured(&self) -> bool {
        matches!(self, ExtractionOutcome::Structured { .. })
    }

    /// The structured value, rendering a reconstructed action as an action plan.
    pub fn to_value(&self) -> Option<serde_json::Value> {
        match self {
            ExtractionOutcome::Structured { value, .. } => Some(value.clone()),
            ExtractionOutcome::Reconstructed { action } => Some(action.to_action_plan()),
            ExtractionOutcome::NotFound { .. } => None,
        }
    }

    /// Short label for logs and audit metadata.
    pub fn label(&self) -> String {
        match self {
            ExtractionOutcome::Structured { strategy, .. } => strategy.to_string(),
            ExtractionOutcome::Reconstructed { .. } => "heuristic".to_string(),
            ExtractionOutcome::NotFound { .. } => "not_found".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_plan_hints() {
        let hints = SchemaHints::action_plan();
        assert_eq!(hints.root_field.as_deref(), Some("actionPlan"));
        assert!(hints.synonyms.contains(&"plan".to_string()));
        assert_eq!(hints.array_fields.len(), 4);
        assert!(SchemaHints::any().root_field.is_none());
    }

    #[test]
    fn test_http_method_parsing() {
        assert_eq!(HttpMethod::from_name("post"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::from_name("Patch"), Some(HttpMethod::Patch));
        assert_eq!(HttpMethod::from_name("TRACE"), None);
        assert_eq!(serde_json::to_string(&HttpMethod::Delete).unwrap(), "\"DELETE\"");
    }

    #[test]
    fn test_heuristic_action_renders_action_plan() {
        let action = HeuristicAction {
            name: "get_users".to_string(),
            method: HttpMethod::Get,
            url: "https://api.x.com/users".to_string(),
            params: BTreeMap::from([("page".to_string(), "2".to_string())]),
            headers: BTreeMap::new(),
        };
        let value = action.to_action_plan();
        let http = &value["actionPlan"]["actions"][0]["httpConfig"];
        assert_eq!(http["method"], "GET");
        assert_eq!(http["url"], "https://api.x.com/users");
        assert_eq!(http["params"]["page"], "2");
    }

    #[test]
    fn test_outcome_labels() {
        let structured = ExtractionOutcome::Structured {
            value: serde_json::json!({"a": 1}),
            strategy: ExtractionStrategy::BraceSpan,
        };
        assert!(structured.is_structured());
        assert_eq!(structured.label(), "brace_span");

        let missing = ExtractionOutcome::NotFound {
            reason: "insufficient information".to_string(),
        };
        assert_eq!(missing.label(), "not_found");
        assert!(missing.to_value().is_none());
    }
}
