//! Call-history records handed to the audit sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::InvocationResult;

/// One recorded LLM call.
///
/// Constructed once by the orchestration layer and never modified after
/// it has been enqueued. `prompt` is the text actually sent upstream, so
/// credentials protected by the token vault appear only as placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    /// Logical operation name (e.g. "http_action_generation").
    pub operation: String,
    pub prompt: String,
    pub result: InvocationResult,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl AuditRecord {
    pub fn new(
        operation: impl Into<String>,
        prompt: impl Into<String>,
        result: InvocationResult,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            operation: operation.into(),
            prompt: prompt.into(),
            result,
            started_at,
            duration_ms,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
