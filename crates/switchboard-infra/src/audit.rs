//! Audit sink that writes call history as structured `tracing` events.

use switchboard_core::repository::audit::AuditSink;
use switchboard_types::audit::AuditRecord;
use switchboard_types::error::RepositoryError;

/// Emits one `info` event per record on the `switchboard::audit` target.
///
/// The prompt itself is not logged, only its length.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAuditSink;

impl LogAuditSink {
    pub fn new() -> Self {
        Self
    }
}

impl AuditSink for LogAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), RepositoryError> {
        let result = &record.result;
        let metadata = serde_json::Value::Object(record.metadata.clone());

        match result.error_message() {
            None => tracing::info!(
                target: "switchboard::audit",
                record_id = %record.id,
                operation = %record.operation,
                provider = %result.provider,
                model = %result.model_name,
                config_id = %result.model_id,
                success = true,
                prompt_len = record.prompt.len(),
                content_len = result.content().map_or(0, str::len),
                elapsed_ms = record.duration_ms,
                failover_warning = result.failover_warning.as_deref(),
                metadata = %metadata,
                "LLM call"
            ),
            Some(error) => tracing::info!(
                target: "switchboard::audit",
                record_id = %record.id,
                operation = %record.operation,
                provider = %result.provider,
                model = %result.model_name,
                config_id = %result.model_id,
                success = false,
                prompt_len = record.prompt.len(),
                elapsed_ms = record.duration_ms,
                error = %error,
                metadata = %metadata,
                "LLM call"
            ),
        }
        Ok(())
    }
}
