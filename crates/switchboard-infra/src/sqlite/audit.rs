//! SQLite audit sink over the `llm_call_audit` table.
//!
//! Each record becomes one row. The invocation outcome is flattened into
//! `success`, `content` and `error` columns; the error keeps its typed
//! form as JSON so history can be read back without losing the cause.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use switchboard_core::repository::audit::AuditSink;
use switchboard_types::audit::AuditRecord;
use switchboard_types::error::RepositoryError;
use switchboard_types::llm::{InvocationError, InvocationResult};

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

const FAILOVER_KEY: &str = "failover_warning";

/// SQLite-backed audit sink.
pub struct SqliteAuditSink {
    pool: DatabasePool,
}

impl SqliteAuditSink {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Most recent records first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<AuditRecord>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM llm_call_audit ORDER BY started_at DESC, rowid DESC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        rows.iter()
            .map(|row| AuditRow::from_row(row).map_err(query_error)?.into_record())
            .collect()
    }
}

impl AuditSink for SqliteAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), RepositoryError> {
        let result = &record.result;
        let error = match result.error() {
            Some(err) => Some(
                serde_json::to_string(err).map_err(|e| RepositoryError::InvalidData(e.to_string()))?,
            ),
            None => None,
        };

        let mut metadata = record.metadata.clone();
        if let Some(warning) = &result.failover_warning {
            metadata
                .entry(FAILOVER_KEY)
                .or_insert_with(|| serde_json::Value::String(warning.clone()));
        }
        let metadata = serde_json::to_string(&metadata).map_err(|e| RepositoryError::InvalidData(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO llm_call_audit
                   (id, operation, prompt, success, content, error, provider, model_name, model_id,
                    started_at, duration_ms, metadata)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(&record.operation)
        .bind(&record.prompt)
        .bind(result.success())
        .bind(result.content())
        .bind(error)
        .bind(&result.provider)
        .bind(&result.model_name)
        .bind(&result.model_id)
        .bind(format_datetime(&record.started_at))
        .bind(i64::try_from(record.duration_ms).unwrap_or(i64::MAX))
        .bind(metadata)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Private Row types
// ---------------------------------------------------------------------------

struct AuditRow {
    id: String,
    operation: String,
    prompt: String,
    success: bool,
    content: Option<String>,
    error: Option<String>,
    provider: String,
    model_name: String,
    model_id: String,
    started_at: String,
    duration_ms: i64,
    metadata: String,
}

impl AuditRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            operation: row.try_get("operation")?,
            prompt: row.try_get("prompt")?,
            success: row.try_get("success")?,
            content: row.try_get("content")?,
            error: row.try_get("error")?,
            provider: row.try_get("provider")?,
            model_name: row.try_get("model_name")?,
            model_id: row.try_get("model_id")?,
            started_at: row.try_get("started_at")?,
            duration_ms: row.try_get("duration_ms")?,
            metadata: row.try_get("metadata")?,
        })
    }

    fn into_record(self) -> Result<AuditRecord, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::InvalidData(format!("invalid audit id: {e}")))?;
        let started_at: DateTime<Utc> = parse_datetime(&self.started_at)?;
        let metadata: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&self.metadata)
            .map_err(|e| RepositoryError::InvalidData(format!("invalid metadata: {e}")))?;

        let outcome = if self.success {
            Ok(self.content.unwrap_or_default())
        } else {
            Err(decode_error(self.error.as_deref()))
        };
        let duration_ms = u64::try_from(self.duration_ms).unwrap_or_default();

        let result = InvocationResult {
            provider: self.provider,
            model_name: self.model_name,
            model_id: self.model_id,
            outcome,
            elapsed_ms: duration_ms,
            failover_warning: metadata
                .get(FAILOVER_KEY)
                .and_then(|v| v.as_str())
                .map(str::to_string),
        };

        Ok(AuditRecord {
            id,
            operation: self.operation,
            prompt: self.prompt,
            result,
            started_at,
            duration_ms,
            metadata,
        })
    }
}

/// Typed error from its stored JSON; free text from older rows is kept verbatim.
fn decode_error(stored: Option<&str>) -> InvocationError {
    let Some(stored) = stored else {
        return InvocationError::Transport {
            message: "unknown failure".to_string(),
        };
    };
    serde_json::from_str(stored).unwrap_or_else(|_| InvocationError::Transport {
        message: stored.to_string(),
    })
}
