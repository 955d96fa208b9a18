//! Audit sink trait definition.

use switchboard_types::audit::AuditRecord;
use switchboard_types::error::RepositoryError;

/// Destination for call-history records.
///
/// Only ever called from the background audit queue, never from the
/// request path, so a slow or failing sink cannot affect callers.
pub trait AuditSink: Send + Sync {
    fn record(
        &self,
        record: &AuditRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
