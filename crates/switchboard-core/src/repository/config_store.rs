//! Configuration store trait definition.

use switchboard_types::error::RepositoryError;
use switchboard_types::llm::ProviderConfig;

/// Read-only access to stored provider configurations.
///
/// Implementations own the configurations; the core only reads them.
pub trait ConfigStore: Send + Sync {
    /// Look up one configuration by its id.
    /// Returns None if no configuration has that id.
    fn get_config_by_id(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ProviderConfig>, RepositoryError>> + Send;

    /// The configuration a caller marked as their default, if any.
    fn get_caller_default_config(
        &self,
        caller: &str,
    ) -> impl std::future::Future<Output = Result<Option<ProviderConfig>, RepositoryError>> + Send;

    /// Every configuration visible to a caller, in store order.
    fn list_caller_configs(
        &self,
        caller: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ProviderConfig>, RepositoryError>> + Send;
}
