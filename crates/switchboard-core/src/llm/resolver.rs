//! Provider configuration resolution.
//!
//! Turns a possibly-absent configuration id into a concrete
//! [`ProviderConfig`]. Lookups never fail: store errors are logged and
//! treated as "not found" so the fallback chain can keep moving.

use switchboard_types::error::RepositoryError;
use switchboard_types::llm::ProviderConfig;

use crate::repository::config_store::ConfigStore;

/// Resolves configurations from a [`ConfigStore`] plus the system default.
pub struct ProviderConfigResolver<S> {
    store: S,
    system_default: Option<ProviderConfig>,
}

impl<S: ConfigStore> ProviderConfigResolver<S> {
    pub fn new(store: S, system_default: Option<ProviderConfig>) -> Self {
        Self {
            store,
            system_default,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The configuration stored under `id`.
    pub async fn by_id(&self, id: &str) -> Option<ProviderConfig> {
        if id.trim().is_empty() {
            return None;
        }
        let found = self.store.get_config_by_id(id).await;
        log_lookup_failure(found, "by_id", id).flatten()
    }

    /// The configuration `caller` marked as default.
    pub async fn caller_default(&self, caller: &str) -> Option<ProviderConfig> {
        let found = self.store.get_caller_default_config(caller).await;
        log_lookup_failure(found, "caller_default", caller).flatten()
    }

    /// Every credentialed configuration of `caller`, in store order,
    /// skipping any whose id is in `exclude`.
    pub async fn available(&self, caller: &str, exclude: &[&str]) -> Vec<ProviderConfig> {
        let listed = self.store.list_caller_configs(caller).await;
        log_lookup_failure(listed, "available", caller)
            .unwrap_or_default()
            .into_iter()
            .filter(|c| c.has_credentials() && !exclude.contains(&c.id.as_str()))
            .collect()
    }

    /// The system-wide backend, when it has credentials.
    pub fn system_default(&self) -> Option<ProviderConfig> {
        self.system_default
            .as_ref()
            .filter(|c| c.has_credentials())
            .cloned()
    }

    /// Resolve `candidate`, falling through to the caller default, any
    /// credentialed caller configuration, then the system default.
    pub async fn resolve(&self, candidate: Option<&str>, caller: &str) -> Option<ProviderConfig> {
        if let Some(id) = candidate {
            if let Some(config) = self.by_id(id).await {
                return Some(config);
            }
            tracing::debug!(config_id = %id, caller, "Candidate config not found, falling through");
        }

        if let Some(config) = self.caller_default(caller).await {
            return Some(config);
        }

        let exclude: Vec<&str> = candidate.into_iter().collect();
        if let Some(config) = self.available(caller, &exclude).await.into_iter().next() {
            return Some(config);
        }

        self.system_default()
    }
}

fn log_lookup_failure<T>(result: Result<T, RepositoryError>, lookup: &str, key: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(lookup, key, error = %e, "Config store lookup failed, treating as not found");
            None
        }
    }
}
