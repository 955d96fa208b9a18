//! File-backed [`ConfigStore`] over the `[[providers]]` entries of `config.toml`.

use switchboard_core::repository::config_store::ConfigStore;
use switchboard_types::config::ProviderEntry;
use switchboard_types::error::RepositoryError;
use switchboard_types::llm::ProviderConfig;

struct StoredProvider {
    caller: Option<String>,
    default: bool,
    config: ProviderConfig,
}

impl StoredProvider {
    fn visible_to(&self, caller: &str) -> bool {
        self.caller.as_deref().is_none_or(|owner| owner == caller)
    }
}

/// In-memory store loaded once from configuration entries.
///
/// Entries that fail to convert (an empty kind, for instance) are skipped
/// with a warning; the rest keep their file order.
pub struct TomlConfigStore {
    providers: Vec<StoredProvider>,
}

impl TomlConfigStore {
    pub fn from_entries(entries: &[ProviderEntry]) -> Self {
        let providers = entries
            .iter()
            .filter_map(|entry| match entry.to_config() {
                Ok(config) => Some(StoredProvider {
                    caller: entry.caller.clone(),
                    default: entry.default,
                    config,
                }),
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping provider entry");
                    None
                }
            })
            .collect();

        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl ConfigStore for TomlConfigStore {
    async fn get_config_by_id(&self, id: &str) -> Result<Option<ProviderConfig>, RepositoryError> {
        Ok(self
            .providers
            .iter()
            .find(|p| p.config.id == id)
            .map(|p| p.config.clone()))
    }

    async fn get_caller_default_config(
        &self,
        caller: &str,
    ) -> Result<Option<ProviderConfig>, RepositoryError> {
        Ok(self
            .providers
            .iter()
            .find(|p| p.default && p.visible_to(caller))
            .map(|p| p.config.clone()))
    }

    async fn list_caller_configs(&self, caller: &str) -> Result<Vec<ProviderConfig>, RepositoryError> {
        Ok(self
            .providers
            .iter()
            .filter(|p| p.visible_to(caller))
            .map(|p| p.config.clone())
            .collect())
    }
}
