//! Application state shared by every command.
//!
//! `AppState` loads the configuration, opens the database when something
//! needs it, and wires the resolver, invoker and orchestrator into the
//! generation service. The audit queue is owned here so it can be drained
//! on exit.

use anyhow::Context;

use switchboard_core::audit::{AuditQueueHandle, BackgroundAuditQueue};
use switchboard_core::llm::fallback::FallbackOrchestrator;
use switchboard_core::llm::invoker::ProviderInvoker;
use switchboard_core::llm::resolver::ProviderConfigResolver;
use switchboard_core::llm::retry::RetryPolicy;
use switchboard_core::repository::audit::AuditSink;
use switchboard_core::repository::config_store::ConfigStore;
use switchboard_core::service::generation::StructuredGenerationService;
use switchboard_infra::audit::LogAuditSink;
use switchboard_infra::config::{
    SYSTEM_API_KEY_ENV, TomlConfigStore, data_dir, load_config, resolve_config_path,
    system_default_config, with_system_api_key,
};
use switchboard_infra::llm::HttpProviderFactory;
use switchboard_infra::sqlite::pool::default_database_url;
use switchboard_infra::sqlite::{DatabasePool, SqliteAuditSink, SqliteConfigStore};
use switchboard_types::audit::AuditRecord;
use switchboard_types::config::{AuditSinkKind, SwitchboardConfig};
use switchboard_types::error::RepositoryError;
use switchboard_types::llm::ProviderConfig;

use crate::cli::{Cli, Commands, StoreKind};

/// Provider configurations from whichever store was selected.
pub enum AnyConfigStore {
    Toml(TomlConfigStore),
    Sqlite(SqliteConfigStore),
}

impl ConfigStore for AnyConfigStore {
    async fn get_config_by_id(&self, id: &str) -> Result<Option<ProviderConfig>, RepositoryError> {
        match self {
            AnyConfigStore::Toml(store) => store.get_config_by_id(id).await,
            AnyConfigStore::Sqlite(store) => store.get_config_by_id(id).await,
        }
    }

    async fn get_caller_default_config(
        &self,
        caller: &str,
    ) -> Result<Option<ProviderConfig>, RepositoryError> {
        match self {
            AnyConfigStore::Toml(store) => store.get_caller_default_config(caller).await,
            AnyConfigStore::Sqlite(store) => store.get_caller_default_config(caller).await,
        }
    }

    async fn list_caller_configs(&self, caller: &str) -> Result<Vec<ProviderConfig>, RepositoryError> {
        match self {
            AnyConfigStore::Toml(store) => store.list_caller_configs(caller).await,
            AnyConfigStore::Sqlite(store) => store.list_caller_configs(caller).await,
        }
    }
}

/// Audit sink chosen by `[audit] sink`.
enum AnyAuditSink {
    Log(LogAuditSink),
    Sqlite(SqliteAuditSink),
}

impl AuditSink for AnyAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), RepositoryError> {
        match self {
            AnyAuditSink::Log(sink) => sink.record(record).await,
            AnyAuditSink::Sqlite(sink) => sink.record(record).await,
        }
    }
}

pub type GenerationService = StructuredGenerationService<AnyConfigStore, HttpProviderFactory>;

/// Shared application state.
pub struct AppState {
    pub config: SwitchboardConfig,
    pub service: GenerationService,
    audit: Option<BackgroundAuditQueue>,
    pool: Option<DatabasePool>,
}

impl AppState {
    /// Load configuration and build the service stack.
    pub async fn init(cli: &Cli) -> anyhow::Result<Self> {
        let path = resolve_config_path(cli.config.as_deref());
        let config = load_config(&path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))?;
        let config = with_system_api_key(config, std::env::var(SYSTEM_API_KEY_ENV).ok());

        let audit_to_db = config.audit.enabled && config.audit.sink == AuditSinkKind::Sqlite;
        let wants_history = matches!(cli.command, Commands::History { .. });
        let pool = if cli.store == StoreKind::Sqlite || audit_to_db || wants_history {
            Some(open_database().await?)
        } else {
            None
        };

        let store = match (&pool, cli.store) {
            (Some(pool), StoreKind::Sqlite) => AnyConfigStore::Sqlite(SqliteConfigStore::new(pool.clone())),
            _ => AnyConfigStore::Toml(TomlConfigStore::from_entries(&config.providers)),
        };

        let audit = if config.audit.enabled {
            let sink = match (&pool, config.audit.sink) {
                (Some(pool), AuditSinkKind::Sqlite) => AnyAuditSink::Sqlite(SqliteAuditSink::new(pool.clone())),
                _ => AnyAuditSink::Log(LogAuditSink),
            };
            Some(BackgroundAuditQueue::spawn(sink, config.audit.queue_capacity))
        } else {
            None
        };
        let audit_handle = audit
            .as_ref()
            .map(BackgroundAuditQueue::handle)
            .unwrap_or_else(AuditQueueHandle::disabled);

        let resolver = ProviderConfigResolver::new(store, system_default_config(&config));
        let invoker = ProviderInvoker::new(HttpProviderFactory::new(), config.invocation.clone());
        let orchestrator =
            FallbackOrchestrator::new(resolver, invoker, RetryPolicy::from_settings(&config.retry));
        let service = StructuredGenerationService::new(orchestrator, audit_handle);

        tracing::debug!(
            config = %path.display(),
            store = ?cli.store,
            audit = config.audit.enabled,
            "Application state initialized"
        );

        Ok(Self {
            config,
            service,
            audit,
            pool,
        })
    }

    pub fn store(&self) -> &AnyConfigStore {
        self.service.orchestrator().resolver().store()
    }

    /// The SQLite store, or an error naming the flag that selects it.
    pub fn sqlite_store(&self) -> anyhow::Result<&SqliteConfigStore> {
        match self.store() {
            AnyConfigStore::Sqlite(store) => Ok(store),
            AnyConfigStore::Toml(_) => {
                anyhow::bail!("this command needs the SQLite store; pass --store sqlite")
            }
        }
    }

    /// Reader over the audit table, when the database is open.
    pub fn audit_history(&self) -> anyhow::Result<SqliteAuditSink> {
        match &self.pool {
            Some(pool) => Ok(SqliteAuditSink::new(pool.clone())),
            None => anyhow::bail!("the audit database is not open"),
        }
    }

    /// Drain pending audit records.
    pub async fn shutdown(self) {
        if let Some(queue) = self.audit {
            let stats = queue.shutdown().await;
            tracing::debug!(recorded = stats.recorded, failed = stats.failed, "Audit queue closed");
        }
    }
}

async fn open_database() -> anyhow::Result<DatabasePool> {
    let dir = data_dir();
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let url = default_database_url();
    DatabasePool::new(&url)
        .await
        .with_context(|| format!("failed to open database at {url}"))
}
