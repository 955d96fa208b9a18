//! SQLite-backed [`ConfigStore`] over the `provider_configs` table.

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use sqlx::Row;

use switchboard_core::repository::config_store::ConfigStore;
use switchboard_types::error::RepositoryError;
use switchboard_types::llm::{ProviderConfig, ProviderKind};

use super::pool::DatabasePool;
use super::{format_datetime, query_error};

const SELECT_COLUMNS: &str =
    "SELECT id, kind, base_url, api_key, model_name, temperature, max_tokens FROM provider_configs";

/// SQLite-backed provider configuration store.
pub struct SqliteConfigStore {
    pool: DatabasePool,
}

impl SqliteConfigStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a configuration.
    ///
    /// `caller = None` makes it visible to every caller. Marking a config as
    /// the default clears the flag on the owner's other configs.
    pub async fn save(
        &self,
        config: &ProviderConfig,
        caller: Option<&str>,
        is_default: bool,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        if is_default {
            sqlx::query("UPDATE provider_configs SET is_default = 0 WHERE caller IS ?")
                .bind(caller)
                .execute(&mut *tx)
                .await
                .map_err(query_error)?;
        }

        sqlx::query(
            r#"INSERT INTO provider_configs
                   (id, caller, kind, base_url, api_key, model_name, temperature, max_tokens, is_default, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   caller = excluded.caller,
                   kind = excluded.kind,
                   base_url = excluded.base_url,
                   api_key = excluded.api_key,
                   model_name = excluded.model_name,
                   temperature = excluded.temperature,
                   max_tokens = excluded.max_tokens,
                   is_default = excluded.is_default"#,
        )
        .bind(&config.id)
        .bind(caller)
        .bind(config.kind.as_str())
        .bind(&config.base_url)
        .bind(config.api_key.expose_secret())
        .bind(&config.model_name)
        .bind(config.temperature)
        .bind(config.max_tokens.map(i64::from))
        .bind(is_default)
        .bind(format_datetime(&Utc::now()))
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        tracing::debug!(config_id = %config.id, kind = %config.kind, "Saved provider config");
        Ok(())
    }

    /// Delete a configuration. Returns whether a row was removed.
    pub async fn remove(&self, id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM provider_configs WHERE id = ?")
            .bind(id)
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }
}

impl ConfigStore for SqliteConfigStore {
    async fn get_config_by_id(&self, id: &str) -> Result<Option<ProviderConfig>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.as_ref().map(row_to_config).transpose()
    }

    async fn get_caller_default_config(
        &self,
        caller: &str,
    ) -> Result<Option<ProviderConfig>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE is_default = 1 AND (caller = ? OR caller IS NULL) \
             ORDER BY caller IS NULL, created_at LIMIT 1"
        ))
        .bind(caller)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_error)?;

        row.as_ref().map(row_to_config).transpose()
    }

    async fn list_caller_configs(&self, caller: &str) -> Result<Vec<ProviderConfig>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE caller = ? OR caller IS NULL ORDER BY created_at, rowid"
        ))
        .bind(caller)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter().map(row_to_config).collect()
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_config(row: &sqlx::sqlite::SqliteRow) -> Result<ProviderConfig, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_error)?;
    let kind: String = row.try_get("kind").map_err(query_error)?;
    let kind: ProviderKind = kind
        .parse()
        .map_err(|e: String| RepositoryError::InvalidData(format!("config '{id}': {e}")))?;
    let api_key: String = row.try_get("api_key").map_err(query_error)?;
    let max_tokens: Option<i64> = row.try_get("max_tokens").map_err(query_error)?;

    Ok(ProviderConfig {
        id,
        kind,
        base_url: row.try_get("base_url").map_err(query_error)?,
        api_key: SecretString::from(api_key),
        model_name: row.try_get("model_name").map_err(query_error)?,
        temperature: row.try_get("temperature").map_err(query_error)?,
        max_tokens: max_tokens.and_then(|t| u32::try_from(t).ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    fn config(id: &str, kind: ProviderKind) -> ProviderConfig {
        ProviderConfig::new(id, kind, SecretString::from(format!("sk-{id}")))
    }

    #[tokio::test]
    async fn test_save_and_get_by_id() {
        let store = SqliteConfigStore::new(test_pool().await);
        let cfg = config("c1", ProviderKind::DeepSeek)
            .with_model("deepseek-coder")
            .with_temperature(0.3)
            .with_max_tokens(2048);
        store.save(&cfg, Some("alice"), false).await.unwrap();

        let loaded = store.get_config_by_id("c1").await.unwrap().unwrap();
        assert_eq!(loaded.kind, ProviderKind::DeepSeek);
        assert_eq!(loaded.model_name, "deepseek-coder");
        assert_eq!(loaded.temperature, Some(0.3));
        assert_eq!(loaded.max_tokens, Some(2048));
        assert_eq!(loaded.api_key.expose_secret(), "sk-c1");
        assert!(store.get_config_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_generic_kind_survives_round_trip() {
        let store = SqliteConfigStore::new(test_pool().await);
        let cfg = config("local", ProviderKind::Compatible("ollama".to_string()))
            .with_base_url("http://localhost:11434");
        store.save(&cfg, None, false).await.unwrap();

        let loaded = store.get_config_by_id("local").await.unwrap().unwrap();
        assert_eq!(loaded.kind, ProviderKind::Compatible("ollama".to_string()));
        assert_eq!(loaded.base_url, "http://localhost:11434");
    }

    #[tokio::test]
    async fn test_caller_scoping_and_default() {
        let store = SqliteConfigStore::new(test_pool().await);
        store.save(&config("shared", ProviderKind::OpenAi), None, false).await.unwrap();
        store.save(&config("a1", ProviderKind::Anthropic), Some("alice"), true).await.unwrap();
        store.save(&config("a2", ProviderKind::Gemini), Some("alice"), true).await.unwrap();
        store.save(&config("b1", ProviderKind::ZhipuAi), Some("bob"), false).await.unwrap();

        let ids: Vec<String> = store
            .list_caller_configs("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["shared", "a1", "a2"]);

        // Marking a2 as default cleared a1.
        let default = store.get_caller_default_config("alice").await.unwrap().unwrap();
        assert_eq!(default.id, "a2");
        assert!(store.get_caller_default_config("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = SqliteConfigStore::new(test_pool().await);
        store.save(&config("gone", ProviderKind::OpenAi), None, false).await.unwrap();
        assert!(store.remove("gone").await.unwrap());
        assert!(!store.remove("gone").await.unwrap());
        assert!(store.get_config_by_id("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_stored_kind_reported() {
        let pool = test_pool().await;
        sqlx::query(
            "INSERT INTO provider_configs (id, kind, created_at) VALUES ('bad', '', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool.writer)
        .await
        .unwrap();

        let store = SqliteConfigStore::new(pool);
        let err = store.get_config_by_id("bad").await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidData(_)));
    }
}
