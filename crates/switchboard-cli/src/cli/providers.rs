//! `swb providers`: list, add, remove and test provider configurations.
//!
//! API keys are never printed; listings only say whether one is set.

use std::str::FromStr;

use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use switchboard_core::repository::config_store::ConfigStore;
use switchboard_types::llm::{InvocationResult, ProviderConfig, ProviderKind};

use crate::state::AppState;

/// One listed configuration, without its key.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ProviderRow {
    id: String,
    kind: String,
    model: String,
    base_url: Option<String>,
    has_key: bool,
    caller_default: bool,
    system_default: bool,
}

impl ProviderRow {
    fn new(config: &ProviderConfig) -> Self {
        Self {
            id: config.id.clone(),
            kind: config.kind.to_string(),
            model: config.effective_model().to_string(),
            base_url: config.effective_base_url().map(str::to_string),
            has_key: config.has_credentials(),
            caller_default: false,
            system_default: false,
        }
    }
}

fn collect_rows(
    configs: &[ProviderConfig],
    caller_default: Option<&str>,
    system_default: Option<&ProviderConfig>,
) -> Vec<ProviderRow> {
    let mut rows: Vec<ProviderRow> = configs
        .iter()
        .map(|config| ProviderRow {
            caller_default: caller_default == Some(config.id.as_str()),
            ..ProviderRow::new(config)
        })
        .collect();

    if let Some(system) = system_default {
        rows.push(ProviderRow {
            system_default: true,
            ..ProviderRow::new(system)
        });
    }
    rows
}

pub async fn list_providers(state: &AppState, caller: &str, json: bool) -> anyhow::Result<()> {
    let store = state.store();
    let configs = store.list_caller_configs(caller).await?;
    let caller_default = store.get_caller_default_config(caller).await?;
    let system_default = state.service.orchestrator().resolver().system_default();

    let rows = collect_rows(
        &configs,
        caller_default.as_ref().map(|c| c.id.as_str()),
        system_default.as_ref(),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if configs.is_empty() {
        println!();
        println!(
            "  {} No provider configurations for '{}'. Add one to config.toml or with {}.",
            style("i").blue().bold(),
            caller,
            style("swb --store sqlite providers add").cyan()
        );
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Id").fg(Color::White),
        Cell::new("Kind").fg(Color::White),
        Cell::new("Model").fg(Color::White),
        Cell::new("Base URL").fg(Color::White),
        Cell::new("Key").fg(Color::White),
        Cell::new("Default").fg(Color::White),
    ]);

    for row in &rows {
        let key_cell = if row.has_key {
            Cell::new("set").fg(Color::Green)
        } else {
            Cell::new("missing").fg(Color::Red)
        };
        let default_cell = if row.system_default {
            Cell::new("system").fg(Color::Yellow)
        } else if row.caller_default {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("")
        };

        table.add_row(vec![
            Cell::new(&row.id).fg(Color::Cyan),
            Cell::new(&row.kind).fg(Color::White),
            Cell::new(&row.model).fg(Color::DarkGrey),
            Cell::new(row.base_url.as_deref().unwrap_or("-")).fg(Color::DarkGrey),
            key_cell,
            default_cell,
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} configuration(s) for '{}'",
        style(configs.len()).bold(),
        caller
    );
    println!();
    Ok(())
}

/// Fields for `providers add`.
pub struct NewProvider {
    pub id: String,
    pub kind: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub caller: Option<String>,
    pub default: bool,
}

impl NewProvider {
    fn into_config(self) -> anyhow::Result<(ProviderConfig, Option<String>, bool)> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            anyhow::bail!("configuration id must not be empty");
        }
        let kind = ProviderKind::from_str(&self.kind).map_err(anyhow::Error::msg)?;

        let mut config = ProviderConfig::new(id, kind, SecretString::from(self.api_key));
        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }
        if let Some(model) = self.model {
            config = config.with_model(model);
        }
        if let Some(temperature) = self.temperature {
            config = config.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            config = config.with_max_tokens(max_tokens);
        }
        Ok((config, self.caller, self.default))
    }
}

pub async fn add_provider(state: &AppState, new: NewProvider, json: bool) -> anyhow::Result<()> {
    let store = state.sqlite_store()?;
    let (config, caller, is_default) = new.into_config()?;

    store.save(&config, caller.as_deref(), is_default).await?;
    tracing::info!(config_id = %config.id, kind = %config.kind, "Provider configuration saved");

    let row = ProviderRow {
        caller_default: is_default,
        ..ProviderRow::new(&config)
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&row)?);
    } else {
        println!(
            "{} Saved '{}' ({} / {})",
            style("✓").green().bold(),
            style(&row.id).cyan(),
            row.kind,
            row.model
        );
    }
    Ok(())
}

pub async fn remove_provider(state: &AppState, id: &str, json: bool) -> anyhow::Result<()> {
    let store = state.sqlite_store()?;
    if !store.remove(id).await? {
        anyhow::bail!("no configuration with id '{id}'");
    }

    if json {
        println!("{}", serde_json::json!({ "removed": id }));
    } else {
        println!("{} Removed '{}'", style("✓").green().bold(), style(id).cyan());
    }
    Ok(())
}

/// Outcome of `providers test`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionReport {
    id: String,
    provider: String,
    model: String,
    success: bool,
    latency_ms: u64,
    error: Option<String>,
}

impl ConnectionReport {
    fn new(id: &str, result: &InvocationResult) -> Self {
        Self {
            id: id.to_string(),
            provider: result.provider.clone(),
            model: result.model_name.clone(),
            success: result.success(),
            latency_ms: result.elapsed_ms,
            error: result.error().map(ToString::to_string),
        }
    }
}

pub async fn test_provider(
    state: &AppState,
    id: &str,
    json: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let checked = tokio::select! {
        checked = state.service.orchestrator().check_connection(id) => checked,
        _ = cancel.cancelled() => anyhow::bail!("cancelled"),
    };
    let report = ConnectionReport::new(id, &checked?);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if let Some(error) = &report.error {
        eprintln!(
            "{} '{}' ({} / {}) failed after {}ms: {}",
            style("x").red().bold(),
            style(&report.id).cyan(),
            report.provider,
            report.model,
            report.latency_ms,
            style(error).red()
        );
    } else {
        println!(
            "{} '{}' ({} / {}) answered in {}ms",
            style("✓").green().bold(),
            style(&report.id).cyan(),
            report.provider,
            report.model,
            report.latency_ms
        );
    }

    if !report.success {
        anyhow::bail!("connection check failed for '{id}'");
    }
    Ok(())
}
