//! `swb history`: recent calls from the SQLite audit trail.
//!
//! Prompts are left out of the table. They are already protected, but they
//! are long; `--json` prints them.

use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use switchboard_types::audit::AuditRecord;
use switchboard_types::config::AuditSinkKind;

use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRow {
    started_at: DateTime<Utc>,
    operation: String,
    provider: String,
    model: String,
    success: bool,
    duration_ms: u64,
    error: Option<String>,
    failover_warning: Option<String>,
}

impl HistoryRow {
    fn new(record: &AuditRecord) -> Self {
        let result = &record.result;
        Self {
            started_at: record.started_at,
            operation: record.operation.clone(),
            provider: result.provider.clone(),
            model: result.model_name.clone(),
            success: result.success(),
            duration_ms: record.duration_ms,
            error: result.error().map(ToString::to_string),
            failover_warning: result.failover_warning.clone(),
        }
    }
}

pub async fn history(state: &AppState, limit: u32, json: bool) -> anyhow::Result<()> {
    let records = state.audit_history()?.recent(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if state.config.audit.sink != AuditSinkKind::Sqlite || !state.config.audit.enabled {
        eprintln!(
            "  {} Calls are not being recorded here; set {} in config.toml.",
            style("i").blue().bold(),
            style("[audit] sink = \"sqlite\"").cyan()
        );
    }
    if records.is_empty() {
        println!();
        println!("  {}", style("No recorded calls.").dim());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Started").fg(Color::White),
        Cell::new("Operation").fg(Color::White),
        Cell::new("Backend").fg(Color::White),
        Cell::new("Time").fg(Color::White),
        Cell::new("Result").fg(Color::White),
    ]);

    for row in records.iter().map(HistoryRow::new) {
        let result_cell = match (&row.error, &row.failover_warning) {
            (Some(error), _) => Cell::new(error).fg(Color::Red),
            (None, Some(_)) => Cell::new("ok (failover)").fg(Color::Yellow),
            (None, None) => Cell::new("ok").fg(Color::Green),
        };
        table.add_row(vec![
            Cell::new(row.started_at.format("%Y-%m-%d %H:%M:%S")).fg(Color::DarkGrey),
            Cell::new(&row.operation).fg(Color::Cyan),
            Cell::new(format!("{} / {}", row.provider, row.model)),
            Cell::new(format!("{}ms", row.duration_ms)).fg(Color::DarkGrey),
            result_cell,
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
