//! `swb generate`: turn a request description into an HTTP action plan.

use console::style;
use tokio_util::sync::CancellationToken;

use switchboard_core::service::generation::{GenerationOutcome, GenerationRequest};
use switchboard_types::extraction::ExtractionOutcome;

use crate::state::AppState;

pub async fn generate(
    state: &AppState,
    input: String,
    config_id: Option<String>,
    caller: String,
    json: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let request = GenerationRequest::http_action(caller, input).with_preferred(config_id);

    let outcome = tokio::select! {
        outcome = state.service.generate(&request) => outcome,
        _ = cancel.cancelled() => anyhow::bail!("cancelled"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&to_json(&outcome))?);
    } else {
        print_styled(&outcome)?;
    }

    match &outcome.extraction {
        ExtractionOutcome::NotFound { reason } => anyhow::bail!("{reason}"),
        _ => Ok(()),
    }
}

fn to_json(outcome: &GenerationOutcome) -> serde_json::Value {
    let result = &outcome.result;
    serde_json::json!({
        "success": result.success(),
        "provider": result.provider,
        "model": result.model_name,
        "elapsedMs": result.elapsed_ms,
        "failoverWarning": result.failover_warning,
        "error": result.error_message(),
        "strategy": outcome.extraction.label(),
        "protectedTokens": outcome.protected_tokens,
        "value": outcome.extraction.to_value(),
    })
}

fn print_styled(outcome: &GenerationOutcome) -> anyhow::Result<()> {
    let result = &outcome.result;

    if let Some(warning) = &result.failover_warning {
        eprintln!("{} {}", style("!").yellow().bold(), style(warning).yellow());
    }
    if let Some(error) = result.error_message() {
        eprintln!("{} {}", style("x").red().bold(), style(error).red());
    }

    if let Some(value) = outcome.extraction.to_value() {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }

    let source = if result.success() {
        format!("{} / {}", result.provider, result.model_name)
    } else {
        "no backend".to_string()
    };
    eprintln!(
        "  {}",
        style(format!(
            "{source}, {}ms, via {}, {} token(s) protected",
            result.elapsed_ms,
            outcome.extraction.label(),
            outcome.protected_tokens
        ))
        .dim()
    );
    Ok(())
}
