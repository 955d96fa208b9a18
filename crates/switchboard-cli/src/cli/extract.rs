//! `swb extract`: run the extractor over saved model output.

use std::path::PathBuf;

use console::style;

use switchboard_core::extract::ResilientStructuredExtractor;
use switchboard_types::extraction::{ExtractionOutcome, SchemaHints};

use super::read_input;

pub async fn extract(
    file: Option<PathBuf>,
    plan: bool,
    input: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let raw = read_input(file.as_deref()).await?;
    let outcome = run(&raw, plan, input.as_deref());

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if let Some(value) = outcome.to_value() {
        println!("{}", serde_json::to_string_pretty(&value)?);
        eprintln!("  {}", style(format!("via {}", outcome.label())).dim());
    }

    match outcome {
        ExtractionOutcome::NotFound { reason } => anyhow::bail!("{reason}"),
        _ => Ok(()),
    }
}

fn run(raw: &str, plan: bool, input: Option<&str>) -> ExtractionOutcome {
    let hints = if plan {
        SchemaHints::action_plan()
    } else {
        SchemaHints::any()
    };
    let extractor = ResilientStructuredExtractor::new();
    match input {
        Some(input) => extractor.extract_or_reconstruct(raw, input, &hints),
        None => extractor.extract(raw, &hints),
    }
}
