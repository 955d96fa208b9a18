//! `swb ask`: send a prompt and print the answer.

use std::io::Write;

use console::style;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use switchboard_core::service::generation::GenerationRequest;
use switchboard_types::llm::InvocationResult;

use crate::state::AppState;

pub async fn ask(
    state: &AppState,
    prompt: String,
    config_id: Option<String>,
    caller: String,
    stream: bool,
    json: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let request = GenerationRequest::ask(caller, prompt).with_preferred(config_id);

    if stream && !json {
        return ask_streaming(state, &request, cancel).await;
    }

    let result = tokio::select! {
        result = state.service.complete(&request) => result,
        _ = cancel.cancelled() => anyhow::bail!("cancelled"),
    };
    print_result(&result, json)
}

async fn ask_streaming(
    state: &AppState,
    request: &GenerationRequest,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut generation = state.service.generate_stream(request, cancel.clone()).await?;

    if let Some(warning) = &generation.failover_warning {
        eprintln!("{} {}", style("!").yellow().bold(), style(warning).yellow());
    }

    let mut stdout = std::io::stdout();
    loop {
        let item = tokio::select! {
            item = generation.stream.next() => item,
            _ = cancel.cancelled() => {
                println!();
                anyhow::bail!("cancelled");
            }
        };
        match item {
            Some(Ok(chunk)) => {
                // A placeholder split across two chunks is printed unrestored.
                write!(stdout, "{}", generation.restore(&chunk.text))?;
                stdout.flush()?;
            }
            Some(Err(err)) => {
                println!();
                return Err(err.into());
            }
            None => break,
        }
    }
    println!();

    eprintln!(
        "  {}",
        style(format!("{} / {}", generation.provider, generation.model_name)).dim()
    );
    Ok(())
}

fn print_result(result: &InvocationResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        if let Some(warning) = &result.failover_warning {
            eprintln!("{} {}", style("!").yellow().bold(), style(warning).yellow());
        }
        if let Some(content) = result.content() {
            println!("{content}");
            eprintln!(
                "  {}",
                style(format!(
                    "{} / {} in {}ms",
                    result.provider, result.model_name, result.elapsed_ms
                ))
                .dim()
            );
        }
    }

    match result.error() {
        Some(err) => Err(err.clone().into()),
        None => Ok(()),
    }
}
