//! Switchboard CLI entry point.
//!
//! Binary name: `swb`
//!
//! Parses CLI arguments, sets up tracing, builds the application state and
//! dispatches to the command handlers. Ctrl+C cancels in-flight calls; the
//! audit queue is drained before exit.

mod cli;
mod state;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands, ProviderAction};
use state::AppState;
use switchboard_observe::tracing_setup::{TracingOptions, init_tracing_with, shutdown_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = TracingOptions {
        enable_otel: cli.otel,
        json: cli.log_json,
        ..TracingOptions::default()
    }
    .with_verbosity(cli.verbose);
    if let Err(e) = init_tracing_with(&options) {
        eprintln!("warning: failed to initialize tracing: {e}");
    }

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Commands that never touch a backend don't need app state.
    match cli.command {
        Commands::Extract { file, plan, input } => {
            return cli::extract::extract(file, plan, input, cli.json).await;
        }
        Commands::Protect { file } => {
            return cli::protect::protect(file, cli.json).await;
        }
        _ => {}
    }

    let state = AppState::init(&cli).await?;

    let cancel = CancellationToken::new();
    let signal = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            tracing::info!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });

    let result = dispatch(&state, cli, cancel).await;

    signal.abort();
    state.shutdown().await;
    result
}

async fn dispatch(state: &AppState, cli: Cli, cancel: CancellationToken) -> anyhow::Result<()> {
    match cli.command {
        Commands::Ask {
            prompt,
            config_id,
            caller,
            stream,
        } => cli::ask::ask(state, prompt, config_id, caller, stream, cli.json, cancel).await,

        Commands::Generate {
            input,
            config_id,
            caller,
        } => cli::generate::generate(state, input, config_id, caller, cli.json, cancel).await,

        Commands::Providers { action } => match action {
            None => {
                cli::providers::list_providers(state, cli::DEFAULT_CALLER, cli.json).await
            }
            Some(ProviderAction::List { caller }) => {
                cli::providers::list_providers(state, &caller, cli.json).await
            }
            Some(ProviderAction::Add {
                id,
                kind,
                api_key,
                base_url,
                model,
                temperature,
                max_tokens,
                caller,
                default,
            }) => {
                let new = cli::providers::NewProvider {
                    id,
                    kind,
                    api_key,
                    base_url,
                    model,
                    temperature,
                    max_tokens,
                    caller,
                    default,
                };
                cli::providers::add_provider(state, new, cli.json).await
            }
            Some(ProviderAction::Remove { id }) => {
                cli::providers::remove_provider(state, &id, cli.json).await
            }
            Some(ProviderAction::Test { id }) => {
                cli::providers::test_provider(state, &id, cli.json, cancel).await
            }
        },

        Commands::History { limit } => cli::history::history(state, limit, cli.json).await,

        Commands::Extract { .. } | Commands::Protect { .. } => unreachable!("handled in run"),
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
