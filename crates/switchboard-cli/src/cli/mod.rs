//! CLI command definitions and dispatch for the `swb` binary.
//!
//! Uses clap derive macros for argument parsing. Each subcommand lives in
//! its own module and receives the shared [`AppState`](crate::state::AppState).

pub mod ask;
pub mod extract;
pub mod generate;
pub mod history;
pub mod protect;
pub mod providers;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

/// Caller name used when none is given.
pub const DEFAULT_CALLER: &str = "cli";

/// Route prompts to LLM backends with failover.
#[derive(Parser)]
#[command(name = "swb", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to $SWITCHBOARD_CONFIG, then the data dir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Where provider configurations are read from.
    #[arg(long, value_enum, global = true, default_value_t = StoreKind::Toml)]
    pub store: StoreKind,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Write logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Detailed output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Backing store for provider configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// `[[providers]]` entries of the configuration file.
    Toml,
    /// The `provider_configs` table of the SQLite database.
    Sqlite,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a prompt and print the answer.
    Ask {
        /// The question to send.
        prompt: String,

        /// Configuration to try first.
        #[arg(long)]
        config_id: Option<String>,

        /// Caller whose configurations are used.
        #[arg(long, env = "SWITCHBOARD_CALLER", default_value = DEFAULT_CALLER)]
        caller: String,

        /// Print the answer as it arrives.
        #[arg(long)]
        stream: bool,
    },

    /// Turn a description or curl command into an HTTP action plan.
    #[command(alias = "gen")]
    Generate {
        /// Free-form description of the request.
        input: String,

        /// Configuration to try first.
        #[arg(long)]
        config_id: Option<String>,

        /// Caller whose configurations are used.
        #[arg(long, env = "SWITCHBOARD_CALLER", default_value = DEFAULT_CALLER)]
        caller: String,
    },

    /// Pull a JSON value out of saved model output.
    Extract {
        /// File to read (stdin when omitted).
        file: Option<PathBuf>,

        /// Expect an action plan and normalize it.
        #[arg(long)]
        plan: bool,

        /// Original request, used to rebuild an action when nothing is found.
        #[arg(long)]
        input: Option<String>,
    },

    /// Show how credentials in a text would be hidden from a backend.
    Protect {
        /// File to read (stdin when omitted).
        file: Option<PathBuf>,
    },

    /// Manage provider configurations.
    #[command(alias = "provider")]
    Providers {
        #[command(subcommand)]
        action: Option<ProviderAction>,
    },

    /// Show recent calls from the SQLite audit trail.
    History {
        /// How many records to show, newest first.
        #[arg(long, short = 'n', default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Subcommand)]
pub enum ProviderAction {
    /// List configurations visible to a caller.
    #[command(alias = "ls")]
    List {
        /// Caller whose configurations are listed.
        #[arg(long, env = "SWITCHBOARD_CALLER", default_value = DEFAULT_CALLER)]
        caller: String,
    },

    /// Save a configuration (SQLite store only).
    Add {
        /// Configuration id.
        id: String,

        /// Backend kind (openai, anthropic, zhipuai, gemini, deepseek, or any
        /// OpenAI-compatible name).
        #[arg(long)]
        kind: String,

        /// API key for the backend.
        #[arg(long, env = "SWITCHBOARD_PROVIDER_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Base URL (defaults to the kind's endpoint).
        #[arg(long)]
        base_url: Option<String>,

        /// Model name (defaults to the kind's model).
        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        temperature: Option<f64>,

        #[arg(long)]
        max_tokens: Option<u32>,

        /// Owning caller. Shared with every caller when omitted.
        #[arg(long)]
        caller: Option<String>,

        /// Make this the owner's default configuration.
        #[arg(long)]
        default: bool,
    },

    /// Delete a configuration (SQLite store only).
    #[command(alias = "rm")]
    Remove {
        /// Configuration id.
        id: String,
    },

    /// Send a short prompt to one configuration and report the latency.
    Test {
        /// Configuration id.
        id: String,
    },
}

/// Read a whole file, or stdin when no path is given.
pub async fn read_input(file: Option<&Path>) -> anyhow::Result<String> {
    use anyhow::Context;
    use tokio::io::AsyncReadExt;

    match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}
