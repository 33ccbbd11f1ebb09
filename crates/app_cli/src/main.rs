//! Terminal front end for the productivity dashboard.
//!
//! Each invocation loads config and secrets, signs in with the stored
//! session token and runs one command against the dashboard gateway.

mod commands;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use core_types::IssueTrackerDataKind;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dashboard")]
#[command(author, version, about = "Productivity dashboard client")]
struct Cli {
    /// Gateway base url (overrides config and DASHBOARD_GATEWAY_URL)
    #[arg(long, global = true)]
    gateway: Option<String>,

    /// Password for the encrypted secrets file
    #[arg(long, global = true, env = "DASHBOARD_SECRETS_PASSWORD", hide_env_values = true)]
    secrets_password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify a session token and remember it
    Login {
        #[arg(long)]
        token: String,
    },
    /// End the session and forget the stored token
    Logout,
    /// Show integration status
    Status,
    /// Trigger a sync of every connected integration
    Sync,
    /// Check gateway health
    Health,
    /// Show a task view (summary by default)
    Tasks {
        #[command(subcommand)]
        view: Option<TaskView>,
    },
    /// Connect an integration
    Connect {
        /// Integration id, e.g. `mail`, `issue-tracker`, `chat-workspace`
        integration: String,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        api_token: Option<String>,
        /// Keep the issue tracker credentials in the secrets file
        #[arg(long)]
        save: bool,
    },
    /// Disconnect an integration
    Disconnect { integration: String },
    /// Fetch cached data for one integration
    Fetch { integration: String },
    /// Fetch issue tracker records
    Issues {
        #[arg(long, value_enum, default_value_t = IssueKindArg::Issues)]
        kind: IssueKindArg,
    },
    /// Interactive assistant chat
    Chat {
        /// Resume an existing thread
        #[arg(long)]
        thread: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum TaskView {
    /// Counts and upcoming deadlines
    Summary,
    /// Prioritized tasks and recommendations
    Analysis,
    /// Narrative summary of the week
    Weekly,
    /// Every task gathered from connected sources
    All,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum IssueKindArg {
    Issues,
    Projects,
}

impl From<IssueKindArg> for IssueTrackerDataKind {
    fn from(value: IssueKindArg) -> Self {
        match value {
            IssueKindArg::Issues => IssueTrackerDataKind::Issues,
            IssueKindArg::Projects => IssueTrackerDataKind::Projects,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    data_dir.push(config::APP_DIR_NAME);
    if let Err(err) = fs::create_dir_all(&data_dir) {
        eprintln!("failed to prepare data dir: {err}");
    }
    let _log_guard = init_local_logger(&data_dir.join("logs"));

    commands::run(cli, &data_dir).await
}

fn init_local_logger(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("failed to create log dir `{}`: {err}", log_dir.display());
    }
    let file_appender = tracing_appender::rolling::daily(log_dir, "dashboard.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,app_cli=debug,core_coordinator=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_writer(writer)
        .init();

    guard
}
