//! `shiplio`: deploy a project and follow its logs.

mod commands;
mod config;
mod report;

use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::deploy::DeployArgs;
use commands::logs::LogsArgs;

#[derive(Debug, Parser)]
#[command(name = "shiplio", version, about = "Deploy and inspect Shiplio projects")]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Command,
}

/// Options shared by every command.
#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// REST API base URL
    #[arg(long, global = true, env = "SHIPLIO_API_URL", default_value = config::DEFAULT_API_URL)]
    pub api_url: String,

    /// Log broker WebSocket URL
    #[arg(long, global = true, env = "SHIPLIO_SOCKET_URL", default_value = config::DEFAULT_SOCKET_URL)]
    pub socket_url: String,

    /// Verbose diagnostics on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Package, upload and build the current project
    Deploy(DeployArgs),
    /// Stream runtime logs until Ctrl+C
    Logs(LogsArgs),
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug,shiplio=trace" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    match cli.command {
        Command::Deploy(args) => commands::deploy::run(args, &cli.global).await,
        Command::Logs(args) => commands::logs::run(args, &cli.global).await,
    }
}
