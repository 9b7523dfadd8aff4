//! `shiplio logs`

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use tracing::warn;

use shiplio_channel::Connection;
use shiplio_log_stream::{CancellationController, OutputArbiter, ProgressPolicy, RuntimeLogSession};

use crate::GlobalOpts;
use crate::config::{self, ProjectConfig};
use crate::report;

#[derive(Debug, Args)]
pub struct LogsArgs {
    /// Number of past lines to replay before following
    #[arg(long)]
    pub tail: Option<u32>,

    /// Project directory
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
}

pub async fn run(args: LogsArgs, global: &GlobalOpts) -> ExitCode {
    let output = OutputArbiter::console(ProgressPolicy::Never);
    match follow(&args, global, &output).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            output.stop_progress();
            report::failure("Fetching logs failed", &e);
            ExitCode::FAILURE
        }
    }
}

async fn follow(args: &LogsArgs, global: &GlobalOpts, output: &OutputArbiter) -> anyhow::Result<u8> {
    let project = ProjectConfig::load(&args.path)?;
    let token = config::load_token(&config::home_dir()?)?;

    output.with_progress(&format!(
        "Connecting to {} log stream...",
        project.display_name()
    ));
    let connection = Connection::connect(&global.socket_url, &token).await?;

    let session =
        match RuntimeLogSession::start(&connection, &project.project_id, args.tail, output.clone())
            .await
        {
            Ok(session) => session,
            Err(e) => {
                connection.close().await;
                return Err(e.into());
            }
        };

    let code = CancellationController::new(output.clone())
        .run(interrupt(), session.channel(), &connection)
        .await;
    Ok(code)
}

async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl+C: {e}");
    }
}
