//! `shiplio deploy`

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Args;
use tracing::info;

use shiplio_deploy::{DeployPipeline, DeployRequest, HttpUploader};
use shiplio_log_stream::{OutputArbiter, ProgressPolicy};

use crate::GlobalOpts;
use crate::config::{self, ProjectConfig};
use crate::report;

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Project directory
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
}

pub async fn run(args: DeployArgs, global: &GlobalOpts) -> ExitCode {
    let output = OutputArbiter::console(ProgressPolicy::Resume);

    // Dropping the pipeline future on Ctrl+C still removes the archive.
    let result = tokio::select! {
        result = deploy(&args, global, &output) => result,
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output.stop_progress();
            report::failure("Deployment failed", &e);
            ExitCode::FAILURE
        }
    }
}

async fn deploy(args: &DeployArgs, global: &GlobalOpts, output: &OutputArbiter) -> anyhow::Result<()> {
    let project = ProjectConfig::load(&args.path)?;
    let token = config::load_token(&config::home_dir()?)?;
    info!(project = project.display_name(), "deploying");

    let client = reqwest::Client::builder()
        .user_agent(concat!("shiplio-cli/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    let uploader = HttpUploader::new(client, &global.api_url, &token);
    let pipeline = DeployPipeline::new(uploader, output.clone());

    let request = DeployRequest {
        root: args.path.clone(),
        project_id: project.project_id,
        public_env: project.public_env,
        socket_url: global.socket_url.clone(),
        token,
        scratch_dir: std::env::temp_dir(),
    };
    pipeline.run(&request).await?;
    Ok(())
}
