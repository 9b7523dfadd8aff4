//! The `deploy` flow end to end.
//!
//! Package, subscribe to the build topic, upload, then follow the build
//! until it reports an outcome. The build topic is joined before the
//! upload is sent so that no log line from a fast build is missed.

use std::collections::BTreeMap;
use std::path::PathBuf;

use console::style;
use tracing::{debug, info};

use shiplio_channel::Connection;
use shiplio_log_stream::{BuildLogSession, OutputArbiter};

use crate::archive::{ArchiveFile, Archiver, archive_name};
use crate::error::{ArchiveError, DeployError};
use crate::ignore::IgnoreRuleSet;
use crate::upload::{PUBLIC_ENV_FIELD, Uploader};

pub const PACKAGING: &str = "Packaging project...";
pub const UPLOADING: &str = "Uploading to Shiplio...";
pub const UPLOAD_COMPLETE: &str = "Upload complete!";
pub const BUILD_STARTED: &str = "--- Remote Build Started ---";
pub const BUILDING: &str = "Building...";

/// Everything one deployment needs.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Project directory to package.
    pub root: PathBuf,
    pub project_id: String,
    /// Sent JSON-encoded in the `public_env` field.
    pub public_env: BTreeMap<String, String>,
    /// Log broker endpoint.
    pub socket_url: String,
    pub token: String,
    /// Directory the archive is written to before upload.
    pub scratch_dir: PathBuf,
}

pub struct DeployPipeline<U> {
    uploader: U,
    output: OutputArbiter,
}

impl<U: Uploader> DeployPipeline<U> {
    pub fn new(uploader: U, output: OutputArbiter) -> Self {
        Self { uploader, output }
    }

    /// Runs one deployment.
    ///
    /// Resolves once the build reports success or failure. The archive is
    /// deleted as soon as the upload finishes, whatever its result, and
    /// also if this future is dropped midway. No progress indicator is
    /// left running on return.
    pub async fn run(&self, request: &DeployRequest) -> Result<(), DeployError> {
        let result = self.run_inner(request).await;
        self.output.stop_progress();
        result
    }

    async fn run_inner(&self, request: &DeployRequest) -> Result<(), DeployError> {
        self.output.with_progress(PACKAGING);
        let archive = package(request.root.clone(), request.scratch_dir.clone()).await?;
        info!(
            path = %archive.path().display(),
            entries = archive.entries(),
            "project packaged"
        );

        let connection = Connection::connect(&request.socket_url, &request.token).await?;
        let result = self.ship(&connection, archive, request).await;
        connection.close().await;
        result
    }

    async fn ship(
        &self,
        connection: &Connection,
        archive: ArchiveFile,
        request: &DeployRequest,
    ) -> Result<(), DeployError> {
        let session =
            BuildLogSession::start(connection, &request.project_id, self.output.clone()).await?;

        self.output.with_progress(UPLOADING);
        let public_env = serde_json::to_string(&request.public_env)?;
        let fields = [(PUBLIC_ENV_FIELD.to_string(), public_env)];

        let uploaded = self
            .uploader
            .upload(archive.path(), &request.project_id, &fields)
            .await;
        drop(archive);
        uploaded?;

        self.output.stop_progress();
        self.output
            .write_line(&style(format!("✔ {UPLOAD_COMPLETE}")).green().to_string());
        // A fast build may have finished while the upload was in flight.
        if !session.is_done() {
            self.output.write_line(&style(BUILD_STARTED).dim().to_string());
            self.output.with_progress(BUILDING);
        }

        session.wait().await?;
        Ok(())
    }
}

/// Builds the ignore rules and the archive off the async runtime.
async fn package(root: PathBuf, scratch_dir: PathBuf) -> Result<ArchiveFile, ArchiveError> {
    tokio::task::spawn_blocking(move || {
        let name = archive_name();
        let rules = IgnoreRuleSet::build(&root, &name)?;
        debug!(patterns = ?rules.patterns(), "ignore rules");
        Archiver::new(root, rules).create(&scratch_dir.join(name))
    })
    .await
    .map_err(|e| ArchiveError::Io(std::io::Error::other(e)))?
}
