//! Deploy pipeline for the Shiplio CLI.
//!
//! # Pipeline
//!
//! 1. **Package**: build the [`IgnoreRuleSet`] and write a tar.gz of the
//!    project with [`Archiver`]
//! 2. **Subscribe**: join the project's build log topic
//! 3. **Upload**: stream the archive to the deployments endpoint
//! 4. **Follow**: print build logs until the build succeeds or fails
//!
//! The archive is an [`ArchiveFile`] and removes itself when dropped.

pub mod archive;
pub mod error;
pub mod ignore;
pub mod pipeline;
pub mod upload;

pub use archive::{ArchiveFile, Archiver, archive_name};
pub use error::{ArchiveError, DeployError, UploadError};
pub use ignore::{DEFAULT_IGNORES, IGNORE_FILE, IgnoreRuleSet};
pub use pipeline::{DeployPipeline, DeployRequest};
pub use upload::{HttpUploader, Uploader};
