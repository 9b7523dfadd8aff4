//! Deploy error types.

use std::path::PathBuf;

use shiplio_channel::ChannelError;
use shiplio_log_stream::SessionError;

/// Errors produced while packaging the project.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid ignore pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("project directory {path} is not readable: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot create archive at {path}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors produced while uploading the archive.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload rejected with HTTP {status}")]
    Status { status: u16, body: String },

    #[error("upload transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("cannot read archive: {0}")]
    Io(#[from] std::io::Error),
}

/// Any failure of the deploy pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("cannot encode public environment: {0}")]
    Encode(#[from] serde_json::Error),
}
