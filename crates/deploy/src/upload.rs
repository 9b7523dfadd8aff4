//! Archive upload.
//!
//! The [`Uploader`] trait keeps the pipeline independent of HTTP so it can
//! be driven with a fake in tests. [`HttpUploader`] is the real thing: one
//! multipart `POST /projects/{id}/deployments`, streaming the archive from
//! disk without buffering it.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::error::UploadError;

/// Multipart field carrying the archive.
pub const FILE_FIELD: &str = "file";
/// Multipart field carrying the JSON-encoded public environment.
pub const PUBLIC_ENV_FIELD: &str = "public_env";

const ARCHIVE_MIME: &str = "application/gzip";

/// Sends an archive to the deployment API.
pub trait Uploader: Send + Sync {
    /// Uploads `archive` for `project_id` together with extra text fields.
    ///
    /// The archive is read once, front to back. Nothing is retried.
    fn upload<'a>(
        &'a self,
        archive: &'a Path,
        project_id: &'a str,
        fields: &'a [(String, String)],
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>>;
}

/// Uploader over the Shiplio REST API.
pub struct HttpUploader {
    client: Client,
    api_url: String,
    token: String,
}

impl HttpUploader {
    pub fn new(client: Client, api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            token: token.into(),
        }
    }

    /// `{api_url}/projects/{project_id}/deployments`.
    pub fn deployments_url(&self, project_id: &str) -> String {
        format!(
            "{}/projects/{project_id}/deployments",
            self.api_url.trim_end_matches('/')
        )
    }

    async fn send(
        &self,
        archive: &Path,
        project_id: &str,
        fields: &[(String, String)],
    ) -> Result<(), UploadError> {
        let file = tokio::fs::File::open(archive).await?;
        let len = file.metadata().await?.len();

        let filename = format!("upload-{}.tar.gz", chrono::Utc::now().timestamp_millis());
        let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), len)
            .file_name(filename)
            .mime_str(ARCHIVE_MIME)?;

        let mut form = Form::new().part(FILE_FIELD, part);
        for (name, value) in fields {
            form = form.text(name.clone(), value.clone());
        }

        let url = self.deployments_url(project_id);
        debug!(%url, bytes = len, "uploading archive");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(project_id, "upload accepted");
        Ok(())
    }
}

impl Uploader for HttpUploader {
    fn upload<'a>(
        &'a self,
        archive: &'a Path,
        project_id: &'a str,
        fields: &'a [(String, String)],
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>> {
        Box::pin(self.send(archive, project_id, fields))
    }
}

impl UploadError {
    /// HTTP status, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Io(_) => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED.as_u16())
    }

    /// Human-readable reasons from the API's JSON error body.
    ///
    /// Reads the first of `errors`, `error` or `message`. A string becomes
    /// one line; an object yields one line per message, prefixed with the
    /// capitalised field name.
    pub fn details(&self) -> Vec<String> {
        let Self::Status { body, .. } = self else {
            return Vec::new();
        };
        let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
            return Vec::new();
        };
        let reasons = ["errors", "error", "message"]
            .iter()
            .filter_map(|key| json.get(key))
            .find(|v| is_truthy(v));

        match reasons {
            Some(serde_json::Value::String(s)) => vec![capitalize(s)],
            Some(serde_json::Value::Object(map)) => {
                let mut lines = Vec::new();
                for (field, messages) in map {
                    match messages {
                        serde_json::Value::Array(items) => {
                            for msg in items {
                                let msg = msg.as_str().map_or_else(|| msg.to_string(), str::to_string);
                                lines.push(format!("{} {msg}", capitalize(field)));
                            }
                        }
                        serde_json::Value::String(msg) => {
                            if matches!(field.to_lowercase().as_str(), "error" | "message") {
                                lines.push(msg.clone());
                            } else {
                                lines.push(format!("{} {msg}", capitalize(field)));
                            }
                        }
                        _ => {}
                    }
                }
                lines
            }
            _ => Vec::new(),
        }
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
