//! CLI configuration.
//!
//! - Project link: `<project>/.shiplio/config.json`
//! - Session:      `~/.shiplio_session`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::Deserialize;

pub const DEFAULT_API_URL: &str = "http://localhost:4000/api";
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:4000/socket/websocket";

const PROJECT_DIR: &str = ".shiplio";
const PROJECT_FILE: &str = "config.json";
const SESSION_FILE: &str = ".shiplio_session";

pub const NOT_LINKED: &str = "No Shiplio project found. Run 'shiplio init' first.";
pub const NOT_LOGGED_IN: &str = "You are not logged in. Run 'shiplio login' to get started.";

/// The project a directory is linked to.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: String,
    pub project_id: String,
    /// Public environment sent with every deployment.
    #[serde(default)]
    pub public_env: BTreeMap<String, String>,
}

impl ProjectConfig {
    /// Reads the link file under `root`.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let path = project_config_path(root);
        if !path.is_file() {
            bail!(NOT_LINKED);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        if config.project_id.trim().is_empty() {
            bail!(NOT_LINKED);
        }
        Ok(config)
    }

    /// Name for messages, falling back to the project id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.project_id
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionFile {
    #[serde(default)]
    token: String,
}

/// Reads the bearer token stored by `shiplio login`.
pub fn load_token(home: &Path) -> anyhow::Result<String> {
    let path = home.join(SESSION_FILE);
    if !path.is_file() {
        bail!(NOT_LOGGED_IN);
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    match serde_json::from_str::<SessionFile>(&content) {
        Ok(session) if !session.token.is_empty() => Ok(session.token),
        Ok(_) => bail!(NOT_LOGGED_IN),
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to parse session file: {e}");
            bail!(NOT_LOGGED_IN)
        }
    }
}

pub fn project_config_path(root: &Path) -> PathBuf {
    root.join(PROJECT_DIR).join(PROJECT_FILE)
}

/// The user's home directory.
pub fn home_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    let var = "USERPROFILE";
    #[cfg(not(target_os = "windows"))]
    let var = "HOME";

    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .with_context(|| format!("{var} is not set"))
}
