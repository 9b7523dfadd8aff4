//! Typed payloads of the build and runtime log topics.

use serde::{Deserialize, Serialize};

use crate::constants::TERMINAL_STEP;

/// Severity tag carried by a log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Success,
    #[serde(alias = "warning")]
    Warn,
    Error,
    /// Forward compatibility: unknown levels deserialize here.
    #[serde(other)]
    Unknown,
}

impl LogLevel {
    /// Lowercase wire name, used as the rendered tag.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Unknown => "log",
        }
    }
}

/// Payload of a `new_log` event on the build topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl LogEvent {
    /// Returns `true` when this event marks the end of the build.
    pub fn is_terminal(&self) -> bool {
        self.step.as_deref() == Some(TERMINAL_STEP)
    }
}

/// Payload of a `build_complete` event on the build topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildComplete {
    pub url: String,
    /// Build duration in milliseconds.
    #[serde(default)]
    pub duration: u64,
}

/// Payload of a `runtime_log` event on the runtime topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeLog {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}
