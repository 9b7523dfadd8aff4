//! Channel client error types.

use tokio_tungstenite::tungstenite;

/// Errors from the channel client.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unable to join {topic}: {reason}")]
    Join { topic: String, reason: String },

    #[error("connection closed")]
    Closed,

    #[error("channel {0} was already joined")]
    AlreadyJoined(String),

    #[error("invalid socket endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ChannelError {
    /// Returns `true` if the broker rejected or never answered a join.
    pub fn is_join_failure(&self) -> bool {
        matches!(self, ChannelError::Join { .. })
    }
}
