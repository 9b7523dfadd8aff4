use serde::{Deserialize, Serialize};

use crate::constants::{MAX_MESSAGE_SIZE, PHOENIX_TOPIC, events};

/// Errors decoding an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame too large ({0} bytes)")]
    Oversized(usize),
}

/// One Phoenix Channels V2 frame.
///
/// Serialized as `[join_ref, ref, topic, event, payload]`. Server pushes
/// carry `null` refs; replies echo the ref of the request they answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireFrame", into = "WireFrame")]
pub struct Frame {
    pub join_ref: Option<String>,
    pub reference: Option<String>,
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct WireFrame(
    Option<String>,
    Option<String>,
    String,
    String,
    serde_json::Value,
);

impl From<WireFrame> for Frame {
    fn from(w: WireFrame) -> Self {
        Self {
            join_ref: w.0,
            reference: w.1,
            topic: w.2,
            event: w.3,
            payload: w.4,
        }
    }
}

impl From<Frame> for WireFrame {
    fn from(f: Frame) -> Self {
        WireFrame(f.join_ref, f.reference, f.topic, f.event, f.payload)
    }
}

impl Frame {
    /// Creates a frame with explicit refs.
    pub fn new(
        join_ref: Option<String>,
        reference: Option<String>,
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            join_ref,
            reference,
            topic: topic.into(),
            event: event.into(),
            payload,
        }
    }

    /// Creates a join request. Phoenix uses the join's own ref as `join_ref`.
    pub fn join(reference: &str, topic: impl Into<String>, params: serde_json::Value) -> Self {
        Self::new(
            Some(reference.to_string()),
            Some(reference.to_string()),
            topic,
            events::JOIN,
            params,
        )
    }

    /// Creates a leave request for a previously joined topic.
    pub fn leave(join_ref: &str, reference: &str, topic: impl Into<String>) -> Self {
        Self::new(
            Some(join_ref.to_string()),
            Some(reference.to_string()),
            topic,
            events::LEAVE,
            serde_json::json!({}),
        )
    }

    /// Creates a connection-level heartbeat.
    pub fn heartbeat(reference: &str) -> Self {
        Self::new(
            None,
            Some(reference.to_string()),
            PHOENIX_TOPIC,
            events::HEARTBEAT,
            serde_json::json!({}),
        )
    }

    /// Creates a server push (no refs). Mostly useful for tests and fakes.
    pub fn push(
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(None, None, topic, event, payload)
    }

    /// Creates the reply a broker sends for `request`.
    pub fn reply_to(request: &Frame, status: ReplyStatus, response: serde_json::Value) -> Self {
        Self::new(
            request.join_ref.clone(),
            request.reference.clone(),
            request.topic.clone(),
            events::REPLY,
            serde_json::json!({ "status": status, "response": response }),
        )
    }

    /// Decodes a text frame, rejecting oversized input before parsing.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(FrameError::Oversized(text.len()));
        }
        Ok(serde_json::from_str(text)?)
    }

    /// Encodes the frame as JSON text.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Returns `true` for `phx_reply` frames.
    pub fn is_reply(&self) -> bool {
        self.event == events::REPLY
    }

    /// Parses the payload of a `phx_reply` frame.
    pub fn parse_reply(&self) -> Result<Reply, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Status of a `phx_reply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
    Timeout,
    /// Forward compatibility: unknown statuses deserialize here.
    #[serde(other)]
    Unknown,
}

/// Payload of a `phx_reply` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub response: serde_json::Value,
}

impl Reply {
    /// Human-readable reason for a non-ok reply.
    ///
    /// Reads `response.reason` when the broker supplied one, falling back
    /// to the status name.
    pub fn reason(&self) -> String {
        if let Some(reason) = self.response.get("reason").and_then(|r| r.as_str()) {
            return reason.to_string();
        }
        match self.status {
            ReplyStatus::Ok => "ok".into(),
            ReplyStatus::Error => "error".into(),
            ReplyStatus::Timeout => "timeout".into(),
            ReplyStatus::Unknown => "unknown reply status".into(),
        }
    }
}
