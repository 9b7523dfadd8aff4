use std::time::Duration;

/// Protocol version sent as the `vsn` query parameter on connect.
pub const PROTOCOL_VSN: &str = "2.0.0";

/// How long a join waits for its `phx_reply` before giving up.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// How often a heartbeat frame is sent on the `phoenix` topic.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Read deadline for the connection.
///
/// Any inbound frame (heartbeat reply, join reply, event) resets it. If
/// nothing arrives within this window the connection is considered dead.
/// Must comfortably exceed [`HEARTBEAT_INTERVAL`].
pub const READ_DEADLINE: Duration = Duration::from_secs(60);

/// Maximum inbound message size in bytes (16 MB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Topic used for connection-level frames (heartbeats).
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Step identifier marking the final build event.
pub const TERMINAL_STEP: &str = "done";

/// Default number of runtime lines replayed on subscription.
pub const DEFAULT_TAIL: u32 = 50;

/// Control events defined by Phoenix Channels.
pub mod events {
    pub const JOIN: &str = "phx_join";
    pub const LEAVE: &str = "phx_leave";
    pub const REPLY: &str = "phx_reply";
    pub const CLOSE: &str = "phx_close";
    pub const ERROR: &str = "phx_error";
    pub const HEARTBEAT: &str = "heartbeat";

    /// Build log line pushed on `logs:<project-id>`.
    pub const NEW_LOG: &str = "new_log";
    /// Build completion summary pushed on `logs:<project-id>`.
    pub const BUILD_COMPLETE: &str = "build_complete";
    /// Container log line pushed on `logs:runtime:<project-id>`.
    pub const RUNTIME_LOG: &str = "runtime_log";
}

/// Topic carrying build events for a project.
pub fn build_topic(project_id: &str) -> String {
    format!("logs:{project_id}")
}

/// Topic carrying the running container's log tail for a project.
pub fn runtime_topic(project_id: &str) -> String {
    format!("logs:runtime:{project_id}")
}
