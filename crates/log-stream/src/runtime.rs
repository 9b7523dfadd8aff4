//! Runtime log tail.

use std::sync::{Arc, Once};

use tracing::{debug, warn};

use shiplio_channel::{Channel, Connection};
use shiplio_protocol::RuntimeLog;
use shiplio_protocol::constants::{DEFAULT_TAIL, events, runtime_topic};

use crate::error::SessionError;
use crate::output::OutputArbiter;
use crate::render;

/// Follows `logs:runtime:<project_id>` until cancelled.
///
/// Has no terminal state of its own; it ends when the
/// [`CancellationController`](crate::CancellationController) closes it.
pub struct RuntimeLogSession {
    channel: Channel,
}

impl RuntimeLogSession {
    /// Joins the runtime topic asking for the last `tail` lines
    /// (default [`DEFAULT_TAIL`]).
    ///
    /// On success a confirmation line is written before any log line.
    pub async fn start(
        connection: &Connection,
        project_id: &str,
        tail: Option<u32>,
        output: OutputArbiter,
    ) -> Result<Self, SessionError> {
        let tail = tail.unwrap_or(DEFAULT_TAIL);
        let channel = connection.channel(
            runtime_topic(project_id),
            serde_json::json!({ "tail": tail }),
        );

        let confirmed = Arc::new(Once::new());
        let confirm = {
            let confirmed = confirmed.clone();
            let output = output.clone();
            let line = render::runtime_connected(project_id);
            move || confirmed.call_once(|| output.write_line(&line))
        };

        // Replayed lines can be dispatched before `join` returns.
        let on_event_confirm = confirm.clone();
        channel.on(events::RUNTIME_LOG, move |payload| {
            match serde_json::from_value::<RuntimeLog>(payload.clone()) {
                Ok(log) => {
                    on_event_confirm();
                    output.write_line(&render::runtime_line(&log));
                }
                Err(e) => warn!("malformed runtime_log payload: {e}"),
            }
        });

        channel.join().await?;
        confirm();
        debug!(project_id, tail, "runtime log tail started");

        Ok(Self { channel })
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}
