//! Heartbeat pump: keeps the broker from reaping an idle socket.

use std::sync::Arc;

use tracing::trace;

use shiplio_protocol::Frame;
use shiplio_protocol::constants::HEARTBEAT_INTERVAL;

use crate::connection::Shared;

/// Sends a `heartbeat` on the `phoenix` topic every [`HEARTBEAT_INTERVAL`].
///
/// The broker's replies also reset the read pump's deadline.
pub(crate) async fn heartbeat_pump(shared: Arc<Shared>) {
    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = interval.tick() => {
                let frame = Frame::heartbeat(&shared.make_ref());
                trace!(reference = ?frame.reference, "sending heartbeat");
                if shared.send_frame(&frame).await.is_err() {
                    break;
                }
            }
        }
    }
}
