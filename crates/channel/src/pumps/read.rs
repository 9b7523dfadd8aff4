//! WebSocket read pump: routes replies and dispatches channel events.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite;
use tracing::{debug, trace, warn};

use shiplio_protocol::Frame;
use shiplio_protocol::constants::{READ_DEADLINE, events};

use crate::connection::Shared;
use crate::types::ChannelState;

/// Reads frames from the WebSocket until it closes, errors, goes silent
/// for [`READ_DEADLINE`], or the connection is cancelled. Then fails every
/// pending join and closes every channel.
pub(crate) async fn read_pump<S>(mut read: S, shared: Arc<Shared>)
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    // Any inbound message resets the deadline; heartbeat replies keep an
    // idle connection alive.
    let deadline = tokio::time::sleep(READ_DEADLINE);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,

            () = &mut deadline => {
                warn!("no traffic from broker, closing connection");
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + READ_DEADLINE);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                handle_text_message(&text, &shared).await;
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = shared.write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Close(frame) => {
                                debug!(?frame, "received close frame");
                                break;
                            }
                            _ => {}
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    shared.shutdown().await;
}

/// Handles one text frame.
async fn handle_text_message(text: &str, shared: &Shared) {
    let frame = match Frame::decode(text) {
        Ok(f) => f,
        Err(e) => {
            warn!("dropping undecodable frame: {e}");
            return;
        }
    };

    trace!(topic = %frame.topic, event = %frame.event, "received frame");

    if frame.is_reply() {
        let reply = match frame.parse_reply() {
            Ok(r) => r,
            Err(e) => {
                warn!(topic = %frame.topic, "malformed reply: {e}");
                return;
            }
        };

        // The state change lands before any event that follows the reply.
        if let Some(channel) = shared.channel(&frame.topic) {
            if channel.is_join_reply(frame.reference.as_deref()) {
                channel.apply_join_reply(&reply);
            }
        }

        let waiter = match frame.reference.as_deref() {
            Some(reference) => shared.pending.lock().await.remove(reference),
            None => None,
        };
        match waiter {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => trace!(topic = %frame.topic, "reply with no waiter"),
        }
        return;
    }

    let Some(channel) = shared.channel(&frame.topic) else {
        trace!(topic = %frame.topic, event = %frame.event, "event for unknown topic");
        return;
    };

    if frame.event == events::CLOSE || frame.event == events::ERROR {
        debug!(topic = %frame.topic, event = %frame.event, "channel closed by broker");
        channel.mark_closed();
        return;
    }

    if channel.state() != ChannelState::Joined {
        trace!(topic = %frame.topic, event = %frame.event, "event outside joined state");
        return;
    }

    match channel.handler(&frame.event) {
        Some(handler) => handler(&frame.payload),
        None => trace!(topic = %frame.topic, event = %frame.event, "no handler"),
    }
}
