//! Public types for the channel client.

use std::sync::Arc;

/// Handler invoked with the payload of one inbound event.
///
/// Handlers run on the connection's read loop, one event at a time, so
/// they must not block. Calling [`crate::Channel::close`] from inside a
/// handler is allowed.
pub type EventHandler = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Lifecycle of a channel subscription.
///
/// `Unjoined → Joining → Joined → Closed`; a rejected or timed-out join
/// goes straight from `Joining` to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Created and registered, join not yet sent.
    Unjoined,
    /// Join sent, waiting for the broker's reply.
    Joining,
    /// Join acknowledged; events are being delivered.
    Joined,
    /// Left, rejected, or the connection went away.
    Closed,
}
