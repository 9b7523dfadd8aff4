//! Phoenix Channels client for the Shiplio log broker.
//!
//! One [`Connection`] owns a single WebSocket and multiplexes any number of
//! topic subscriptions over it. Each [`Channel`] joins one topic with a
//! three-way handshake and dispatches inbound events, in arrival order, to
//! the single handler registered for each event name.

pub mod channel;
pub mod connection;
pub mod error;
mod pumps;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod types;

pub use channel::Channel;
pub use connection::Connection;
pub use error::ChannelError;
pub use types::{ChannelState, EventHandler};
