//! Wire protocol types for the Shiplio log broker.
//!
//! The broker speaks Phoenix Channels (serializer V2): every frame is a
//! five-element JSON array `[join_ref, ref, topic, event, payload]`.
//! This crate owns the frame codec, the topic and event names used by
//! the deploy tool, and the typed payloads of the build and runtime log
//! streams.

pub mod constants;
pub mod envelope;
pub mod logs;

// Re-export primary types for convenience.
pub use envelope::{Frame, FrameError, Reply, ReplyStatus};
pub use logs::{BuildComplete, LogEvent, LogLevel, RuntimeLog};
