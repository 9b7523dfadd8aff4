//! Log sessions for the Shiplio CLI.
//!
//! A [`BuildLogSession`] follows one deployment's build topic and resolves
//! once with the build's outcome. A [`RuntimeLogSession`] tails the running
//! container until the operator interrupts it, at which point the
//! [`CancellationController`] tears everything down. Both write through a
//! shared [`OutputArbiter`] so spinner frames and log lines never mix.

pub mod build;
pub mod cancel;
pub mod error;
pub mod output;
pub mod render;
pub mod runtime;

pub use build::{BuildLogSession, BuildOutcome, BuildSignal, BuildState, Failure};
pub use cancel::CancellationController;
pub use error::SessionError;
pub use output::{ConsoleTerminal, OutputArbiter, ProgressPolicy, RecordingTerminal, Terminal, TerminalOp};
pub use runtime::RuntimeLogSession;
