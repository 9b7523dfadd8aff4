//! Session error types.

use shiplio_channel::ChannelError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Join(#[from] ChannelError),

    #[error("connection to the log stream closed before the build finished")]
    Protocol,

    #[error("build failed")]
    BuildFailed,
}
