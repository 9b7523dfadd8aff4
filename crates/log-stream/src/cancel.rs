//! Operator-initiated shutdown of a log session.

use std::future::Future;

use tracing::{debug, info};

use shiplio_channel::{Channel, Connection};

use crate::output::OutputArbiter;

/// Exit status after a graceful, operator-requested disconnect.
pub const NEUTRAL_EXIT: u8 = 0;

/// Tears a session down when the operator interrupts it.
pub struct CancellationController {
    output: OutputArbiter,
    notice: String,
    lost_notice: String,
}

impl CancellationController {
    pub fn new(output: OutputArbiter) -> Self {
        Self {
            output,
            notice: "Disconnected from log stream.".into(),
            lost_notice: "Connection to the log stream was lost. Press Ctrl+C to exit.".into(),
        }
    }

    /// Replaces the line written after teardown.
    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = notice.into();
        self
    }

    /// Waits for `interrupt`, then in order: stops the spinner, closes
    /// `channel`, closes `connection` and writes the disconnect notice.
    ///
    /// If the broker drops the connection first, a one-off notice is
    /// written and the controller keeps waiting for the interrupt.
    ///
    /// Returns the exit status for the process, [`NEUTRAL_EXIT`].
    pub async fn run<F>(self, interrupt: F, channel: &Channel, connection: &Connection) -> u8
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        let lost = connection.closed();

        tokio::select! {
            () = &mut interrupt => {}
            () = lost.cancelled() => {
                debug!("connection lost while waiting for interrupt");
                self.output.stop_progress();
                self.output.write_line(&self.lost_notice);
                interrupt.await;
            }
        }

        info!(topic = channel.topic(), "interrupt received, shutting down");
        self.output.stop_progress();
        channel.close();
        connection.close().await;
        self.output.write_line(&self.notice);
        NEUTRAL_EXIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{ProgressPolicy, RecordingTerminal, TerminalOp};
    use shiplio_channel::ChannelState;
    use shiplio_channel::testing::{FakeBroker, Script};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn interrupt_tears_down_in_order() {
        let broker = FakeBroker::start(Script::default()).await;
        let conn = Connection::connect(&broker.endpoint(), "t").await.unwrap();
        let channel = conn.channel("logs:runtime:p1", serde_json::json!({"tail": 50}));
        channel.join().await.unwrap();

        let term = RecordingTerminal::new();
        let output = OutputArbiter::new(term.clone(), ProgressPolicy::Never);
        output.with_progress("Streaming...");

        let (tx, rx) = oneshot::channel::<()>();
        let controller = CancellationController::new(output);
        let interrupt = async move {
            let _ = rx.await;
        };

        tx.send(()).unwrap();
        let code = controller.run(interrupt, &channel, &conn).await;

        assert_eq!(code, NEUTRAL_EXIT);
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(conn.is_closed());
        assert_eq!(
            term.ops(),
            vec![
                TerminalOp::Progress("Streaming...".into()),
                TerminalOp::HideProgress,
                TerminalOp::Line("Disconnected from log stream.".into()),
            ]
        );

        let leave = tokio::time::timeout(Duration::from_secs(2), broker.wait_for("phx_leave"))
            .await
            .expect("leave should reach the broker");
        assert_eq!(leave.topic, "logs:runtime:p1");
    }

    #[tokio::test]
    async fn connection_loss_waits_for_interrupt() {
        let broker = FakeBroker::start(Script {
            close_after: true,
            ..Script::default()
        })
        .await;
        let conn = Connection::connect(&broker.endpoint(), "t").await.unwrap();
        let channel = conn.channel("logs:runtime:p1", serde_json::json!({}));
        channel.join().await.unwrap();

        let term = RecordingTerminal::new();
        let output = OutputArbiter::new(term.clone(), ProgressPolicy::Never);
        let (tx, rx) = oneshot::channel::<()>();
        let controller = CancellationController::new(output).with_notice("bye");

        let handle = tokio::spawn(async move {
            let interrupt = async move {
                let _ = rx.await;
            };
            controller.run(interrupt, &channel, &conn).await
        });

        tokio::time::timeout(Duration::from_secs(2), async {
            while term.lines().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(!handle.is_finished(), "must keep waiting for the interrupt");

        tx.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), NEUTRAL_EXIT);
        let lines = term.lines();
        assert!(lines[0].contains("lost"));
        assert_eq!(lines.last().map(String::as_str), Some("bye"));
    }
}
