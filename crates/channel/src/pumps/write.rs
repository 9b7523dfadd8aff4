//! WebSocket write pump: serialises outbound frames.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Writes queued messages to the WebSocket.
///
/// On cancellation, frames already queued (leave requests) are flushed
/// before the close frame.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            msg = write_rx.recv() => {
                match msg {
                    Some(m) => {
                        if let Err(e) = write.send(m).await {
                            error!("WebSocket write error: {e}");
                            return;
                        }
                    }
                    None => break,
                }
            }
            _ = cancel.cancelled() => {
                while let Ok(m) = write_rx.try_recv() {
                    if write.send(m).await.is_err() {
                        return;
                    }
                }
                break;
            }
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;

    fn capture_sink(
        tx: mpsc::Sender<tungstenite::Message>,
    ) -> impl SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin {
        Box::pin(sink::unfold(tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg).await;
            Ok::<_, tungstenite::Error>(tx)
        }))
    }

    #[tokio::test]
    async fn write_pump_stops_on_cancel() {
        let (sink_tx, mut sink_rx) = mpsc::channel::<tungstenite::Message>(16);
        let cancel = CancellationToken::new();

        let (_write_tx, write_rx) = mpsc::channel(16);
        let c = cancel.clone();
        let handle = tokio::spawn(async move {
            write_pump(capture_sink(sink_tx), write_rx, c).await;
        });

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");

        let close_msg = sink_rx.recv().await;
        assert!(matches!(close_msg, Some(tungstenite::Message::Close(_))));
    }

    #[tokio::test]
    async fn write_pump_flushes_queue_before_close() {
        let (sink_tx, mut sink_rx) = mpsc::channel::<tungstenite::Message>(16);
        let cancel = CancellationToken::new();

        let (write_tx, write_rx) = mpsc::channel(16);
        write_tx
            .send(tungstenite::Message::Text("leave".into()))
            .await
            .unwrap();
        cancel.cancel();

        write_pump(capture_sink(sink_tx), write_rx, cancel).await;

        assert!(matches!(
            sink_rx.recv().await,
            Some(tungstenite::Message::Text(t)) if t.as_str() == "leave"
        ));
        assert!(matches!(
            sink_rx.recv().await,
            Some(tungstenite::Message::Close(_))
        ));
    }
}
