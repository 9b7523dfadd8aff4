//! WebSocket connection to the log broker.
//!
//! Owns the socket and the three background pumps (read, write,
//! heartbeat), hands out [`Channel`] handles, and tears everything down
//! when the socket goes away.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{Sink, Stream, StreamExt};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use shiplio_protocol::constants::{MAX_MESSAGE_SIZE, PROTOCOL_VSN};
use shiplio_protocol::{Frame, Reply};

use crate::channel::{Channel, ChannelInner};
use crate::error::ChannelError;

/// How long [`Connection::close`] waits for queued frames to be flushed.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Join replies awaited by in-flight joins, keyed by ref.
pub(crate) type PendingReplies = tokio::sync::Mutex<HashMap<String, oneshot::Sender<Reply>>>;

/// State shared between the connection handle, its channels and the pumps.
pub(crate) struct Shared {
    pub(crate) write_tx: mpsc::Sender<tungstenite::Message>,
    pub(crate) pending: PendingReplies,
    channels: Mutex<HashMap<String, Arc<ChannelInner>>>,
    next_ref: AtomicU64,
    pub(crate) cancel: CancellationToken,
}

impl Shared {
    pub(crate) fn new(write_tx: mpsc::Sender<tungstenite::Message>) -> Self {
        Self {
            write_tx,
            pending: tokio::sync::Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            next_ref: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Returns a fresh message ref, unique for this connection.
    pub(crate) fn make_ref(&self) -> String {
        (self.next_ref.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    /// Queues a frame, waiting for room in the write queue.
    pub(crate) async fn send_frame(&self, frame: &Frame) -> Result<(), ChannelError> {
        let json = frame.encode()?;
        self.write_tx
            .send(tungstenite::Message::Text(json.into()))
            .await
            .map_err(|_| ChannelError::Closed)
    }

    /// Queues a frame without waiting. Usable from synchronous handlers.
    pub(crate) fn try_send_frame(&self, frame: &Frame) -> Result<(), ChannelError> {
        let json = frame.encode()?;
        self.write_tx
            .try_send(tungstenite::Message::Text(json.into()))
            .map_err(|_| ChannelError::Closed)
    }

    /// Looks up the channel registered for `topic`.
    pub(crate) fn channel(&self, topic: &str) -> Option<Arc<ChannelInner>> {
        self.registry().get(topic).cloned()
    }

    pub(crate) fn register(&self, inner: Arc<ChannelInner>) {
        let replaced = self.registry().insert(inner.topic.clone(), inner);
        if let Some(old) = replaced {
            debug!(topic = %old.topic, "replacing existing channel for topic");
            old.mark_closed();
        }
    }

    /// Removes `inner` from the registry if it is still the registered one.
    pub(crate) fn forget(&self, inner: &Arc<ChannelInner>) {
        let mut registry = self.registry();
        if registry
            .get(&inner.topic)
            .is_some_and(|current| Arc::ptr_eq(current, inner))
        {
            registry.remove(&inner.topic);
        }
    }

    pub(crate) fn all_channels(&self) -> Vec<Arc<ChannelInner>> {
        self.registry().values().cloned().collect()
    }

    /// Runs once the socket is gone: fails every pending join, then marks
    /// every channel closed, then stops the remaining pumps.
    pub(crate) async fn shutdown(&self) {
        self.pending.lock().await.clear();
        for channel in self.all_channels() {
            channel.mark_closed();
        }
        self.cancel.cancel();
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<ChannelInner>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One persistent WebSocket connection to the broker.
///
/// The credential is sent once, as a query parameter of the upgrade
/// request. Dropping the connection aborts its background tasks.
pub struct Connection {
    shared: Arc<Shared>,
    read_handle: tokio::task::JoinHandle<()>,
    write_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    heartbeat_handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    /// Opens the socket at `endpoint`, authenticating with `credential`.
    pub async fn connect(endpoint: &str, credential: &str) -> Result<Self, ChannelError> {
        let url = socket_url(endpoint, credential)?;

        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url.as_str(), Some(ws_config), false)
                .await?;
        debug!(endpoint, "socket connected");

        Ok(Self::start(ws_stream))
    }

    /// Spawns the pumps over an already-upgraded socket.
    fn start<S>(ws_stream: S) -> Self
    where
        S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>>
            + Sink<tungstenite::Message, Error = tungstenite::Error>
            + Send
            + Unpin
            + 'static,
    {
        let (write, read) = ws_stream.split();
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let shared = Arc::new(Shared::new(write_tx));

        let write_handle = tokio::spawn(crate::pumps::write::write_pump(
            write,
            write_rx,
            shared.cancel.clone(),
        ));
        let read_handle = tokio::spawn(crate::pumps::read::read_pump(read, shared.clone()));
        let heartbeat_handle =
            tokio::spawn(crate::pumps::heartbeat::heartbeat_pump(shared.clone()));

        Self {
            shared,
            read_handle,
            write_handle: Mutex::new(Some(write_handle)),
            heartbeat_handle,
        }
    }

    /// Creates an unjoined channel for `topic` with the given join params.
    ///
    /// The channel is registered immediately so that handlers added with
    /// [`Channel::on`] before [`Channel::join`] see every event. A second
    /// channel for the same topic replaces (and closes) the first.
    pub fn channel(&self, topic: impl Into<String>, params: serde_json::Value) -> Channel {
        let inner = Arc::new(ChannelInner::new(topic.into(), params));
        self.shared.register(inner.clone());
        Channel::new(inner, self.shared.clone())
    }

    /// Returns `true` once the socket has gone away or been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Token cancelled when the connection ends for any reason.
    pub fn closed(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Leaves every channel and closes the socket. Idempotent.
    ///
    /// Waits (briefly) for the write pump to flush the queued leave frames
    /// and the close frame.
    pub async fn close(&self) {
        for inner in self.shared.all_channels() {
            Channel::new(inner, self.shared.clone()).close();
        }
        self.shared.cancel.cancel();

        let handle = self
            .write_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, handle).await.is_err() {
                debug!("write pump did not flush before close timeout");
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        self.read_handle.abort();
        self.heartbeat_handle.abort();
        if let Some(handle) = self
            .write_handle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

/// Builds the upgrade URL: `<endpoint>?token=<credential>&vsn=2.0.0`.
///
/// `http(s)` endpoints are rewritten to `ws(s)`.
pub fn socket_url(endpoint: &str, credential: &str) -> Result<String, ChannelError> {
    let endpoint = endpoint.trim();
    let base = if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        endpoint.to_string()
    } else {
        return Err(ChannelError::InvalidEndpoint(endpoint.to_string()));
    };

    let separator = if base.contains('?') { '&' } else { '?' };
    let token = utf8_percent_encode(credential, NON_ALPHANUMERIC);
    Ok(format!("{base}{separator}token={token}&vsn={PROTOCOL_VSN}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_appends_token_and_vsn() {
        let url = socket_url("ws://localhost:4000/socket/websocket", "abc").unwrap();
        assert_eq!(
            url,
            "ws://localhost:4000/socket/websocket?token=abc&vsn=2.0.0"
        );
    }

    #[test]
    fn socket_url_encodes_credential() {
        let url = socket_url("wss://api.example.com/socket/websocket", "a b+c/=").unwrap();
        assert!(url.ends_with("?token=a%20b%2Bc%2F%3D&vsn=2.0.0"), "{url}");
    }

    #[test]
    fn socket_url_rewrites_http_schemes() {
        let url = socket_url("https://api.example.com/socket/websocket", "t").unwrap();
        assert!(url.starts_with("wss://api.example.com/"));
        let url = socket_url("http://localhost:4000/socket/websocket", "t").unwrap();
        assert!(url.starts_with("ws://localhost:4000/"));
    }

    #[test]
    fn socket_url_keeps_existing_query() {
        let url = socket_url("ws://h/socket/websocket?region=eu", "t").unwrap();
        assert_eq!(url, "ws://h/socket/websocket?region=eu&token=t&vsn=2.0.0");
    }

    #[test]
    fn socket_url_rejects_unknown_scheme() {
        let err = socket_url("ftp://h/socket", "t").unwrap_err();
        assert!(matches!(err, ChannelError::InvalidEndpoint(_)));
    }

    #[test]
    fn make_ref_is_monotonic() {
        let (tx, _rx) = mpsc::channel(1);
        let shared = Shared::new(tx);
        assert_eq!(shared.make_ref(), "1");
        assert_eq!(shared.make_ref(), "2");
    }

    #[tokio::test]
    async fn register_replaces_and_closes_previous_channel() {
        let (tx, _rx) = mpsc::channel(4);
        let shared = Arc::new(Shared::new(tx));

        let first = Arc::new(ChannelInner::new("logs:p1".into(), serde_json::json!({})));
        shared.register(first.clone());
        let second = Arc::new(ChannelInner::new("logs:p1".into(), serde_json::json!({})));
        shared.register(second.clone());

        assert!(first.closed_token().is_cancelled());
        assert!(Arc::ptr_eq(&shared.channel("logs:p1").unwrap(), &second));

        // Forgetting the stale handle must not evict the live one.
        shared.forget(&first);
        assert!(shared.channel("logs:p1").is_some());
        shared.forget(&second);
        assert!(shared.channel("logs:p1").is_none());
    }

    #[tokio::test]
    async fn shutdown_fails_pending_and_closes_channels() {
        let (tx, _rx) = mpsc::channel(4);
        let shared = Arc::new(Shared::new(tx));
        let inner = Arc::new(ChannelInner::new("logs:p1".into(), serde_json::json!({})));
        shared.register(inner.clone());

        let (reply_tx, reply_rx) = oneshot::channel();
        shared.pending.lock().await.insert("1".into(), reply_tx);

        shared.shutdown().await;

        assert!(reply_rx.await.is_err());
        assert!(inner.closed_token().is_cancelled());
        assert!(shared.cancel.is_cancelled());
    }
}
