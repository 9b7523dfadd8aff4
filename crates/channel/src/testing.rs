//! In-process fake broker for tests.
//!
//! Speaks just enough of the Phoenix protocol to drive a [`Connection`]
//! through join, event delivery and disconnect.
//!
//! [`Connection`]: crate::Connection

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use shiplio_protocol::constants::events;
use shiplio_protocol::{Frame, ReplyStatus};

/// How the broker answers a `phx_join`.
#[derive(Debug, Clone)]
pub enum JoinResponse {
    Ok,
    /// Refuses with `{"reason": ...}`.
    Error(String),
    /// Never replies.
    Silent,
    /// Drops the socket instead of replying.
    Hangup,
}

/// What the broker does on each accepted connection.
#[derive(Debug, Clone)]
pub struct Script {
    pub join: JoinResponse,
    /// Pushed on the joined topic right after a successful join.
    pub pushes: Vec<(String, serde_json::Value)>,
    /// Pause before the pushes start.
    pub push_delay: Duration,
    /// Close the socket once the pushes are sent.
    pub close_after: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            join: JoinResponse::Ok,
            pushes: Vec::new(),
            push_delay: Duration::ZERO,
            close_after: false,
        }
    }
}

impl Script {
    pub fn push(mut self, event: &str, payload: serde_json::Value) -> Self {
        self.pushes.push((event.to_string(), payload));
        self
    }
}

/// A broker listening on a random local port.
pub struct FakeBroker {
    addr: std::net::SocketAddr,
    received: Arc<Mutex<Vec<Frame>>>,
    query: Arc<Mutex<Option<String>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeBroker {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake broker");
        let addr = listener.local_addr().expect("local addr");
        let received = Arc::new(Mutex::new(Vec::new()));
        let query = Arc::new(Mutex::new(None));

        let handle = {
            let received = received.clone();
            let query = query.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let script = script.clone();
                    let received = received.clone();
                    let query = query.clone();
                    tokio::spawn(async move {
                        let capture =
                            move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                                *query.lock().unwrap() = req.uri().query().map(str::to_string);
                                Ok(resp)
                            };
                        if let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, capture).await {
                            serve(ws, script, received).await;
                        }
                    });
                }
            })
        };

        Self {
            addr,
            received,
            query,
            handle,
        }
    }

    /// Socket endpoint to pass to [`crate::Connection::connect`].
    pub fn endpoint(&self) -> String {
        format!("ws://{}/socket/websocket", self.addr)
    }

    /// Every frame received so far, in arrival order.
    pub fn received(&self) -> Vec<Frame> {
        self.received.lock().unwrap().clone()
    }

    /// Query string of the last upgrade request.
    pub fn query(&self) -> Option<String> {
        self.query.lock().unwrap().clone()
    }

    /// Waits until a frame with `event` has been received.
    pub async fn wait_for(&self, event: &str) -> Frame {
        loop {
            if let Some(frame) = self.received().into_iter().find(|f| f.event == event) {
                return frame;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for FakeBroker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    script: Script,
    received: Arc<Mutex<Vec<Frame>>>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut tx, mut rx) = ws.split();

    while let Some(Ok(msg)) = rx.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => return,
            _ => continue,
        };
        let Ok(frame) = Frame::decode(&text) else {
            continue;
        };
        received.lock().unwrap().push(frame.clone());

        match frame.event.as_str() {
            events::JOIN => match &script.join {
                JoinResponse::Ok => {
                    let reply = Frame::reply_to(&frame, ReplyStatus::Ok, serde_json::json!({}));
                    if send(&mut tx, &reply).await.is_err() {
                        return;
                    }
                    if !script.push_delay.is_zero() {
                        tokio::time::sleep(script.push_delay).await;
                    }
                    for (event, payload) in &script.pushes {
                        let push = Frame::new(
                            frame.join_ref.clone(),
                            None,
                            frame.topic.clone(),
                            event.clone(),
                            payload.clone(),
                        );
                        if send(&mut tx, &push).await.is_err() {
                            return;
                        }
                    }
                    if script.close_after {
                        let _ = tx.send(Message::Close(None)).await;
                        return;
                    }
                }
                JoinResponse::Error(reason) => {
                    let reply = Frame::reply_to(
                        &frame,
                        ReplyStatus::Error,
                        serde_json::json!({ "reason": reason }),
                    );
                    if send(&mut tx, &reply).await.is_err() {
                        return;
                    }
                }
                JoinResponse::Silent => {}
                JoinResponse::Hangup => return,
            },
            events::HEARTBEAT | events::LEAVE => {
                let reply = Frame::reply_to(&frame, ReplyStatus::Ok, serde_json::json!({}));
                if send(&mut tx, &reply).await.is_err() {
                    return;
                }
            }
            _ => {}
        }
    }
}

async fn send<W>(tx: &mut W, frame: &Frame) -> Result<(), tungstenite::Error>
where
    W: SinkExt<Message, Error = tungstenite::Error> + Unpin,
{
    let text = frame.encode().map_err(|e| {
        tungstenite::Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    tx.send(Message::Text(text.into())).await
}
