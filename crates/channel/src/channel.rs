//! Topic channels multiplexed over one [`Connection`](crate::Connection).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use shiplio_protocol::constants::JOIN_TIMEOUT;
use shiplio_protocol::{Frame, Reply, ReplyStatus};

use crate::connection::Shared;
use crate::error::ChannelError;
use crate::types::{ChannelState, EventHandler};

struct Lifecycle {
    state: ChannelState,
    join_ref: Option<String>,
}

/// Per-topic state, shared between [`Channel`] handles and the read pump.
pub(crate) struct ChannelInner {
    pub(crate) topic: String,
    params: serde_json::Value,
    lifecycle: Mutex<Lifecycle>,
    handlers: Mutex<HashMap<String, EventHandler>>,
    closed: CancellationToken,
}

impl ChannelInner {
    pub(crate) fn new(topic: String, params: serde_json::Value) -> Self {
        Self {
            topic,
            params,
            lifecycle: Mutex::new(Lifecycle {
                state: ChannelState::Unjoined,
                join_ref: None,
            }),
            handlers: Mutex::new(HashMap::new()),
            closed: CancellationToken::new(),
        }
    }

    pub(crate) fn state(&self) -> ChannelState {
        self.lifecycle().state
    }

    /// Returns the handler for `event`, if any. The lock is released before
    /// the caller invokes it.
    pub(crate) fn handler(&self, event: &str) -> Option<EventHandler> {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .cloned()
    }

    /// Returns `true` when `reference` is the ref of this channel's join.
    pub(crate) fn is_join_reply(&self, reference: Option<&str>) -> bool {
        let lifecycle = self.lifecycle();
        lifecycle.state == ChannelState::Joining
            && reference.is_some()
            && lifecycle.join_ref.as_deref() == reference
    }

    /// Applies the broker's answer to our join.
    pub(crate) fn apply_join_reply(&self, reply: &Reply) {
        if reply.status == ReplyStatus::Ok {
            let mut lifecycle = self.lifecycle();
            if lifecycle.state == ChannelState::Joining {
                lifecycle.state = ChannelState::Joined;
                debug!(topic = %self.topic, "channel joined");
            }
        } else {
            self.mark_closed();
        }
    }

    /// Moves the channel to `Closed` and returns the previous state.
    pub(crate) fn mark_closed(&self) -> ChannelState {
        let previous = {
            let mut lifecycle = self.lifecycle();
            std::mem::replace(&mut lifecycle.state, ChannelState::Closed)
        };
        self.closed.cancel();
        previous
    }

    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one topic on a connection.
///
/// Cheap to clone; all clones share the same state and handlers.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
    shared: Arc<Shared>,
}

impl Channel {
    pub(crate) fn new(inner: Arc<ChannelInner>, shared: Arc<Shared>) -> Self {
        Self { inner, shared }
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    pub fn state(&self) -> ChannelState {
        self.inner.state()
    }

    /// Registers the handler for `event`, replacing any previous one.
    ///
    /// Handlers run on the read pump and must not block.
    pub fn on<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event.into(), Arc::new(handler));
    }

    /// Sends the join request and waits for the broker's reply.
    ///
    /// Fails with [`ChannelError::Join`] when the broker refuses or does not
    /// answer within [`JOIN_TIMEOUT`], and with [`ChannelError::Closed`] when
    /// the connection goes away first.
    pub async fn join(&self) -> Result<(), ChannelError> {
        if self.shared.cancel.is_cancelled() {
            return Err(ChannelError::Closed);
        }

        let reference = self.shared.make_ref();
        {
            let mut lifecycle = self.inner.lifecycle();
            match lifecycle.state {
                ChannelState::Unjoined => {}
                ChannelState::Joining | ChannelState::Joined => {
                    return Err(ChannelError::AlreadyJoined(self.inner.topic.clone()));
                }
                ChannelState::Closed => return Err(ChannelError::Closed),
            }
            lifecycle.state = ChannelState::Joining;
            lifecycle.join_ref = Some(reference.clone());
        }

        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .await
            .insert(reference.clone(), tx);

        let frame = Frame::join(&reference, self.inner.topic.clone(), self.inner.params.clone());
        if let Err(e) = self.shared.send_frame(&frame).await {
            self.shared.pending.lock().await.remove(&reference);
            self.inner.mark_closed();
            return Err(e);
        }
        debug!(topic = %self.inner.topic, reference = %reference, "join sent");

        let outcome = tokio::time::timeout(JOIN_TIMEOUT, rx).await;
        self.shared.pending.lock().await.remove(&reference);

        match outcome {
            Ok(Ok(reply)) if reply.status == ReplyStatus::Ok => Ok(()),
            Ok(Ok(reply)) => {
                self.close();
                Err(ChannelError::Join {
                    topic: self.inner.topic.clone(),
                    reason: reply.reason(),
                })
            }
            Ok(Err(_)) => {
                self.inner.mark_closed();
                Err(ChannelError::Closed)
            }
            Err(_) => {
                warn!(topic = %self.inner.topic, "join timed out");
                self.close();
                Err(ChannelError::Join {
                    topic: self.inner.topic.clone(),
                    reason: "timeout".into(),
                })
            }
        }
    }

    /// Leaves the topic. Idempotent; no handler fires afterwards.
    pub fn close(&self) {
        let previous = self.inner.mark_closed();
        self.shared.forget(&self.inner);
        if previous != ChannelState::Joined || self.shared.cancel.is_cancelled() {
            return;
        }

        let join_ref = self.inner.lifecycle().join_ref.clone();
        if let Some(join_ref) = join_ref {
            let leave = Frame::leave(&join_ref, &self.shared.make_ref(), self.inner.topic.clone());
            if let Err(e) = self.shared.try_send_frame(&leave) {
                debug!(topic = %self.inner.topic, "leave not sent: {e}");
            }
        }
    }

    /// Token cancelled when the channel closes for any reason, including
    /// loss of the underlying connection.
    pub fn closed(&self) -> CancellationToken {
        self.inner.closed_token()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("topic", &self.inner.topic)
            .field("state", &self.state())
            .finish()
    }
}
