//! Build log session.
//!
//! The session's state lives in a pure reducer, [`reduce`], which folds
//! every signal (join result, log events, completion, connection loss) into
//! one [`BuildState`]. Both success paths, a terminal `new_log` and a
//! `build_complete`, go through the same reducer, so the outcome can only
//! be decided once.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use shiplio_channel::{Channel, ChannelError, Connection};
use shiplio_protocol::constants::{build_topic, events};
use shiplio_protocol::{BuildComplete, LogEvent, LogLevel};

use crate::error::SessionError;
use crate::output::OutputArbiter;
use crate::render;

/// Why a build session failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The broker refused the join or never answered it.
    JoinRejected(String),
    /// The terminal step reported a non-success level.
    BuildFailed,
    /// The connection went away before a terminal event.
    ConnectionLost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Pending,
    Succeeded,
    Failed(Failure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildState {
    Joining,
    Streaming,
    /// Terminal. The outcome is never [`BuildOutcome::Pending`].
    Done(BuildOutcome),
}

impl BuildState {
    pub fn outcome(&self) -> BuildOutcome {
        match self {
            BuildState::Done(outcome) => outcome.clone(),
            _ => BuildOutcome::Pending,
        }
    }
}

/// Inputs to the reducer.
#[derive(Debug, Clone)]
pub enum BuildSignal {
    Joined,
    JoinFailed(String),
    Log(LogEvent),
    Complete(BuildComplete),
    ConnectionLost,
}

/// Side effects requested by the reducer, applied in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Print a build log line.
    Line(LogEvent),
    /// Print the completion summary.
    Summary(BuildComplete),
    /// Announce the verdict carried by a terminal log event.
    Announce(BuildOutcome),
    /// Resolve the session's awaitable.
    Resolve(BuildOutcome),
}

/// Folds one signal into the state.
pub fn reduce(state: &BuildState, signal: BuildSignal) -> (BuildState, Vec<Effect>) {
    if let BuildState::Done(_) = state {
        return (state.clone(), Vec::new());
    }

    match signal {
        BuildSignal::Joined => (BuildState::Streaming, Vec::new()),

        BuildSignal::JoinFailed(reason) => {
            if *state == BuildState::Joining {
                done(BuildOutcome::Failed(Failure::JoinRejected(reason)), Vec::new())
            } else {
                (state.clone(), Vec::new())
            }
        }

        // Events can reach us before the join call itself returns; they
        // count as streaming.
        BuildSignal::Log(event) if event.is_terminal() => {
            let outcome = if event.level == LogLevel::Success {
                BuildOutcome::Succeeded
            } else {
                BuildOutcome::Failed(Failure::BuildFailed)
            };
            done(
                outcome.clone(),
                vec![Effect::Line(event), Effect::Announce(outcome)],
            )
        }
        BuildSignal::Log(event) => (BuildState::Streaming, vec![Effect::Line(event)]),

        BuildSignal::Complete(summary) => {
            done(BuildOutcome::Succeeded, vec![Effect::Summary(summary)])
        }

        BuildSignal::ConnectionLost => {
            done(BuildOutcome::Failed(Failure::ConnectionLost), Vec::new())
        }
    }
}

fn done(outcome: BuildOutcome, mut effects: Vec<Effect>) -> (BuildState, Vec<Effect>) {
    effects.push(Effect::Resolve(outcome.clone()));
    (BuildState::Done(outcome), effects)
}

/// Applies signals to the state and carries out their effects.
struct Driver {
    state: BuildState,
    output: OutputArbiter,
    resolve: Option<oneshot::Sender<BuildOutcome>>,
}

impl Driver {
    fn feed(&mut self, signal: BuildSignal) {
        let (next, effects) = reduce(&self.state, signal);
        if next != self.state {
            debug!(from = ?self.state, to = ?next, "build session transition");
        }
        self.state = next;

        for effect in effects {
            match effect {
                Effect::Line(event) => {
                    self.output
                        .log_line(&render::build_line(&event), event.message.trim());
                }
                Effect::Summary(summary) => {
                    self.output.stop_progress();
                    for line in render::success_summary(&summary) {
                        self.output.write_line(&line);
                    }
                }
                Effect::Announce(outcome) => {
                    self.output.stop_progress();
                    let line = match outcome {
                        BuildOutcome::Succeeded => render::build_succeeded(),
                        _ => render::build_failed(),
                    };
                    self.output.write_line(&line);
                }
                Effect::Resolve(outcome) => {
                    self.output.stop_progress();
                    info!(?outcome, "build session finished");
                    if let Some(tx) = self.resolve.take() {
                        let _ = tx.send(outcome);
                    }
                }
            }
        }
    }
}

type SharedDriver = Arc<Mutex<Driver>>;

fn feed(driver: &SharedDriver, signal: BuildSignal) {
    driver
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .feed(signal);
}

/// Follows the build topic of one deployment.
pub struct BuildLogSession {
    channel: Channel,
    driver: SharedDriver,
    outcome: oneshot::Receiver<BuildOutcome>,
    watcher: tokio::task::JoinHandle<()>,
}

impl BuildLogSession {
    /// Joins `logs:<project_id>` and starts following it.
    ///
    /// Handlers are in place before the join is sent, so no event that
    /// follows the join reply is missed. A rejected or timed-out join is
    /// returned as an error; nothing is streamed in that case.
    pub async fn start(
        connection: &Connection,
        project_id: &str,
        output: OutputArbiter,
    ) -> Result<Self, SessionError> {
        let (tx, rx) = oneshot::channel();
        let driver: SharedDriver = Arc::new(Mutex::new(Driver {
            state: BuildState::Joining,
            output,
            resolve: Some(tx),
        }));

        let channel = connection.channel(build_topic(project_id), serde_json::json!({}));

        let d = driver.clone();
        channel.on(events::NEW_LOG, move |payload| {
            match serde_json::from_value::<LogEvent>(payload.clone()) {
                Ok(event) => feed(&d, BuildSignal::Log(event)),
                Err(e) => warn!("malformed new_log payload: {e}"),
            }
        });

        let d = driver.clone();
        channel.on(events::BUILD_COMPLETE, move |payload| {
            match serde_json::from_value::<BuildComplete>(payload.clone()) {
                Ok(summary) => feed(&d, BuildSignal::Complete(summary)),
                Err(e) => warn!("malformed build_complete payload: {e}"),
            }
        });

        if let Err(e) = channel.join().await {
            feed(&driver, BuildSignal::JoinFailed(e.to_string()));
            return Err(SessionError::Join(e));
        }
        feed(&driver, BuildSignal::Joined);

        // Everything received before the socket died has already been
        // dispatched by the time the channel is marked closed.
        let closed = channel.closed();
        let d = driver.clone();
        let watcher = tokio::spawn(async move {
            closed.cancelled().await;
            feed(&d, BuildSignal::ConnectionLost);
        });

        Ok(Self {
            channel,
            driver,
            outcome: rx,
            watcher,
        })
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// `true` once the build has reported an outcome, even if nobody has
    /// awaited it yet.
    pub fn is_done(&self) -> bool {
        let driver = self.driver.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(driver.state, BuildState::Done(_))
    }

    /// Waits for the build to finish. There is no client-side timeout.
    pub async fn wait(self) -> Result<(), SessionError> {
        let Self {
            channel,
            outcome,
            watcher,
            ..
        } = self;

        let outcome = outcome.await.unwrap_or(BuildOutcome::Failed(Failure::ConnectionLost));
        channel.close();
        watcher.abort();

        match outcome {
            BuildOutcome::Succeeded => Ok(()),
            BuildOutcome::Failed(Failure::BuildFailed) => Err(SessionError::BuildFailed),
            BuildOutcome::Failed(Failure::JoinRejected(reason)) => {
                Err(SessionError::Join(ChannelError::Join {
                    topic: channel.topic().to_string(),
                    reason,
                }))
            }
            BuildOutcome::Failed(Failure::ConnectionLost) | BuildOutcome::Pending => {
                Err(SessionError::Protocol)
            }
        }
    }
}
