//! The capability contract every controllable avatar implements.
//!
//! The dispatcher only ever talks to an `Arc<dyn Actor>`, so the same command
//! logic can drive a remote avatar or the local simulation. Which one is used
//! is decided once at startup.

use crate::{
    pose::{Pose, Target},
    record::Record,
};
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Where an actor is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Connecting,
    /// Spawned. Pose and chat are meaningful from here on.
    Ready,
    /// The session ended after the actor had spawned.
    Disconnected,
    /// The session ended before the actor ever spawned.
    Ended,
}

impl Lifecycle {
    /// Whether the session is over, spawned or not.
    pub fn is_over(self) -> bool {
        matches!(self, Lifecycle::Disconnected | Lifecycle::Ended)
    }

    /// The state an actor moves to when its session ends.
    pub fn closed(self) -> Self {
        match self {
            Lifecycle::Ready | Lifecycle::Disconnected => Lifecycle::Disconnected,
            Lifecycle::Connecting | Lifecycle::Ended => Lifecycle::Ended,
        }
    }
}

/// Reason reported for work attempted after the connection is gone.
pub const CONNECTION_CLOSED: &str = "connection closed";

/// Failures reported by an actor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActorError {
    /// The actor ended before it ever spawned.
    #[error("actor ended before it was ready")]
    NeverReady,
    /// The connection to the avatar is gone.
    #[error("{0}")]
    Disconnected(String),
    /// The navigator gave up. Carries its message verbatim.
    #[error("{0}")]
    Navigation(String),
}

/// A one-shot view of an actor's spawn notification.
///
/// Cloning is cheap; every clone observes the same lifecycle.
#[derive(Debug, Clone)]
pub struct Readiness {
    rx: watch::Receiver<Lifecycle>,
}

impl Readiness {
    pub fn new(rx: watch::Receiver<Lifecycle>) -> Self {
        Self { rx }
    }

    /// A readiness signal frozen in `state`.
    pub fn fixed(state: Lifecycle) -> Self {
        let (_tx, rx) = watch::channel(state);
        Self { rx }
    }

    pub fn current(&self) -> Lifecycle {
        *self.rx.borrow()
    }

    /// Resolves once the actor is ready, or fails if its session is over.
    pub async fn wait(&mut self) -> Result<(), ActorError> {
        let state = match self.current() {
            Lifecycle::Connecting => *self
                .rx
                .wait_for(|s| *s != Lifecycle::Connecting)
                .await
                .map_err(|_| ActorError::NeverReady)?,
            state => state,
        };
        match state {
            Lifecycle::Ready => Ok(()),
            Lifecycle::Disconnected => Err(ActorError::Disconnected(CONNECTION_CLOSED.to_string())),
            Lifecycle::Connecting | Lifecycle::Ended => Err(ActorError::NeverReady),
        }
    }
}

/// Where actors push out-of-band records (spawned, kicked, chat echoes).
///
/// Records go to the same writer as command results, in emission order.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Record>,
}

impl EventSink {
    /// Creates a sink together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Record>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues a record for output. Records emitted after the writer stopped are dropped.
    pub fn emit(&self, record: Record) {
        if self.tx.send(record).is_err() {
            debug!("Dropping record: output writer has stopped.");
        }
    }
}

/// The capabilities the dispatcher needs from an avatar.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Actor: Send + Sync {
    /// The spawn notification. Pose and chat are only meaningful once it resolves.
    fn readiness(&self) -> Readiness;

    /// Sends a chat message. There is no delivery confirmation.
    async fn chat(&self, message: &str) -> Result<(), ActorError>;

    /// A snapshot of the current pose, read at call time.
    fn pose(&self) -> Pose;

    /// Whether this actor has a navigator able to serve `goto`.
    fn can_navigate(&self) -> bool;

    /// Walks to `target`, resolving on arrival or failing with the navigator's reason.
    async fn goto(&self, target: Target) -> Result<(), ActorError>;

    /// Leaves the world. Calling this more than once has no further effect.
    async fn disconnect(&self);
}
