//! A deterministic, network-free actor.
//!
//! The simulation spawns after a fixed delay, reaches every navigation goal
//! after a fixed delay, and lands exactly on the requested block. Chat lines
//! are echoed to the output stream instead of being sent anywhere, which makes
//! the whole command path observable without a live server.

use crate::{
    actor::{Actor, ActorError, EventSink, Lifecycle, Readiness},
    pose::{Pose, Target},
    record::Record,
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{debug, info};

/// Delays that stand in for spawn latency and travel time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedTiming {
    pub spawn_delay: Duration,
    pub travel_delay: Duration,
}

impl Default for SimulatedTiming {
    fn default() -> Self {
        Self {
            spawn_delay: Duration::from_millis(200),
            travel_delay: Duration::from_millis(300),
        }
    }
}

impl SimulatedTiming {
    /// No delays at all; useful for tests.
    pub fn instant() -> Self {
        Self {
            spawn_delay: Duration::ZERO,
            travel_delay: Duration::ZERO,
        }
    }
}

/// Where the simulated actor stands when it spawns.
pub const SPAWN_POSE: Pose = Pose {
    x: 0.0,
    y: 64.0,
    z: 0.0,
    yaw: 0.0,
};

pub struct SimulatedActor {
    pose: watch::Sender<Pose>,
    lifecycle: watch::Sender<Lifecycle>,
    sink: EventSink,
    timing: SimulatedTiming,
}

impl SimulatedActor {
    /// Creates the actor and schedules its spawn after `timing.spawn_delay`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(start: Pose, timing: SimulatedTiming, sink: EventSink) -> Arc<Self> {
        let (pose, _) = watch::channel(start);
        let (lifecycle, _) = watch::channel(Lifecycle::Connecting);
        let actor = Arc::new(Self {
            pose,
            lifecycle,
            sink,
            timing,
        });

        let spawning = Arc::clone(&actor);
        tokio::spawn(async move {
            tokio::time::sleep(spawning.timing.spawn_delay).await;
            spawning.mark_ready();
        });
        actor
    }

    fn mark_ready(&self) {
        let spawned = self.lifecycle.send_if_modified(|state| {
            if *state != Lifecycle::Connecting {
                return false;
            }
            // Queued before any waiter can observe `Ready`.
            self.sink.emit(Record::Ready);
            *state = Lifecycle::Ready;
            true
        });
        if spawned {
            info!(pose = ?self.pose(), "Simulated actor spawned.");
        }
    }
}

#[async_trait]
impl Actor for SimulatedActor {
    fn readiness(&self) -> Readiness {
        Readiness::new(self.lifecycle.subscribe())
    }

    async fn chat(&self, message: &str) -> Result<(), ActorError> {
        self.sink.emit(Record::Chat {
            message: message.to_string(),
        });
        Ok(())
    }

    fn pose(&self) -> Pose {
        *self.pose.borrow()
    }

    fn can_navigate(&self) -> bool {
        true
    }

    async fn goto(&self, target: Target) -> Result<(), ActorError> {
        debug!(?target, "Simulated actor travelling.");
        tokio::time::sleep(self.timing.travel_delay).await;
        self.pose.send_modify(|pose| *pose = pose.arrived_at(target));
        Ok(())
    }

    async fn disconnect(&self) {
        let ended = self.lifecycle.send_if_modified(|state| {
            let closed = state.closed();
            let changed = *state != closed;
            *state = closed;
            changed
        });
        if ended {
            info!("Simulated actor left the world.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Instant, timeout};

    #[tokio::test(start_paused = true)]
    async fn test_spawns_after_delay_and_announces_ready() {
        let (sink, mut records) = EventSink::channel();
        let actor = SimulatedActor::spawn(SPAWN_POSE, SimulatedTiming::default(), sink);
        assert_eq!(actor.readiness().current(), Lifecycle::Connecting);

        let started = Instant::now();
        actor.readiness().wait().await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(records.recv().await, Some(Record::Ready));
    }

    #[tokio::test(start_paused = true)]
    async fn test_goto_lands_exactly_on_target() {
        let (sink, _records) = EventSink::channel();
        let actor = SimulatedActor::spawn(
            Pose::new(0.3, 64.7, -0.2, 1.0),
            SimulatedTiming::default(),
            sink,
        );
        actor.readiness().wait().await.unwrap();

        let target = Target::new(12, 64, -40);
        actor.goto(target).await.unwrap();

        assert_eq!(actor.pose(), Pose::new(12.0, 64.0, -40.0, 1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_goto_waits_for_travel_delay() {
        let (sink, _records) = EventSink::channel();
        let timing = SimulatedTiming {
            spawn_delay: Duration::ZERO,
            travel_delay: Duration::from_secs(2),
        };
        let actor = SimulatedActor::spawn(SPAWN_POSE, timing, sink);

        let pending = timeout(Duration::from_secs(1), actor.goto(Target::new(1, 64, 1))).await;
        assert!(pending.is_err());
        assert_eq!(actor.pose(), SPAWN_POSE);
    }

    #[tokio::test]
    async fn test_chat_is_echoed_as_record() {
        let (sink, mut records) = EventSink::channel();
        let actor = SimulatedActor::spawn(SPAWN_POSE, SimulatedTiming::instant(), sink);
        actor.readiness().wait().await.unwrap();
        assert_eq!(records.recv().await, Some(Record::Ready));

        actor.chat("hello there").await.unwrap();
        assert_eq!(
            records.recv().await,
            Some(Record::Chat {
                message: "hello there".into()
            })
        );
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (sink, mut records) = EventSink::channel();
        let actor = SimulatedActor::spawn(SPAWN_POSE, SimulatedTiming::instant(), sink);
        actor.readiness().wait().await.unwrap();

        actor.disconnect().await;
        actor.disconnect().await;

        assert_eq!(actor.readiness().current(), Lifecycle::Disconnected);
        assert_eq!(
            actor.readiness().wait().await,
            Err(ActorError::Disconnected("connection closed".into()))
        );
        assert_eq!(records.recv().await, Some(Record::Ready));
        assert!(records.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_before_spawn_never_becomes_ready() {
        let (sink, _records) = EventSink::channel();
        let actor = SimulatedActor::spawn(SPAWN_POSE, SimulatedTiming::default(), sink);
        actor.disconnect().await;

        assert_eq!(
            actor.readiness().wait().await,
            Err(ActorError::NeverReady)
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(actor.readiness().current(), Lifecycle::Ended);
    }
}
