//! Executes commands against the active actor.
//!
//! Each input line yields exactly one [`Outcome`]. Every failure below the
//! dispatcher, expected or not, is turned into a record here; nothing
//! propagates far enough to stop the bridge.

use crate::{
    actor::Actor,
    command::{Command, MoveRequest},
    record::{Record, Rejection},
};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What the line engine should do after a line has been dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Write this record and keep reading.
    Reply(Record),
    /// Acknowledge shutdown and stop reading.
    Quit,
}

/// Routes parsed commands to a single actor for the lifetime of the bridge.
#[derive(Clone)]
pub struct Dispatcher {
    actor: Arc<dyn Actor>,
}

impl Dispatcher {
    pub fn new(actor: Arc<dyn Actor>) -> Self {
        Self { actor }
    }

    /// Parses, validates and executes one line of input.
    #[instrument(name = "dispatch", skip_all)]
    pub async fn dispatch(&self, line: &str) -> Outcome {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(rejection) => {
                warn!(%rejection, "Rejected input line.");
                return Outcome::Reply(Record::BadCommand { error: rejection });
            }
        };
        debug!(?command, "Parsed command.");

        let result = match command {
            Command::Quit => return Outcome::Quit,
            Command::Say { message } => self.say(message).await,
            Command::Move(request) => self.walk(request).await,
        };

        Outcome::Reply(result.unwrap_or_else(|e| {
            warn!(error = %e, "Command failed.");
            Record::CommandError {
                error: e.to_string(),
            }
        }))
    }

    /// Disconnects the actor. Safe to call more than once.
    pub async fn shutdown(&self) {
        info!("Disconnecting actor.");
        self.actor.disconnect().await;
    }

    async fn say(&self, message: Option<String>) -> Result<Record> {
        let Some(message) = message else {
            return Ok(Record::say_failed(Rejection::MissingMessage.to_string()));
        };
        self.actor.readiness().wait().await?;
        self.actor.chat(&message).await?;
        Ok(Record::say_ok())
    }

    async fn walk(&self, request: MoveRequest) -> Result<Record> {
        let heading = match request.spec.heading() {
            Ok(heading) => heading,
            Err(rejection) => return Ok(Record::move_failed(rejection.to_string())),
        };
        self.actor.readiness().wait().await?;

        let pose = self.actor.pose();
        let target = match heading.target_from(&pose, request.blocks) {
            Ok(target) => target,
            Err(rejection) => return Ok(Record::move_failed(rejection.to_string())),
        };
        if !self.actor.can_navigate() {
            return Ok(Record::move_failed(
                Rejection::PathfinderUnavailable.to_string(),
            ));
        }

        info!(?pose, ?target, "Navigating.");
        match self.actor.goto(target).await {
            Ok(()) => Ok(Record::move_ok(target)),
            Err(e) => {
                warn!(error = %e, ?target, "Navigation failed.");
                Ok(Record::move_failed(e.to_string()))
            }
        }
    }
}
