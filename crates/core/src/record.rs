//! Defines the records the bridge writes to its output stream.
//!
//! Every record is a single JSON object tagged by its `event` field. Command
//! results and out-of-band actor events share the same envelope so a
//! controller can read the stream with one decoder.

use crate::pose::Target;
use serde::Serialize;

/// Reasons a command is refused before or instead of reaching the actor.
///
/// The `Display` form is the wire code placed in a record's `error` field.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    #[error("invalid_json")]
    InvalidJson,
    #[error("not_object")]
    NotObject,
    #[error("unknown_type")]
    UnknownType,
    #[error("missing_message")]
    MissingMessage,
    #[error("unknown_direction")]
    UnknownDirection,
    #[error("pathfinder_unavailable")]
    PathfinderUnavailable,
    /// The requested walk leaves the addressable block grid.
    #[error("target_out_of_range")]
    TargetOutOfRange,
}

/// One line of output.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Record {
    /// The actor has spawned and accepts pose-dependent commands.
    Ready,
    /// A chat line the simulated actor would have sent.
    Chat { message: String },
    /// The remote side removed the actor from the world.
    Kicked { reason: serde_json::Value },
    /// A connection-level error unrelated to any pending command.
    Error { message: String },
    /// Startup failed; the process exits after writing this.
    Fatal { error: String },
    /// The input line could not be turned into a command.
    BadCommand { error: Rejection },
    SayResult {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    MoveResult {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<Target>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Acknowledges `quit`. Nothing is written after it.
    Quitting,
    /// A command failed for a reason outside the validation rules.
    CommandError { error: String },
}

impl Record {
    pub fn say_ok() -> Self {
        Record::SayResult {
            ok: true,
            error: None,
        }
    }

    pub fn say_failed(error: impl Into<String>) -> Self {
        Record::SayResult {
            ok: false,
            error: Some(error.into()),
        }
    }

    pub fn move_ok(target: Target) -> Self {
        Record::MoveResult {
            ok: true,
            target: Some(target),
            error: None,
        }
    }

    pub fn move_failed(error: impl Into<String>) -> Self {
        Record::MoveResult {
            ok: false,
            target: None,
            error: Some(error.into()),
        }
    }

    /// Whether the output stream ends after this record.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Record::Quitting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_records_match_wire_shape() {
        assert_eq!(
            serde_json::to_string(&Record::say_ok()).unwrap(),
            r#"{"event":"say_result","ok":true}"#
        );
        assert_eq!(
            serde_json::to_string(&Record::move_ok(Target::new(0, 64, -5))).unwrap(),
            r#"{"event":"move_result","ok":true,"target":{"x":0,"y":64,"z":-5}}"#
        );
        assert_eq!(
            serde_json::to_string(&Record::BadCommand {
                error: Rejection::InvalidJson
            })
            .unwrap(),
            r#"{"event":"bad_command","error":"invalid_json"}"#
        );
        assert_eq!(
            serde_json::to_string(&Record::Quitting).unwrap(),
            r#"{"event":"quitting"}"#
        );
    }

    #[test]
    fn test_failed_move_omits_target() {
        let value = serde_json::to_value(Record::move_failed("No path to the goal!")).unwrap();
        assert_eq!(
            value,
            json!({"event": "move_result", "ok": false, "error": "No path to the goal!"})
        );
    }

    #[test]
    fn test_rejection_display_matches_wire_code() {
        for rejection in [
            Rejection::InvalidJson,
            Rejection::NotObject,
            Rejection::UnknownType,
            Rejection::MissingMessage,
            Rejection::UnknownDirection,
            Rejection::PathfinderUnavailable,
            Rejection::TargetOutOfRange,
        ] {
            let wire = serde_json::to_value(rejection).unwrap();
            assert_eq!(wire, json!(rejection.to_string()));
        }
    }

    #[test]
    fn test_out_of_band_records() {
        let kicked = serde_json::to_value(Record::Kicked {
            reason: json!({"text": "Server closed"}),
        })
        .unwrap();
        assert_eq!(kicked["event"], "kicked");
        assert_eq!(kicked["reason"]["text"], "Server closed");

        let fatal = serde_json::to_value(Record::Fatal {
            error: "connection refused".into(),
        })
        .unwrap();
        assert_eq!(fatal, json!({"event": "fatal", "error": "connection refused"}));
        assert!(Record::Quitting.is_terminal());
        assert!(!Record::Ready.is_terminal());
    }
}
