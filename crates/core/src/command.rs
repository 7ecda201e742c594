//! Parses one input line into a typed command.
//!
//! Commands are decoded loosely: a field of the wrong type is treated as
//! absent rather than failing the whole line, so `"blocks": "far"` falls back
//! to the default distance instead of producing a framing error.

use crate::{direction::DirectionSpec, record::Rejection};
use serde_json::{Map, Value};

/// A command received from the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Send a chat line. `message` is `None` when it was missing or empty.
    Say { message: Option<String> },
    Move(MoveRequest),
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveRequest {
    pub spec: DirectionSpec,
    pub blocks: Option<f64>,
}

impl Command {
    /// Decodes a single line of input.
    pub fn parse(line: &str) -> Result<Self, Rejection> {
        let value: Value = serde_json::from_str(line).map_err(|_| Rejection::InvalidJson)?;
        let Value::Object(fields) = value else {
            return Err(Rejection::NotObject);
        };

        match fields.get("type").and_then(Value::as_str) {
            Some("say") => Ok(Command::Say {
                message: message_text(fields.get("message")),
            }),
            Some("move") => Ok(Command::Move(MoveRequest::from_fields(&fields))),
            Some("quit") => Ok(Command::Quit),
            _ => Err(Rejection::UnknownType),
        }
    }
}

impl MoveRequest {
    fn from_fields(fields: &Map<String, Value>) -> Self {
        Self {
            spec: DirectionSpec {
                direction: fields
                    .get("direction")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                yaw_deg: fields.get("yawDeg").and_then(Value::as_f64),
            },
            blocks: fields.get("blocks").and_then(Value::as_f64),
        }
    }
}

// Empty strings, zero, false and null all count as "no message".
fn message_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}
