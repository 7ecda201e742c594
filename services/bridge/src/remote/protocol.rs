//! Defines the WebSocket message protocol between the bridge and the avatar gateway.
//!
//! The gateway owns the game connection and the pathfinder; the bridge only
//! asks it to log in, chat, walk to a block, or leave.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Login parameters forwarded to the gateway.
#[derive(Serialize, Clone, PartialEq, Eq)]
pub struct Login {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    /// Protocol version; the gateway detects it when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

// Keeps the password out of logs.
impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Login")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("auth", &self.auth)
            .field("version", &self.version)
            .finish()
    }
}

/// Messages sent from the bridge to the gateway.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayRequest {
    /// Must be the first message on a connection.
    Connect(Login),
    Chat { message: String },
    /// Walk to a block. The gateway answers with `goal_reached` or `goal_failed` for `id`.
    Goto { id: u64, x: i32, y: i32, z: i32 },
    /// Leave the game and close the connection.
    End,
}

/// Messages sent from the gateway to the bridge.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// The avatar entered the world.
    Spawn {
        x: f64,
        y: f64,
        z: f64,
        yaw: f64,
        /// Whether the gateway managed to set up its pathfinder.
        #[serde(default = "navigation_default")]
        navigation: bool,
    },
    /// The avatar moved or turned.
    Pose { x: f64, y: f64, z: f64, yaw: f64 },
    GoalReached { id: u64 },
    GoalFailed { id: u64, error: String },
    /// The server removed the avatar. `reason` is passed through untouched.
    Kicked {
        #[serde(default)]
        reason: serde_json::Value,
    },
    Error { message: String },
    /// The game connection is over.
    End {
        #[serde(default)]
        reason: Option<String>,
    },
}

fn navigation_default() -> bool {
    true
}
