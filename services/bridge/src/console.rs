//! An interactive console that drives a bridge child process.
//!
//! The console translates short human commands (`say hi`, `move north 5`,
//! `move yaw 270`) into protocol lines, waits for the matching result record,
//! and echoes everything the bridge prints.

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::{Value, json};
use std::{path::PathBuf, process::Stdio, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, Command},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, warn};

pub const READY_TIMEOUT: Duration = Duration::from_secs(60);
pub const FIRST_MOVE_TIMEOUT: Duration = Duration::from_secs(300);
pub const MOVE_TIMEOUT: Duration = Duration::from_secs(600);
pub const SAY_TIMEOUT: Duration = Duration::from_secs(30);
const QUIT_GRACE: Duration = Duration::from_secs(1);

pub const HELP: &str = "\
Commands:
  say <text>                 send a chat message
  move <dir> [blocks]        move north/south/east/west or forward/back/left/right
  move yaw <deg> [blocks]    move along an absolute yaw in degrees
  quit / exit                leave the game and stop";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "drive",
    about = "Interactive console for an avatar bridge."
)]
pub struct DriveArgs {
    /// Game server host.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, default_value_t = 25565)]
    pub port: u16,
    #[arg(long, default_value = "Bot")]
    pub username: String,
    #[arg(long)]
    pub password: Option<String>,
    /// Identity provider, e.g. `microsoft`.
    #[arg(long)]
    pub auth: Option<String>,
    /// Game protocol version.
    #[arg(long)]
    pub version: Option<String>,
    /// Direction for the opening move.
    #[arg(long, default_value = "north")]
    pub direction: String,
    /// Absolute yaw in degrees for the opening move; overrides `--direction`.
    #[arg(long, allow_negative_numbers = true)]
    pub yaw_deg: Option<f64>,
    /// Blocks per move unless a command says otherwise.
    #[arg(long, default_value_t = 10)]
    pub blocks: i64,
    /// Opening chat message.
    #[arg(long, default_value = "Hello, I am a bot")]
    pub message: String,
    /// Run the bridge against its local simulation.
    #[arg(long)]
    pub mock: bool,
    /// Path to the bridge executable. Defaults to `bridge` next to this program.
    #[arg(long)]
    pub bridge: Option<PathBuf>,
}

impl DriveArgs {
    /// Arguments forwarded to the bridge process.
    pub fn bridge_args(&self) -> Vec<String> {
        let mut args = vec![
            "--host".to_string(),
            self.host.clone(),
            "--port".to_string(),
            self.port.to_string(),
            "--username".to_string(),
            self.username.clone(),
        ];
        for (flag, value) in [
            ("--password", &self.password),
            ("--auth", &self.auth),
            ("--version", &self.version),
        ] {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value.clone());
            }
        }
        if self.mock {
            args.push("--mock".to_string());
        }
        args
    }

    /// The move sent once the avatar is ready.
    pub fn opening_move(&self) -> ConsoleCommand {
        let aim = match self.yaw_deg {
            Some(degrees) => Aim::Yaw(degrees),
            None => Aim::Direction(self.direction.clone()),
        };
        ConsoleCommand::Move {
            aim,
            blocks: Some(self.blocks),
        }
    }
}

/// Where a console move points.
#[derive(Debug, Clone, PartialEq)]
pub enum Aim {
    Direction(String),
    Yaw(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Say(String),
    Move { aim: Aim, blocks: Option<i64> },
    Help,
    Quit,
}

/// Why a console line could not be turned into a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsoleError {
    #[error("Usage: say <text>")]
    SayUsage,
    #[error(
        "Usage: move <north|south|east|west|forward|back|left|right> [blocks]\n   or: move yaw <deg> [blocks]"
    )]
    MoveUsage,
    #[error("Usage: move yaw <deg> [blocks]")]
    YawUsage,
    #[error("The angle must be a number, e.g. move yaw 270 10")]
    BadAngle,
    #[error("blocks must be an integer")]
    BadBlocks,
    #[error("Unknown command, type help for help.")]
    Unknown,
}

/// Parses one console line. Blank lines yield `Ok(None)`.
pub fn parse_console_line(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let lower = line.to_lowercase();
    match lower.as_str() {
        "quit" | "exit" => return Ok(Some(ConsoleCommand::Quit)),
        "help" | "h" | "?" => return Ok(Some(ConsoleCommand::Help)),
        _ => {}
    }

    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default().to_lowercase();
    match verb.as_str() {
        "say" => {
            let text = line[verb.len()..].trim();
            if text.is_empty() {
                return Err(ConsoleError::SayUsage);
            }
            Ok(Some(ConsoleCommand::Say(text.to_string())))
        }
        "move" => {
            let rest: Vec<&str> = words.collect();
            let Some(first) = rest.first() else {
                return Err(ConsoleError::MoveUsage);
            };
            let (aim, blocks) = if first.eq_ignore_ascii_case("yaw") {
                let degrees = rest.get(1).ok_or(ConsoleError::YawUsage)?;
                let degrees = degrees
                    .parse::<f64>()
                    .map_err(|_| ConsoleError::BadAngle)?;
                (Aim::Yaw(degrees), rest.get(2))
            } else {
                (Aim::Direction(first.to_lowercase()), rest.get(1))
            };
            let blocks = blocks
                .map(|b| b.parse::<i64>().map_err(|_| ConsoleError::BadBlocks))
                .transpose()?;
            Ok(Some(ConsoleCommand::Move { aim, blocks }))
        }
        _ => Err(ConsoleError::Unknown),
    }
}

impl ConsoleCommand {
    /// The protocol line for this command, if it is sent to the bridge at all.
    pub fn to_wire(&self, default_blocks: i64) -> Option<Value> {
        match self {
            ConsoleCommand::Say(message) => Some(json!({"type": "say", "message": message})),
            ConsoleCommand::Move { aim, blocks } => {
                let blocks = blocks.unwrap_or(default_blocks);
                Some(match aim {
                    Aim::Direction(direction) => {
                        json!({"type": "move", "direction": direction, "blocks": blocks})
                    }
                    Aim::Yaw(degrees) => json!({"type": "move", "yawDeg": degrees, "blocks": blocks}),
                })
            }
            ConsoleCommand::Quit => Some(json!({"type": "quit"})),
            ConsoleCommand::Help => None,
        }
    }

    /// The result event that answers this command, and how long to wait for it.
    pub fn reply(&self) -> Option<(&'static str, Duration)> {
        match self {
            ConsoleCommand::Say(_) => Some(("say_result", SAY_TIMEOUT)),
            ConsoleCommand::Move { .. } => Some(("move_result", MOVE_TIMEOUT)),
            ConsoleCommand::Help | ConsoleCommand::Quit => None,
        }
    }
}

/// Renders one line printed by the bridge for the console, with its event name.
pub fn describe_bridge_line(line: &str) -> (String, Option<String>) {
    let Ok(record) = serde_json::from_str::<Value>(line) else {
        return (line.to_string(), None);
    };
    let Some(event) = record.get("event").and_then(Value::as_str).map(str::to_string) else {
        return (line.to_string(), None);
    };
    let verdict = || {
        if record.get("ok").and_then(Value::as_bool) == Some(true) {
            "OK"
        } else {
            "FAIL"
        }
    };
    let text = match event.as_str() {
        "ready" => "[bridge] ready".to_string(),
        "move_result" => format!("[move] {}: {}", verdict(), record),
        "say_result" => format!("[say] {}: {}", verdict(), record),
        "kicked" | "error" | "fatal" | "command_error" | "bad_command" => {
            format!("[bridge:{}] {}", event, record)
        }
        "quitting" => "[bridge] quitting".to_string(),
        _ => line.to_string(),
    };
    (text, Some(event))
}

/// A running bridge process and the events it has reported.
pub struct BridgeProcess {
    child: Child,
    stdin: ChildStdin,
    events: mpsc::UnboundedReceiver<String>,
    echo: JoinHandle<()>,
}

impl BridgeProcess {
    /// Starts the bridge with piped stdin/stdout. Its stderr (logs) is inherited.
    pub fn spawn(program: &PathBuf, args: &[String]) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start bridge at {}", program.display()))?;
        let stdin = child.stdin.take().context("Bridge stdin was not piped")?;
        let stdout = child.stdout.take().context("Bridge stdout was not piped")?;

        let (tx, events) = mpsc::unbounded_channel();
        let echo = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let (text, event) = describe_bridge_line(line);
                println!("{text}");
                if let Some(event) = event {
                    let _ = tx.send(event);
                }
            }
            debug!("Bridge output closed.");
        });

        Ok(Self {
            child,
            stdin,
            events,
            echo,
        })
    }

    /// Waits until the bridge reports `event`. Returns `false` on timeout or if the bridge exits.
    pub async fn wait_for(&mut self, event: &str, timeout: Duration) -> bool {
        let events = &mut self.events;
        let seen = async {
            while let Some(seen) = events.recv().await {
                if seen == event {
                    return true;
                }
            }
            false
        };
        tokio::time::timeout(timeout, seen).await.unwrap_or(false)
    }

    /// Sends a protocol line without waiting for an answer.
    pub async fn send(&mut self, command: &Value) -> Result<()> {
        let line = format!("{command}\n");
        self.stdin
            .write_all(line.as_bytes())
            .await
            .context("Failed to write to bridge")?;
        self.stdin.flush().await.context("Failed to flush bridge input")?;
        Ok(())
    }

    /// Sends a command and waits for its result record. Returns `false` on timeout.
    pub async fn send_and_wait(&mut self, command: &Value, event: &str, timeout: Duration) -> Result<bool> {
        // Forget results of earlier commands that arrived after their timeout.
        while self.events.try_recv().is_ok() {}
        self.send(command).await?;
        Ok(self.wait_for(event, timeout).await)
    }

    /// Asks the bridge to quit, gives it a moment to acknowledge, then terminates it.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.send(&json!({"type": "quit"})).await {
            warn!(error = %e, "Could not send quit to bridge.");
        }
        if !self.wait_for("quitting", QUIT_GRACE).await {
            debug!("Bridge did not acknowledge quit in time.");
        }
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "Bridge already exited.");
        }
        self.echo.abort();
    }

    /// Kills the bridge immediately.
    pub async fn kill(mut self) {
        let _ = self.child.kill().await;
        self.echo.abort();
    }
}

/// Locates the bridge executable next to the running program.
pub fn default_bridge_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Cannot locate the current executable")?;
    let dir = exe.parent().context("Executable has no parent directory")?;
    let path = dir.join(format!("bridge{}", std::env::consts::EXE_SUFFIX));
    if !path.is_file() {
        bail!("Bridge executable not found at {}; pass --bridge", path.display());
    }
    Ok(path)
}
