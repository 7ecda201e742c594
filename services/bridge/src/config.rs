//! Startup configuration for the bridge.
//!
//! Options come from `--key value` flags, falling back to `BRIDGE_*`
//! environment variables (a `.env` file is honoured outside tests) and then to
//! built-in defaults. Flags the bridge does not know are dropped, along with
//! their values, before parsing.

use crate::remote::protocol::Login;
use avatar_bridge_core::simulated::SimulatedTiming;
use clap::Parser;
use std::{ffi::OsString, time::Duration};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for option {0}: {1}")]
    InvalidValue(String, String),
    #[error(transparent)]
    Cli(#[from] clap::Error),
}

/// Which actor implementation drives the avatar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActorKind {
    /// A real avatar behind the avatar gateway.
    Remote,
    /// The local, deterministic simulation.
    Simulated,
}

/// Flags the bridge understands, and whether each one takes a value.
const KNOWN_FLAGS: &[(&str, bool)] = &[
    ("host", true),
    ("port", true),
    ("username", true),
    ("password", true),
    ("auth", true),
    ("version", true),
    ("gateway", true),
    ("spawn-delay-ms", true),
    ("travel-delay-ms", true),
    ("mock", false),
    ("help", false),
];

#[derive(Parser, Debug)]
#[command(
    name = "bridge",
    about = "Drive a game avatar through line-delimited JSON commands on stdin/stdout."
)]
struct Args {
    /// Game server host.
    #[arg(long, env = "BRIDGE_HOST", default_value = "127.0.0.1")]
    host: String,
    /// Game server port.
    #[arg(long, env = "BRIDGE_PORT", default_value = "25565")]
    port: String,
    #[arg(long, env = "BRIDGE_USERNAME", default_value = "Bot")]
    username: String,
    #[arg(long, env = "BRIDGE_PASSWORD")]
    password: Option<String>,
    /// Identity provider, e.g. `microsoft`.
    #[arg(long, env = "BRIDGE_AUTH")]
    auth: Option<String>,
    /// Game protocol version; auto-detected by the gateway when absent.
    #[arg(long, env = "BRIDGE_VERSION")]
    version: Option<String>,
    /// Use the local simulation instead of a real avatar.
    #[arg(long, env = "BRIDGE_MOCK")]
    mock: bool,
    /// WebSocket URL of the avatar gateway.
    #[arg(long, env = "BRIDGE_GATEWAY", default_value = "ws://127.0.0.1:3040")]
    gateway: String,
    /// Simulated spawn latency.
    #[arg(long, env = "BRIDGE_SPAWN_DELAY_MS", default_value = "200")]
    spawn_delay_ms: String,
    /// Simulated travel time per move.
    #[arg(long, env = "BRIDGE_TRAVEL_DELAY_MS", default_value = "300")]
    travel_delay_ms: String,
}

/// Holds all configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub auth: Option<String>,
    pub version: Option<String>,
    pub actor: ActorKind,
    pub gateway: String,
    pub timing: SimulatedTiming,
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_args(std::env::args_os())
    }

    /// Resolves configuration from an argument list whose first item is the program name.
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let args = Args::try_parse_from(retain_known_flags(args))?;

        let port = args
            .port
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidValue("port".to_string(), e.to_string()))?;
        let timing = SimulatedTiming {
            spawn_delay: parse_millis("spawn-delay-ms", &args.spawn_delay_ms)?,
            travel_delay: parse_millis("travel-delay-ms", &args.travel_delay_ms)?,
        };

        Ok(Self {
            host: args.host,
            port,
            username: args.username,
            password: args.password,
            auth: args.auth,
            version: args.version,
            actor: if args.mock {
                ActorKind::Simulated
            } else {
                ActorKind::Remote
            },
            gateway: args.gateway,
            timing,
        })
    }

    /// The login request sent to the avatar gateway.
    pub fn login(&self) -> Login {
        Login {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            auth: self.auth.clone(),
            version: self.version.clone(),
        }
    }
}

fn parse_millis(option: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ConfigError::InvalidValue(option.to_string(), e.to_string()))
}

/// Drops unknown `--flags` and stray positional words.
///
/// A flag's value is the next word unless that word is itself a flag. Valued
/// flags that end up without a value are dropped as well; a value given to a
/// boolean flag is discarded.
fn retain_known_flags<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut args = args.into_iter().map(Into::into).peekable();
    let mut kept: Vec<OsString> = args.next().into_iter().collect();

    while let Some(arg) = args.next() {
        let text = arg.to_string_lossy().into_owned();
        if text == "-h" {
            kept.push(arg);
            continue;
        }
        let Some(flag) = text.strip_prefix("--") else {
            continue;
        };
        let (name, inline_value) = match flag.split_once('=') {
            Some((name, value)) => (name, Some(value.to_string())),
            None => (flag, None),
        };
        let next_is_value = args
            .peek()
            .is_some_and(|next| !next.to_string_lossy().starts_with("--"));
        let value = match inline_value {
            Some(value) => Some(OsString::from(value)),
            None if next_is_value => args.next(),
            None => None,
        };

        match KNOWN_FLAGS.iter().find(|(known, _)| *known == name) {
            Some((_, true)) => {
                // Joined with `=` so values starting with `-` are not read as flags.
                if let Some(value) = value {
                    let mut joined = OsString::from(format!("--{name}="));
                    joined.push(value);
                    kept.push(joined);
                }
            }
            Some((_, false)) => kept.push(OsString::from(format!("--{name}"))),
            None => {}
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            for var in [
                "BRIDGE_HOST",
                "BRIDGE_PORT",
                "BRIDGE_USERNAME",
                "BRIDGE_PASSWORD",
                "BRIDGE_AUTH",
                "BRIDGE_VERSION",
                "BRIDGE_MOCK",
                "BRIDGE_GATEWAY",
                "BRIDGE_SPAWN_DELAY_MS",
                "BRIDGE_TRAVEL_DELAY_MS",
            ] {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_config_error_display() {
        let invalid_value = ConfigError::InvalidValue("port".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for option port: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env_vars();

        let config = Config::from_args(["bridge"]).expect("Config should load successfully");

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 25565);
        assert_eq!(config.username, "Bot");
        assert_eq!(config.password, None);
        assert_eq!(config.auth, None);
        assert_eq!(config.version, None);
        assert_eq!(config.actor, ActorKind::Remote);
        assert_eq!(config.gateway, "ws://127.0.0.1:3040");
        assert_eq!(config.timing, SimulatedTiming::default());
    }

    #[test]
    #[serial]
    fn test_config_custom_values() {
        clear_env_vars();

        let config = Config::from_args([
            "bridge",
            "--host",
            "mc.example.net",
            "--port=25570",
            "--username",
            "Steve",
            "--password",
            "hunter2",
            "--auth",
            "microsoft",
            "--version",
            "1.20.4",
            "--mock",
            "--travel-delay-ms",
            "0",
        ])
        .expect("Config should load successfully");

        assert_eq!(config.host, "mc.example.net");
        assert_eq!(config.port, 25570);
        assert_eq!(config.username, "Steve");
        assert_eq!(config.password.as_deref(), Some("hunter2"));
        assert_eq!(config.auth.as_deref(), Some("microsoft"));
        assert_eq!(config.version.as_deref(), Some("1.20.4"));
        assert_eq!(config.actor, ActorKind::Simulated);
        assert_eq!(config.timing.travel_delay, Duration::ZERO);
        assert_eq!(config.timing.spawn_delay, Duration::from_millis(200));

        let login = config.login();
        assert_eq!(login.host, "mc.example.net");
        assert_eq!(login.port, 25570);
        assert_eq!(login.password.as_deref(), Some("hunter2"));
    }

    #[test]
    #[serial]
    fn test_unknown_flags_are_ignored() {
        clear_env_vars();

        let config = Config::from_args([
            "bridge",
            "--viewer",
            "3007",
            "stray",
            "--mock",
            "yes",
            "--verbose",
            "--username",
            "Alex",
        ])
        .expect("Unknown flags should not fail parsing");

        assert_eq!(config.actor, ActorKind::Simulated);
        assert_eq!(config.username, "Alex");
        assert_eq!(config.port, 25565);
    }

    #[test]
    #[serial]
    fn test_valued_flag_without_value_is_dropped() {
        clear_env_vars();

        let config = Config::from_args(["bridge", "--password", "--mock"])
            .expect("Config should load successfully");

        assert_eq!(config.password, None);
        assert_eq!(config.actor, ActorKind::Simulated);
    }

    #[test]
    #[serial]
    fn test_config_from_environment() {
        clear_env_vars();
        unsafe {
            env::set_var("BRIDGE_HOST", "10.0.0.5");
            env::set_var("BRIDGE_PORT", "19132");
            env::set_var("BRIDGE_GATEWAY", "ws://gateway:9000");
        }

        let config = Config::from_args(["bridge", "--host", "override.local"])
            .expect("Config should load successfully");
        clear_env_vars();

        assert_eq!(config.host, "override.local");
        assert_eq!(config.port, 19132);
        assert_eq!(config.gateway, "ws://gateway:9000");
    }

    #[test]
    #[serial]
    fn test_config_invalid_port() {
        clear_env_vars();

        let err = Config::from_args(["bridge", "--port", "not-a-port"]).unwrap_err();
        match err {
            ConfigError::InvalidValue(option, _) => assert_eq!(option, "port"),
            _ => panic!("Expected InvalidValue for port"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_delay() {
        clear_env_vars();

        let err = Config::from_args(["bridge", "--spawn-delay-ms", "-5"]).unwrap_err();
        match err {
            ConfigError::InvalidValue(option, _) => assert_eq!(option, "spawn-delay-ms"),
            _ => panic!("Expected InvalidValue for spawn-delay-ms"),
        }
    }
}
