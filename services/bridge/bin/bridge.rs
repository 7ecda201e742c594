//! Main Entrypoint for the Avatar Bridge
//!
//! This binary is responsible for:
//! 1. Loading configuration from flags and the environment.
//! 2. Initializing logging on stderr, leaving stdout to the protocol.
//! 3. Building the simulated or remote actor.
//! 4. Serving line-delimited JSON commands until `quit` or end of input.

use avatar_bridge::{
    config::{ActorKind, Config, ConfigError},
    engine::LineEngine,
    remote::RemoteActor,
};
use avatar_bridge_core::{
    actor::{Actor, EventSink},
    dispatcher::Dispatcher,
    record::Record,
    simulated::{SPAWN_POSE, SimulatedActor},
};
use clap::error::ErrorKind;
use std::{io::Write, sync::Arc};
use tokio::io::BufReader;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Listens for the `Ctrl+C` signal.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down...");
}

/// Reports an unrecoverable failure on stdout and exits with status 1.
fn fatal(message: String) -> ! {
    error!(%message, "Fatal error.");
    let record = Record::Fatal { error: message };
    if let Ok(line) = serde_json::to_string(&record) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{line}");
        let _ = stdout.flush();
    }
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    // --- 1. Load Configuration ---
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(ConfigError::Cli(e))
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) =>
        {
            e.exit()
        }
        Err(e) => fatal(e.to_string()),
    };

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!(
        host = %config.host,
        port = config.port,
        username = %config.username,
        actor = ?config.actor,
        "Configuration loaded."
    );

    // --- 3. Initialize the Actor ---
    let (sink, records) = EventSink::channel();
    let actor: Arc<dyn Actor> = match config.actor {
        ActorKind::Simulated => {
            info!("Using the simulated actor.");
            SimulatedActor::spawn(SPAWN_POSE, config.timing, sink.clone()) as Arc<dyn Actor>
        }
        ActorKind::Remote => {
            info!(gateway = %config.gateway, "Using the avatar gateway.");
            match RemoteActor::connect(&config.gateway, config.login(), sink.clone()).await {
                Ok(actor) => actor as Arc<dyn Actor>,
                Err(e) => fatal(format!("{e:#}")),
            }
        }
    };

    // --- 4. Serve Commands ---
    let engine = LineEngine::new(Dispatcher::new(actor), sink, records);
    let input = BufReader::new(tokio::io::stdin());
    match engine
        .run_until(input, tokio::io::stdout(), shutdown_signal())
        .await
    {
        Ok((shutdown, _)) => info!(?shutdown, "Bridge stopped."),
        Err(e) => fatal(format!("{e:#}")),
    }
    // A pending stdin read would otherwise keep the runtime from shutting down.
    std::process::exit(0);
}
