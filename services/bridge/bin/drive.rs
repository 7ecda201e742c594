//! Interactive console for the avatar bridge.
//!
//! Starts a bridge child process, performs an opening move and greeting, then
//! reads console commands from stdin until `quit` or end of input.

use anyhow::Context;
use avatar_bridge::console::{
    BridgeProcess, ConsoleCommand, DriveArgs, FIRST_MOVE_TIMEOUT, HELP, READY_TIMEOUT,
    SAY_TIMEOUT, default_bridge_path, parse_console_line,
};
use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn prompt() {
    let mut stdout = tokio::io::stdout();
    let _ = stdout.write_all(b"> ").await;
    let _ = stdout.flush().await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    dotenvy::dotenv().ok();
    let args = DriveArgs::parse();

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    // --- 3. Start the Bridge ---
    let program = match &args.bridge {
        Some(path) => path.clone(),
        None => default_bridge_path()?,
    };
    let mut bridge = BridgeProcess::spawn(&program, &args.bridge_args())?;
    info!(program = %program.display(), "Bridge started.");

    if !bridge.wait_for("ready", READY_TIMEOUT).await {
        eprintln!("Timed out waiting for the bridge to become ready.");
        bridge.kill().await;
        std::process::exit(1);
    }

    // --- 4. Opening Move and Greeting ---
    let opening = args.opening_move();
    if let Some(line) = opening.to_wire(args.blocks) {
        if !bridge
            .send_and_wait(&line, "move_result", FIRST_MOVE_TIMEOUT)
            .await?
        {
            println!("[move] timed out");
        }
    }
    let greeting = json!({"type": "say", "message": args.message});
    if !bridge.send_and_wait(&greeting, "say_result", SAY_TIMEOUT).await? {
        println!("[say] timed out");
    }

    // --- 5. Interactive Loop ---
    println!("Type commands, help for help.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt().await;
        let Some(line) = lines.next_line().await.context("Failed to read console")? else {
            println!();
            break;
        };
        let command = match parse_console_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        match command {
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => break,
            command => {
                let (Some(line), Some((event, timeout))) =
                    (command.to_wire(args.blocks), command.reply())
                else {
                    continue;
                };
                if !bridge.send_and_wait(&line, event, timeout).await? {
                    println!("[{event}] timed out");
                }
            }
        }
    }

    // --- 6. Shut Down ---
    bridge.shutdown().await;
    Ok(())
}
