//! The line protocol engine: newline-delimited JSON in, newline-delimited JSON out.
//!
//! Input lines are executed strictly one after another; the next line is not
//! read until the current command has produced its record. Command results and
//! the actor's out-of-band records share one queue drained by a single writer
//! task, so the output order is the order in which records were produced.

use anyhow::{Context, Result};
use avatar_bridge_core::{
    actor::EventSink,
    dispatcher::{Dispatcher, Outcome},
    record::Record,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Split},
    sync::{mpsc, oneshot},
};
use tracing::{Instrument, debug, info, info_span, instrument, warn};

/// How an engine run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// A `quit` command was processed.
    Quit,
    /// The input stream reached end of file.
    InputClosed,
    /// The process was asked to stop, e.g. by Ctrl-C.
    Interrupted,
}

pub struct LineEngine {
    dispatcher: Dispatcher,
    sink: EventSink,
    records: mpsc::UnboundedReceiver<Record>,
}

impl LineEngine {
    /// Creates an engine. `sink` must feed `records`; actors should share the same sink.
    pub fn new(
        dispatcher: Dispatcher,
        sink: EventSink,
        records: mpsc::UnboundedReceiver<Record>,
    ) -> Self {
        Self {
            dispatcher,
            sink,
            records,
        }
    }

    /// Processes `input` until `quit` or end of input, then disconnects the actor.
    ///
    /// Returns the output stream once every queued record has been written.
    pub async fn run<R, W>(self, input: R, output: W) -> Result<(Shutdown, W)>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.run_until(input, output, std::future::pending()).await
    }

    /// Like [`LineEngine::run`], but also stops when `interrupt` completes,
    /// abandoning the command in flight.
    #[instrument(name = "line_engine", skip_all)]
    pub async fn run_until<R, W, F>(self, input: R, output: W, interrupt: F) -> Result<(Shutdown, W)>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        let LineEngine {
            dispatcher,
            sink,
            records,
        } = self;
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let writer = tokio::spawn(
            write_records(records, output, stop_rx).instrument(info_span!("record_writer")),
        );

        let mut lines = input.split(b'\n');
        tokio::pin!(interrupt);
        let read = loop {
            let executed = tokio::select! {
                executed = execute_line(&dispatcher, &sink, &mut lines) => executed,
                _ = &mut interrupt => {
                    info!("Interrupted.");
                    break Ok(Shutdown::Interrupted);
                }
            };
            match executed {
                Ok(Some(shutdown)) => break Ok(shutdown),
                Ok(None) => {}
                Err(e) => break Err(e),
            }
        };

        dispatcher.shutdown().await;
        // The writer drains what is already queued, then stops.
        drop(stop_tx);
        let output = writer.await.context("Record writer task failed")?;

        let shutdown = read.context("Failed to read command input")?;
        info!(?shutdown, "Line engine stopped.");
        Ok((shutdown, output))
    }
}

/// Reads and executes one line. Returns how the run ends, if it does.
async fn execute_line<R>(
    dispatcher: &Dispatcher,
    sink: &EventSink,
    lines: &mut Split<R>,
) -> std::io::Result<Option<Shutdown>>
where
    R: AsyncBufRead + Unpin,
{
    let Some(raw) = lines.next_segment().await? else {
        return Ok(Some(Shutdown::InputClosed));
    };
    // Undecodable bytes become U+FFFD and fall through to normal parsing.
    let line = String::from_utf8_lossy(&raw);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    match dispatcher.dispatch(line).await {
        Outcome::Reply(record) => {
            sink.emit(record);
            Ok(None)
        }
        Outcome::Quit => {
            info!("Quit requested.");
            sink.emit(Record::Quitting);
            Ok(Some(Shutdown::Quit))
        }
    }
}

/// Writes records until `quitting` has been written or `stop` fires with the queue empty.
async fn write_records<W>(
    mut records: mpsc::UnboundedReceiver<Record>,
    mut output: W,
    mut stop: oneshot::Receiver<()>,
) -> W
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            record = records.recv() => match record {
                Some(record) => {
                    write_record(&mut output, &record).await;
                    if record.is_terminal() {
                        break;
                    }
                }
                None => break,
            },
            _ = &mut stop => break,
        }
    }
    debug!("Record writer finished.");
    output
}

/// Serializes one record as a JSON line. Failures are logged and swallowed.
pub async fn write_record<W>(output: &mut W, record: &Record)
where
    W: AsyncWrite + Unpin,
{
    let mut line = match serde_json::to_string(record) {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, ?record, "Failed to serialize record.");
            return;
        }
    };
    line.push('\n');
    if let Err(e) = output.write_all(line.as_bytes()).await {
        warn!(error = %e, "Failed to write record.");
        return;
    }
    if let Err(e) = output.flush().await {
        warn!(error = %e, "Failed to flush output.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use avatar_bridge_core::{
        actor::{Actor, ActorError, Lifecycle, Readiness},
        pose::{Pose, Target},
        simulated::{SPAWN_POSE, SimulatedActor, SimulatedTiming},
    };
    use serde_json::{Value, json};
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn simulated_engine() -> (LineEngine, Arc<SimulatedActor>) {
        let (sink, records) = EventSink::channel();
        let actor = SimulatedActor::spawn(SPAWN_POSE, SimulatedTiming::instant(), sink.clone());
        let engine = LineEngine::new(Dispatcher::new(actor.clone()), sink, records);
        (engine, actor)
    }

    fn output_lines(output: &[u8]) -> Vec<Value> {
        String::from_utf8(output.to_vec())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).expect("every output line is JSON"))
            .collect()
    }

    #[tokio::test]
    async fn test_session_scenario() {
        let (engine, actor) = simulated_engine();
        let input = concat!(
            "{\"type\":\"say\",\"message\":\"hi\"}\n",
            "\n",
            "   \n",
            "not json at all\n",
            "{\"type\":\"move\",\"direction\":\"north\",\"blocks\":5}\n",
            "{\"type\":\"teleport\"}\n",
            "{\"type\":\"quit\"}\n",
            "{\"type\":\"say\",\"message\":\"too late\"}\n",
        );

        let (shutdown, output) = engine.run(input.as_bytes(), Vec::new()).await.unwrap();

        assert_eq!(shutdown, Shutdown::Quit);
        assert_eq!(
            output_lines(&output),
            vec![
                json!({"event": "ready"}),
                json!({"event": "chat", "message": "hi"}),
                json!({"event": "say_result", "ok": true}),
                json!({"event": "bad_command", "error": "invalid_json"}),
                json!({"event": "move_result", "ok": true, "target": {"x": 0, "y": 64, "z": -5}}),
                json!({"event": "bad_command", "error": "unknown_type"}),
                json!({"event": "quitting"}),
            ]
        );
        assert_eq!(actor.readiness().current(), Lifecycle::Disconnected);
        assert_eq!(actor.pose(), Pose::new(0.0, 64.0, -5.0, 0.0));
    }

    #[tokio::test]
    async fn test_exact_line_format() {
        let (engine, _) = simulated_engine();
        let input = "{\"type\":\"move\",\"direction\":\"north\",\"blocks\":5}\n{\"type\":\"quit\"}\n";

        let (_, output) = engine.run(input.as_bytes(), Vec::new()).await.unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            concat!(
                "{\"event\":\"ready\"}\n",
                "{\"event\":\"move_result\",\"ok\":true,\"target\":{\"x\":0,\"y\":64,\"z\":-5}}\n",
                "{\"event\":\"quitting\"}\n",
            )
        );
    }

    #[tokio::test]
    async fn test_end_of_input_disconnects_without_quitting_record() {
        let (engine, actor) = simulated_engine();
        let input = "{\"type\":\"say\"}\n";

        let (shutdown, output) = engine.run(input.as_bytes(), Vec::new()).await.unwrap();

        assert_eq!(shutdown, Shutdown::InputClosed);
        let lines = output_lines(&output);
        assert!(lines.contains(&json!({"event": "say_result", "ok": false, "error": "missing_message"})));
        assert!(lines.iter().all(|line| line["event"] != "quitting"));
        assert!(actor.readiness().current().is_over());
    }

    #[tokio::test]
    async fn test_undecodable_line_is_rejected_and_stream_continues() {
        let (engine, _) = simulated_engine();
        let mut input: Vec<u8> = b"{\"type\":\"say\",\"message\":\"h\xffi\"}\r\n".to_vec();
        input.extend_from_slice(b"\xff\xfe garbage\n");
        input.extend_from_slice(b"{\"type\":\"quit\"}");

        let (shutdown, output) = engine.run(input.as_slice(), Vec::new()).await.unwrap();

        assert_eq!(shutdown, Shutdown::Quit);
        assert_eq!(
            output_lines(&output),
            vec![
                json!({"event": "ready"}),
                json!({"event": "chat", "message": "h\u{FFFD}i"}),
                json!({"event": "say_result", "ok": true}),
                json!({"event": "bad_command", "error": "invalid_json"}),
                json!({"event": "quitting"}),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_disconnects_and_flushes() {
        let (engine, actor) = simulated_engine();
        let (mut client, server) = tokio::io::duplex(1024);
        client
            .write_all(b"{\"type\":\"say\",\"message\":\"hi\"}\n")
            .await
            .unwrap();
        let interrupt = tokio::time::sleep(std::time::Duration::from_secs(5));

        let (shutdown, output) = engine
            .run_until(tokio::io::BufReader::new(server), Vec::new(), interrupt)
            .await
            .unwrap();

        assert_eq!(shutdown, Shutdown::Interrupted);
        assert_eq!(
            output_lines(&output),
            vec![
                json!({"event": "ready"}),
                json!({"event": "chat", "message": "hi"}),
                json!({"event": "say_result", "ok": true}),
            ]
        );
        assert_eq!(actor.readiness().current(), Lifecycle::Disconnected);
        drop(client);
    }

    /// Emits an out-of-band record on every chat, and counts disconnects.
    struct NoisyActor {
        sink: EventSink,
        disconnects: AtomicUsize,
    }

    #[async_trait]
    impl Actor for NoisyActor {
        fn readiness(&self) -> Readiness {
            Readiness::fixed(Lifecycle::Ready)
        }

        async fn chat(&self, message: &str) -> Result<(), ActorError> {
            self.sink.emit(Record::Kicked {
                reason: json!(message),
            });
            Ok(())
        }

        fn pose(&self) -> Pose {
            SPAWN_POSE
        }

        fn can_navigate(&self) -> bool {
            false
        }

        async fn goto(&self, _target: Target) -> Result<(), ActorError> {
            unreachable!("navigation is unavailable")
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            // Anything emitted after `quitting` must not reach the output.
            self.sink.emit(Record::Error {
                message: "late".into(),
            });
        }
    }

    #[tokio::test]
    async fn test_out_of_band_records_interleave_in_order() {
        let (sink, records) = EventSink::channel();
        let actor = Arc::new(NoisyActor {
            sink: sink.clone(),
            disconnects: AtomicUsize::new(0),
        });
        let engine = LineEngine::new(Dispatcher::new(actor.clone()), sink, records);
        let input = concat!(
            "{\"type\":\"say\",\"message\":\"bye\"}\n",
            "{\"type\":\"move\",\"direction\":\"west\"}\n",
            "{\"type\":\"quit\"}\n",
        );

        let (_, output) = engine.run(input.as_bytes(), Vec::new()).await.unwrap();

        assert_eq!(
            output_lines(&output),
            vec![
                json!({"event": "kicked", "reason": "bye"}),
                json!({"event": "say_result", "ok": true}),
                json!({"event": "move_result", "ok": false, "error": "pathfinder_unavailable"}),
                json!({"event": "quitting"}),
            ]
        );
        assert_eq!(actor.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_record_appends_newline() {
        let mut output = Vec::new();
        write_record(&mut output, &Record::Fatal { error: "boom".into() }).await;
        assert_eq!(output, b"{\"event\":\"fatal\",\"error\":\"boom\"}\n");
    }
}
