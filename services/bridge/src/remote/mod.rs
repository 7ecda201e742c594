//! An actor backed by a real avatar behind the avatar gateway.
//!
//! The gateway speaks the game protocol and runs the pathfinder; this module
//! keeps a local mirror of the avatar's pose, forwards chat and navigation
//! requests, and matches navigation outcomes back to the waiting command.

pub mod protocol;

use self::protocol::{GatewayEvent, GatewayRequest, Login};
use anyhow::{Context, Result};
use async_trait::async_trait;
use avatar_bridge_core::{
    actor::{Actor, ActorError, CONNECTION_CLOSED, EventSink, Lifecycle, Readiness},
    pose::{Pose, Target},
    record::Record,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{
    net::TcpStream,
    sync::{Mutex, mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};
use tracing::{Instrument, debug, error, info, info_span, warn};

type GatewaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type GoalReply = oneshot::Sender<Result<(), String>>;

/// How long `disconnect` waits for the farewell message to reach the gateway.
const FAREWELL_TIMEOUT: Duration = Duration::from_secs(2);

/// State shared between the actor handle and its gateway reader task.
struct Shared {
    pose: watch::Sender<Pose>,
    lifecycle: watch::Sender<Lifecycle>,
    navigation: AtomicBool,
    pending: Mutex<HashMap<u64, GoalReply>>,
    sink: EventSink,
}

impl Shared {
    async fn apply(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Spawn {
                x,
                y,
                z,
                yaw,
                navigation,
            } => {
                self.pose.send_replace(Pose::new(x, y, z, yaw));
                self.navigation.store(navigation, Ordering::SeqCst);
                let first_spawn = self.lifecycle.send_if_modified(|state| {
                    if *state != Lifecycle::Connecting {
                        return false;
                    }
                    // Queued before any waiter can observe `Ready`.
                    self.sink.emit(Record::Ready);
                    *state = Lifecycle::Ready;
                    true
                });
                if first_spawn {
                    info!(x, y, z, navigation, "Avatar spawned.");
                } else {
                    debug!(x, y, z, "Avatar respawned.");
                }
            }
            GatewayEvent::Pose { x, y, z, yaw } => {
                self.pose.send_replace(Pose::new(x, y, z, yaw));
            }
            GatewayEvent::GoalReached { id } => self.settle(id, Ok(())).await,
            GatewayEvent::GoalFailed { id, error } => self.settle(id, Err(error)).await,
            GatewayEvent::Kicked { reason } => {
                warn!(%reason, "Avatar was kicked.");
                self.sink.emit(Record::Kicked { reason });
            }
            GatewayEvent::Error { message } => {
                warn!(%message, "Gateway reported an error.");
                self.sink.emit(Record::Error { message });
            }
            GatewayEvent::End { reason } => {
                info!(?reason, "Game connection ended.");
                self.close().await;
            }
        }
    }

    async fn settle(&self, id: u64, outcome: Result<(), String>) {
        match self.pending.lock().await.remove(&id) {
            Some(reply) => {
                let _ = reply.send(outcome);
            }
            None => warn!(id, "Outcome for unknown navigation goal."),
        }
    }

    /// Marks the actor ended and fails every goal still in flight.
    async fn close(&self) {
        let mut pending = self.pending.lock().await;
        self.lifecycle.send_modify(|state| *state = state.closed());
        for (_, reply) in pending.drain() {
            let _ = reply.send(Err(CONNECTION_CLOSED.to_string()));
        }
    }
}

/// A handle to an avatar controlled through the gateway.
pub struct RemoteActor {
    shared: Arc<Shared>,
    outbound: mpsc::Sender<GatewayRequest>,
    next_goal: AtomicU64,
    ended: AtomicBool,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: JoinHandle<()>,
}

impl RemoteActor {
    /// Connects to the gateway and asks it to log the avatar in.
    ///
    /// Returns once the login request has been sent; the spawn arrives later
    /// through [`Actor::readiness`].
    pub async fn connect(gateway: &str, login: Login, sink: EventSink) -> Result<Arc<Self>> {
        info!(%gateway, ?login, "Connecting to avatar gateway.");
        let (socket, _) = connect_async(gateway)
            .await
            .with_context(|| format!("Failed to connect to avatar gateway at {gateway}"))?;
        let (mut socket_tx, socket_rx) = socket.split();

        socket_tx
            .send(WsMessage::Text(
                serde_json::to_string(&GatewayRequest::Connect(login))?.into(),
            ))
            .await
            .context("Failed to send login to avatar gateway")?;

        let (pose, _) = watch::channel(Pose::default());
        let (lifecycle, _) = watch::channel(Lifecycle::Connecting);
        let shared = Arc::new(Shared {
            pose,
            lifecycle,
            navigation: AtomicBool::new(false),
            pending: Mutex::new(HashMap::new()),
            sink,
        });

        let (outbound, requests) = mpsc::channel(64);
        let writer = tokio::spawn(
            forward_requests(requests, socket_tx).instrument(info_span!("gateway_writer")),
        );
        let reader = tokio::spawn(
            read_events(socket_rx, shared.clone()).instrument(info_span!("gateway_reader")),
        );

        Ok(Arc::new(Self {
            shared,
            outbound,
            next_goal: AtomicU64::new(1),
            ended: AtomicBool::new(false),
            writer: Mutex::new(Some(writer)),
            reader,
        }))
    }

    async fn send(&self, request: GatewayRequest) -> Result<(), ActorError> {
        self.outbound
            .send(request)
            .await
            .map_err(|_| ActorError::Disconnected(CONNECTION_CLOSED.to_string()))
    }
}

impl Drop for RemoteActor {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl Actor for RemoteActor {
    fn readiness(&self) -> Readiness {
        Readiness::new(self.shared.lifecycle.subscribe())
    }

    async fn chat(&self, message: &str) -> Result<(), ActorError> {
        self.send(GatewayRequest::Chat {
            message: message.to_string(),
        })
        .await
    }

    fn pose(&self) -> Pose {
        *self.shared.pose.borrow()
    }

    fn can_navigate(&self) -> bool {
        self.shared.navigation.load(Ordering::SeqCst)
    }

    async fn goto(&self, target: Target) -> Result<(), ActorError> {
        let id = self.next_goal.fetch_add(1, Ordering::SeqCst);
        let (reply, outcome) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().await;
            if self.shared.lifecycle.borrow().is_over() {
                return Err(ActorError::Disconnected(CONNECTION_CLOSED.to_string()));
            }
            pending.insert(id, reply);
        }

        let request = GatewayRequest::Goto {
            id,
            x: target.x,
            y: target.y,
            z: target.z,
        };
        if let Err(e) = self.send(request).await {
            self.shared.pending.lock().await.remove(&id);
            return Err(e);
        }

        match outcome.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) if reason == CONNECTION_CLOSED => Err(ActorError::Disconnected(reason)),
            Ok(Err(reason)) => Err(ActorError::Navigation(reason)),
            Err(_) => Err(ActorError::Disconnected(CONNECTION_CLOSED.to_string())),
        }
    }

    async fn disconnect(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Asking gateway to end the session.");
        let _ = self.outbound.send(GatewayRequest::End).await;
        if let Some(writer) = self.writer.lock().await.take() {
            if tokio::time::timeout(FAREWELL_TIMEOUT, writer).await.is_err() {
                warn!("Gateway writer did not finish in time.");
            }
        }
        self.shared.close().await;
    }
}

/// Serializes queued requests onto the gateway socket.
async fn forward_requests(
    mut requests: mpsc::Receiver<GatewayRequest>,
    mut socket_tx: SplitSink<GatewaySocket, WsMessage>,
) {
    while let Some(request) = requests.recv().await {
        let closing = request == GatewayRequest::End;
        let text = match serde_json::to_string(&request) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Failed to encode gateway request.");
                continue;
            }
        };
        if let Err(e) = socket_tx.send(WsMessage::Text(text.into())).await {
            warn!(error = %e, "Failed to write to avatar gateway.");
            break;
        }
        if closing {
            let _ = socket_tx.close().await;
            break;
        }
    }
    debug!("Gateway writer finished.");
}

/// Applies gateway events until the socket closes.
async fn read_events(mut socket_rx: SplitStream<GatewaySocket>, shared: Arc<Shared>) {
    while let Some(frame) = socket_rx.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<GatewayEvent>(&text) {
                Ok(event) => shared.apply(event).await,
                Err(e) => warn!(error = %e, "Skipping unreadable gateway message."),
            },
            Ok(WsMessage::Close(frame)) => {
                info!(?frame, "Avatar gateway closed the connection.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Avatar gateway connection failed.");
                shared.sink.emit(Record::Error {
                    message: e.to_string(),
                });
                break;
            }
        }
    }
    shared.close().await;
}
