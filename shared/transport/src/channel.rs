use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use learning_loop_protocol::SocketResponse;
use rand::Rng;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::TransportError;

const RECONNECT_BASE: Duration = Duration::from_millis(200);
const RECONNECT_CAP: Duration = Duration::from_secs(10);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Offline,
    Idle,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireMessage {
    Call {
        id: u64,
        #[serde(flatten)]
        event: serde_json::Value,
    },
    Reply {
        id: u64,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
}

/// Handles one inbound `Call` and produces the reply sent back over the same channel. Set once
/// by the owning `Node`/`TrainerNode`; absent (e.g. before wiring is complete) calls are
/// answered with a generic failure rather than silently dropped.
pub trait IncomingHandler: Send + Sync + 'static {
    fn handle(&self, event: serde_json::Value) -> BoxFuture<'static, SocketResponse>;
}

struct Pending {
    pending: Mutex<HashMap<u64, oneshot::Sender<SocketResponse>>>,
}

/// The bidirectional event channel half of `LoopClient`: reconnect, `call(event, args) ->
/// response with timeout`, and inbound event handling with async replies. Speaks a small
/// JSON-over-WebSocket protocol rather than Socket.IO proper (see DESIGN.md).
pub struct EventChannel {
    url: String,
    next_id: AtomicU64,
    pending: Arc<Pending>,
    writer: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    handler: Arc<Mutex<Option<Arc<dyn IncomingHandler>>>>,
}

impl EventChannel {
    pub fn new(ws_url: impl Into<String>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Offline);
        Self {
            url: ws_url.into(),
            next_id: AtomicU64::new(1),
            pending: Arc::new(Pending {
                pending: Mutex::new(HashMap::new()),
            }),
            writer: Arc::new(Mutex::new(None)),
            state_tx,
            state_rx,
            handler: Arc::new(Mutex::new(None)),
        }
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub async fn set_handler(&self, handler: Arc<dyn IncomingHandler>) {
        *self.handler.lock().await = Some(handler);
    }

    /// Sends an event and awaits its reply. Fails fast with `Disconnected` rather than queuing
    /// if the channel is currently down -- the state machine treats that as a normal retry
    /// condition, not a fatal error.
    pub async fn call(
        &self,
        event_json: serde_json::Value,
        timeout: Duration,
    ) -> Result<SocketResponse, TransportError> {
        let writer = self
            .writer
            .lock()
            .await
            .clone()
            .ok_or(TransportError::Disconnected)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.pending.lock().await.insert(id, tx);

        let frame = WireMessage::Call {
            id,
            event: event_json,
        };
        let text = serde_json::to_string(&frame)?;
        if writer.send(Message::Text(text)).is_err() {
            self.pending.pending.lock().await.remove(&id);
            return Err(TransportError::Disconnected);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::ChannelClosed),
            Err(_) => {
                self.pending.pending.lock().await.remove(&id);
                Err(TransportError::Timeout(format!("call#{id}")))
            }
        }
    }

    pub async fn call_default_timeout(
        &self,
        event_json: serde_json::Value,
    ) -> Result<SocketResponse, TransportError> {
        self.call(event_json, DEFAULT_CALL_TIMEOUT).await
    }

    /// Owns the reconnect loop: connect, run reader+writer tasks until the socket drops, then
    /// retry with jittered backoff. Runs until `cancel` fires. Exactly one task should own a
    /// given `EventChannel` -- it is not meant to be driven concurrently from two tasks.
    pub async fn run(self: Arc<Self>, cancel: tokio_util::sync::CancellationToken) {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return;
            }
            match self.connect_once(&cancel).await {
                Ok(()) => attempt = 0,
                Err(err) => {
                    warn!(%err, url = %self.url, "event channel connection failed");
                }
            }
            self.state_tx.send_replace(ConnectionState::Offline);
            *self.writer.lock().await = None;
            self.fail_all_pending().await;

            if cancel.is_cancelled() {
                return;
            }
            attempt += 1;
            let delay = jittered_backoff(attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }

    async fn fail_all_pending(&self) {
        let mut pending = self.pending.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(SocketResponse::error("event channel disconnected"));
        }
    }

    async fn connect_once(
        self: &Arc<Self>,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<(), TransportError> {
        debug!(url = %self.url, "connecting event channel");
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.url).await?;
        let (mut sink, mut stream) = ws_stream.split();

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Message>();
        *self.writer.lock().await = Some(writer_tx);
        self.state_tx.send_replace(ConnectionState::Idle);
        info!(url = %self.url, "event channel connected");

        let write_task = async move {
            while let Some(msg) = writer_rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        };

        let this = Arc::clone(self);
        let read_task = async move {
            while let Some(msg) = stream.next().await {
                let msg = match msg {
                    Ok(m) => m,
                    Err(err) => {
                        warn!(%err, "event channel read error");
                        break;
                    }
                };
                let Message::Text(text) = msg else { continue };
                this.handle_incoming(&text).await;
            }
        };

        tokio::select! {
            _ = write_task => {},
            _ = read_task => {},
            _ = cancel.cancelled() => {},
        }
        Ok(())
    }

    async fn handle_incoming(self: &Arc<Self>, text: &str) {
        let Ok(frame) = serde_json::from_str::<WireMessage>(text) else {
            warn!(%text, "could not parse event channel frame");
            return;
        };
        match frame {
            WireMessage::Reply {
                id,
                success,
                payload,
            } => {
                if let Some(tx) = self.pending.pending.lock().await.remove(&id) {
                    let _ = tx.send(SocketResponse { success, payload });
                }
            }
            WireMessage::Call { id, event } => {
                let handler = self.handler.lock().await.clone();
                let writer = self.writer.lock().await.clone();
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    let response = match handler {
                        Some(h) => h.handle(event).await,
                        None => SocketResponse::error("no handler registered"),
                    };
                    if let Some(writer) = writer {
                        let reply = WireMessage::Reply {
                            id,
                            success: response.success,
                            payload: response.payload,
                        };
                        if let Ok(text) = serde_json::to_string(&reply) {
                            let _ = writer.send(Message::Text(text));
                        }
                    }
                    drop(this);
                });
            }
        }
    }
}

/// Short, jittered, exponential-ish backoff capped at `RECONNECT_CAP` -- an uncapped zero-delay
/// reconnect loop would hammer the loop under sustained outages, so this caps it (see DESIGN.md).
fn jittered_backoff(attempt: u32) -> Duration {
    let exp = RECONNECT_BASE.saturating_mul(1 << attempt.min(8));
    let capped = exp.min(RECONNECT_CAP);
    let jitter_ms = rand::rng().random_range(0..100);
    capped + Duration::from_millis(jitter_ms)
}
