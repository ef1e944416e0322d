use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use learning_loop_core::Detections;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::warn;

/// Reply to a call the mock server sent to the trainer under test (`begin_training`,
/// `stop_training`, `save`).
#[derive(Debug, Clone)]
pub struct MockReply {
    pub success: bool,
    pub payload: Option<Value>,
}

#[derive(Default)]
struct Inner {
    image_ids: HashMap<String, Vec<String>>,
    model_archive: Vec<u8>,
    uploaded_models: Vec<(String, Vec<String>)>,
    detection_batches: Vec<Vec<Detections>>,
    trainer_statuses: Vec<Value>,
    training_updates: Vec<Value>,
    data_fetch_failures_remaining: u32,
    reject_update_trainer: bool,
    next_call_id: u64,
    pending: HashMap<u64, oneshot::Sender<MockReply>>,
    ws_sender: Option<mpsc::UnboundedSender<Message>>,
}

/// A fake Learning Loop: serves the HTTP surface `learning-loop-data`/`learning-loop-transport`
/// talk to, plus the `/ws/socket.io` event channel, on a real local socket.
///
/// Holds its state behind a single `Mutex` queried directly by async methods -- the same
/// "one task owns the server state, the test drives it" shape as an actor behind a query
/// channel, simplified to a shared mutex since exactly one test driver ever talks to a given
/// instance.
#[derive(Clone)]
pub struct MockLoop {
    state: Arc<Mutex<Inner>>,
}

impl MockLoop {
    /// Starts the server on an OS-assigned port and returns the handle plus its base `http://`
    /// URL (what `LoopClient::new` expects).
    pub async fn spawn() -> (Self, String) {
        let this = Self {
            state: Arc::new(Mutex::new(Inner::default())),
        };

        let app = Router::new()
            .route("/api/:org/projects/:project/data", get(get_data))
            .route("/api/:org/projects/:project/images", get(get_images))
            .route(
                "/api/:org/projects/:project/images/:id/main",
                get(get_image_main),
            )
            .route(
                "/api/:org/projects/:project/models/:id/:format/file",
                get(get_model_file),
            )
            .route(
                "/api/:org/projects/:project/trainings/:number/models/latest/:format/file",
                put(put_model_file),
            )
            .route("/api/:org/projects/:project/detections", post(post_detections))
            .route("/ws/socket.io", get(ws_upgrade))
            .with_state(this.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let url = format!("http://{addr}");
        (this, url)
    }

    /// Registers the ids returned for `GET .../data?state=<state>`.
    pub async fn set_image_ids(&self, state: &str, ids: Vec<String>) {
        self.state.lock().await.image_ids.insert(state.to_string(), ids);
    }

    /// Sets the zip archive bytes served for every model download (base model and detect-time
    /// re-download alike -- the mock doesn't track per-model content, only that a well-formed
    /// archive comes back).
    pub async fn set_model_archive(&self, zip_bytes: Vec<u8>) {
        self.state.lock().await.model_archive = zip_bytes;
    }

    /// Makes the next `n` `GET .../data` requests fail with a 500, to exercise the
    /// prepare-retries-on-failure path (testable property / scenario S3).
    pub async fn fail_next_data_requests(&self, n: u32) {
        self.state.lock().await.data_fetch_failures_remaining = n;
    }

    /// Makes every subsequent `update_trainer` call fail, to exercise the "loop rejected status,
    /// stop the active training" path.
    pub async fn reject_update_trainer(&self, reject: bool) {
        self.state.lock().await.reject_update_trainer = reject;
    }

    pub async fn uploaded_models(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().await.uploaded_models.clone()
    }

    pub async fn detection_batches(&self) -> Vec<Vec<Detections>> {
        self.state.lock().await.detection_batches.clone()
    }

    pub async fn training_updates(&self) -> Vec<Value> {
        self.state.lock().await.training_updates.clone()
    }

    pub async fn trainer_statuses(&self) -> Vec<Value> {
        self.state.lock().await.trainer_statuses.clone()
    }

    /// Waits (polling) until `predicate` is true of the current training updates, or panics
    /// after `timeout`. Tests use this instead of sleeping a fixed duration.
    pub async fn wait_for_training_update(&self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.training_updates().await.is_empty() {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for an update_training call");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Sends a `begin_training`-shaped call down the event channel to whichever trainer is
    /// currently connected, and awaits its reply.
    pub async fn begin_training(
        &self,
        organization: &str,
        project: &str,
        details: Value,
    ) -> MockReply {
        self.call(json!({
            "event": "begin_training",
            "organization": organization,
            "project": project,
            "details": details,
        }))
        .await
    }

    pub async fn stop_training(&self) -> MockReply {
        self.call(json!({"event": "stop_training"})).await
    }

    async fn call(&self, event: Value) -> MockReply {
        let (tx, rx) = oneshot::channel();
        let (id, sender) = {
            let mut inner = self.state.lock().await;
            inner.next_call_id += 1;
            let id = inner.next_call_id;
            inner.pending.insert(id, tx);
            (id, inner.ws_sender.clone())
        };
        let sender = sender.expect("no trainer connected to the mock loop yet");

        let mut frame = event;
        frame
            .as_object_mut()
            .expect("call events are always objects")
            .insert("type".to_string(), json!("call"));
        frame.as_object_mut().unwrap().insert("id".to_string(), json!(id));

        sender
            .send(Message::Text(frame.to_string()))
            .expect("trainer's event channel writer is gone");

        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("timed out waiting for the trainer's reply")
            .expect("trainer dropped the reply channel")
    }
}

async fn get_data(
    State(loop_): State<MockLoop>,
    Path((_org, _project)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut inner = loop_.state.lock().await;
    if inner.data_fetch_failures_remaining > 0 {
        inner.data_fetch_failures_remaining -= 1;
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let state = params.get("state").cloned().unwrap_or_default();
    let ids = inner.image_ids.get(&state).cloned().unwrap_or_default();
    Json(json!({ "image_ids": ids })).into_response()
}

async fn get_images(
    Path((_org, _project)): Path<(String, String)>,
    Query(_params): Query<HashMap<String, String>>,
) -> Response {
    Json(json!({ "images": [] })).into_response()
}

async fn get_image_main(Path((_org, _project, _id)): Path<(String, String, String)>) -> Response {
    ([(axum::http::header::CONTENT_TYPE, "image/jpeg")], vec![0xFFu8, 0xD8, 0xFF, 0xD9]).into_response()
}

async fn get_model_file(
    State(loop_): State<MockLoop>,
    Path((_org, _project, _id, _format)): Path<(String, String, String, String)>,
) -> Response {
    let bytes = loop_.state.lock().await.model_archive.clone();
    if bytes.is_empty() {
        warn!("model archive requested before a test configured one");
    }
    (
        [(axum::http::header::CONTENT_TYPE, "application/zip")],
        bytes,
    )
        .into_response()
}

async fn put_model_file(
    State(loop_): State<MockLoop>,
    Path((_org, _project, _number, format)): Path<(String, String, String, String)>,
    mut multipart: Multipart,
) -> Response {
    let mut names = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        if let Some(name) = field.file_name().map(str::to_string) {
            names.push(name);
        }
        let _ = field.bytes().await;
    }
    let id = uuid::Uuid::new_v4().to_string();
    loop_.state.lock().await.uploaded_models.push((format, names));
    Json(json!({ "id": id })).into_response()
}

async fn post_detections(
    State(loop_): State<MockLoop>,
    Json(batch): Json<Vec<Detections>>,
) -> Response {
    loop_.state.lock().await.detection_batches.push(batch);
    StatusCode::OK.into_response()
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(loop_): State<MockLoop>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, loop_))
}

async fn handle_socket(socket: WebSocket, loop_: MockLoop) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    loop_.state.lock().await.ws_sender = Some(tx);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
            warn!(%text, "mock loop could not parse event channel frame");
            continue;
        };
        handle_frame(&loop_, frame).await;
    }

    writer.abort();
    loop_.state.lock().await.ws_sender = None;
}

async fn handle_frame(loop_: &MockLoop, frame: Value) {
    let Some(frame_type) = frame.get("type").and_then(Value::as_str) else {
        return;
    };
    match frame_type {
        "reply" => {
            let Some(id) = frame.get("id").and_then(Value::as_u64) else {
                return;
            };
            let success = frame
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let payload = frame.get("payload").cloned();
            let sender = loop_.state.lock().await.pending.remove(&id);
            if let Some(sender) = sender {
                let _ = sender.send(MockReply { success, payload });
            }
        }
        "call" => {
            let id = frame.get("id").and_then(Value::as_u64).unwrap_or(0);
            let event = frame.get("event").and_then(Value::as_str).unwrap_or("");
            let mut inner = loop_.state.lock().await;
            let success = match event {
                "update_trainer" => {
                    if let Some(status) = frame.get("status") {
                        inner.trainer_statuses.push(status.clone());
                    }
                    !inner.reject_update_trainer
                }
                "update_training" => {
                    if let Some(training) = frame.get("training") {
                        inner.training_updates.push(training.clone());
                    }
                    true
                }
                other => {
                    warn!(event = other, "mock loop received an unhandled call event");
                    true
                }
            };
            let sender = inner.ws_sender.clone();
            drop(inner);
            if let Some(sender) = sender {
                let reply = json!({"type": "reply", "id": id, "success": success});
                let _ = sender.send(Message::Text(reply.to_string()));
            }
        }
        _ => {}
    }
}
