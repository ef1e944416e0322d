use std::sync::Arc;
use std::time::Duration;

use learning_loop_protocol::{OutgoingEvent, SocketResponse};
use reqwest::Response;
use tokio_util::sync::CancellationToken;

use crate::channel::{ConnectionState, EventChannel, IncomingHandler};
use crate::error::TransportError;
use crate::http::HttpClient;

/// The thin interface to the Learning Loop: authenticated HTTP plus a reconnecting event
/// channel. Reconnect failures are logged but never fatal to the owning node.
#[derive(Clone)]
pub struct LoopClient {
    http: HttpClient,
    channel: Arc<EventChannel>,
}

impl LoopClient {
    /// `host` is the loop's base URL (e.g. `https://learning-loop.example.com`); the event
    /// channel connects to `{ws_host}/ws/socket.io` derived from it.
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        let ws_url = to_ws_url(&host);
        Self {
            http: HttpClient::new(host),
            channel: Arc::new(EventChannel::new(ws_url)),
        }
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn connection_state(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.channel.connection_state()
    }

    pub async fn set_incoming_handler(&self, handler: Arc<dyn IncomingHandler>) {
        self.channel.set_handler(handler).await;
    }

    /// Spawns the background reconnect loop. Returns immediately; the channel becomes usable
    /// once it establishes its first connection.
    pub fn spawn_connection_task(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let channel = Arc::clone(&self.channel);
        tokio::spawn(channel.run(cancel))
    }

    pub async fn call(
        &self,
        event: &serde_json::Value,
        timeout: Duration,
    ) -> Result<SocketResponse, TransportError> {
        self.channel.call(event.clone(), timeout).await
    }

    pub async fn send_status(&self, event: &OutgoingEvent) -> Result<SocketResponse, TransportError> {
        let payload = serde_json::to_value(event)?;
        self.channel.call_default_timeout(payload).await
    }

    pub async fn get(&self, path: &str) -> Result<Response, TransportError> {
        self.http.get(path).await
    }

    pub async fn put_multipart(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<Response, TransportError> {
        self.http.put_multipart(path, form).await
    }

    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, TransportError> {
        self.http.post_json(path, body).await
    }
}

fn to_ws_url(host: &str) -> String {
    let (scheme, rest) = if let Some(rest) = host.strip_prefix("https://") {
        ("wss", rest)
    } else if let Some(rest) = host.strip_prefix("http://") {
        ("ws", rest)
    } else {
        ("ws", host)
    };
    format!("{scheme}://{}/ws/socket.io", rest.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_websocket_url_from_https_host() {
        assert_eq!(
            to_ws_url("https://loop.example.com"),
            "wss://loop.example.com/ws/socket.io"
        );
    }

    #[test]
    fn derives_websocket_url_from_http_host() {
        assert_eq!(
            to_ws_url("http://localhost:8080/"),
            "ws://localhost:8080/ws/socket.io"
        );
    }
}
