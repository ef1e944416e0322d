#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("loop returned status {status} for {path}")]
    BadStatus {
        status: reqwest::StatusCode,
        path: String,
    },
    #[error("no credentials configured (set LOOP_USERNAME/LOOP_PASSWORD)")]
    MissingCredentials,
    #[error("event channel is not connected")]
    Disconnected,
    #[error("call to '{0}' timed out")]
    Timeout(String),
    #[error("event channel closed before a reply arrived")]
    ChannelClosed,
    #[error("malformed frame on the event channel: {0}")]
    MalformedFrame(#[from] serde_json::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
