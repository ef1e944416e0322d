use std::path::PathBuf;

use learning_loop_transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum DataExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("io error at {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("malformed response body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed model archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("upload response missing '{0}' field")]
    MissingField(&'static str),
}
