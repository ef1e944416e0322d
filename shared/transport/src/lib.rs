//! Authenticated HTTP and a persistent, reconnecting event channel to the Learning Loop.
//!
//! This is a thin interface deliberately: `call(event, args) -> response`, `get/put/post(path)
//! -> response`. Everything else (chunked transfers, the training state machine) is built on
//! top of it in other crates.

mod channel;
mod client;
mod config;
mod error;
mod http;

pub use channel::{ConnectionState, IncomingHandler};
pub use client::LoopClient;
pub use config::{basic_auth_credentials, host};
pub use error::TransportError;
pub use http::HttpClient;
