//! Lifecycle shared by every Learning Loop node role: persistent identity, a reconnecting event
//! channel (via `learning-loop-transport`), and the connect/disconnect watchdog. Concrete
//! subclasses (here, only `TrainerNode` in `learning-loop-trainer`) shape their own status
//! payload and command routing on top of this base.

mod connection;
mod identity;
mod node;

pub use connection::{run_connection_watch, ConnectionObserver};
pub use identity::{load_or_create, IdentityError};
pub use node::Node;
