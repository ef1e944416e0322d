//! The wire contract between a Learning Loop node and the loop itself: event-channel payloads
//! (both directions) and the opaque node identity type. No I/O, no transport -- just the shapes
//! that `learning-loop-transport` and `learning-loop-trainer` serialize and deserialize.

mod events;
mod node_id;

pub use events::{
    BeginTrainingDetails, IncomingEvent, OutgoingEvent, PretrainedModel, SocketResponse,
    TrainerStatus,
};
pub use node_id::NodeId;
