//! The training state machine itself: the `TrainerHooks` capability interface a concrete trainer
//! implements, the `TrainerLogic` that drives one training through its full lifecycle, the
//! `state` handlers for each transition, and `TrainerNode`, the `Node` subclass that routes
//! events to it.
//!
//! Everything here is generic over `H: TrainerHooks` rather than depending on a concrete
//! implementation -- this crate never shells out to a real trainer subprocess itself, it only
//! supervises whatever `Executor::start` was told to run.

mod error;
mod hooks;
mod logic;
mod node;
mod state;

pub use error::HandlerError;
pub use hooks::TrainerHooks;
pub use logic::TrainerLogic;
pub use node::TrainerNode;
pub use state::run_training_loop;
