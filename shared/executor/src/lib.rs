//! Supervises the one subprocess a trainer node ever runs: the actual training binary.
//!
//! The executor is the only way `learning-loop-trainer`'s state machine learns about training
//! progress and failure -- it has no other channel into the subprocess besides the log file it
//! redirects stdout/stderr into and the OS-level liveness of the child.

mod executor;

pub use executor::{Executor, ExecutorError};
