//! Durable on-disk records for a training in progress: the persisted state-machine record,
//! detection batches awaiting upload, and the two upload-progress markers. Every write here is
//! atomic (write-to-tmp-then-rename); presence of `last_training.json` is the node's "there is
//! work to resume" flag (invariant 2 of the training data model).

mod atomic;
mod training_io;

pub use training_io::{PersistenceError, TrainingIo};
