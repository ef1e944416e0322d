//! Binary-crate glue: CLI configuration and the reference `TrainerHooks` implementation that
//! lets `learning-loop-trainer-node` run standalone without a real ML training binary on hand.
//! Exposed as a library too so the `testing` crate can reuse `ShellHooks` and `NodeConfig`
//! without duplicating them.

mod config;
mod hooks;

pub use config::{Args, NodeConfig};
pub use hooks::ShellHooks;
