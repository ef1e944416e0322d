use std::path::PathBuf;

use clap::Parser;

/// Startup configuration for a trainer node. Environment variables are the source of truth;
/// clap's `env` attribute reads the prefixed `LOOP_*` form of each, with an explicit
/// fallback to the bare name below (mirrors `learning_loop_transport::config`'s own
/// prefers-prefixed-falls-back-to-plain rule for `LOOP_USERNAME`/`USERNAME`).
#[derive(Parser, Debug)]
#[command(author, version, about = "Learning Loop trainer node")]
pub struct Args {
    /// Directory this node stores its identity, downloaded images, and training state under.
    #[arg(long, env = "DATA_FOLDER", default_value = "./data")]
    pub data_folder: PathBuf,

    /// Name this node reports itself as in status updates.
    #[arg(long, env = "NODE_NAME", default_value = "trainer")]
    pub name: String,

    #[arg(long, env = "LOOP_HOST")]
    host: Option<String>,

    #[arg(long, env = "LOOP_ORGANIZATION")]
    organization: Option<String>,

    #[arg(long, env = "LOOP_PROJECT")]
    project: Option<String>,

    /// Shell command used to start a training run; `{base_model}` is substituted with the
    /// resolved base model id or pretrained model name. The actual ML binary is outside this
    /// node's scope -- it is modeled purely as a command line plus a log file.
    #[arg(
        long,
        env = "TRAIN_COMMAND",
        default_value = "echo '{}' > confusion_matrix.json # training {base_model}"
    )]
    pub train_command: String,

    /// Exit the process once a training reaches `ReadyForCleanup`, so a supervising container
    /// restarts it with a clean slate. Ignored when `manual_restart` is set.
    #[arg(long, env = "RESTART_AFTER_TRAINING", default_value_t = false)]
    pub restart_after_training: bool,

    /// Disables the self-exit in `restart_after_training`, leaving restarts to an operator.
    #[arg(long, env = "MANUAL_RESTART", default_value_t = false)]
    pub manual_restart: bool,

    /// Keeps a finished training's folder on disk instead of deleting it during cleanup.
    #[arg(long, env = "KEEP_OLD_TRAININGS", default_value_t = false)]
    pub keep_old_trainings: bool,

    /// Prints every flag and environment variable as a markdown table and exits without
    /// starting the node. Intended for generating the operator-facing configuration reference.
    #[arg(long)]
    pub print_markdown_help: bool,
}

/// Resolved configuration, with every dual-named environment variable settled to one value.
///
/// `organization`/`project` are read and logged at startup for operator visibility, but the node
/// itself is not bound to a single project: `Node` (the base) is context-agnostic, and every
/// `begin_training`/`save` call carries its own `Context` from the loop. A node configured for
/// "acme/demo" still accepts work for any project the loop routes to it.
pub struct NodeConfig {
    pub data_folder: PathBuf,
    pub name: String,
    pub host: String,
    pub organization: String,
    pub project: String,
    pub train_command: String,
    pub restart_after_training: bool,
    pub manual_restart: bool,
    pub keep_old_trainings: bool,
}

impl Args {
    pub fn resolve(self) -> anyhow::Result<NodeConfig> {
        let host = self
            .host
            .or_else(learning_loop_transport::host)
            .ok_or_else(|| anyhow::anyhow!("missing LOOP_HOST or HOST"))?;
        let organization = self
            .organization
            .or_else(|| std::env::var("ORGANIZATION").ok())
            .unwrap_or_else(|| "zauberzeug".to_string());
        let project = self
            .project
            .or_else(|| std::env::var("PROJECT").ok())
            .unwrap_or_else(|| "demo".to_string());

        Ok(NodeConfig {
            data_folder: self.data_folder,
            name: self.name,
            host,
            organization,
            project,
            train_command: self.train_command,
            restart_after_training: self.restart_after_training,
            manual_restart: self.manual_restart,
            keep_old_trainings: self.keep_old_trainings,
        })
    }
}
