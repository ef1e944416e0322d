use std::sync::Arc;

use clap::Parser;
use learning_loop_node::Node;
use learning_loop_protocol::PretrainedModel;
use learning_loop_trainer::TrainerNode;
use learning_loop_trainer_node::{Args, ShellHooks};
use learning_loop_transport::LoopClient;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if args.print_markdown_help {
        clap_markdown::print_help_markdown::<Args>();
        return Ok(());
    }
    let config = args.resolve()?;
    info!(
        host = %config.host,
        organization = %config.organization,
        project = %config.project,
        data_folder = %config.data_folder.display(),
        "starting learning loop trainer node"
    );

    let client = LoopClient::new(config.host.clone());
    let node = Node::new(config.data_folder.clone(), config.name.clone(), client.clone())?;
    info!(node_id = %node.id, "node identity resolved");

    let hooks = Arc::new(ShellHooks::new(
        config.train_command.clone(),
        vec![PretrainedModel {
            name: "tiny".to_string(),
            label: "Tiny (from scratch)".to_string(),
            description: "Trains from a randomly initialized network, no base model.".to_string(),
        }],
    ));
    let trainer_node =
        TrainerNode::with_retention(node, hooks, config.keep_old_trainings);

    client
        .set_incoming_handler(Arc::new(trainer_node.clone()))
        .await;

    let cancel = CancellationToken::new();
    let _connection_task = client.spawn_connection_task(cancel.clone());
    let _watch_task = trainer_node
        .node()
        .spawn_connection_watch(Arc::new(trainer_node.clone()), cancel.clone());

    trainer_node.try_continue_run_if_incomplete().await;

    let training_completed = trainer_node.training_completed_notify();
    let mut sigterm = unix_sigterm()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received interrupt, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("received terminate signal, shutting down");
                break;
            }
            _ = training_completed.notified() => {
                if config.restart_after_training && !config.manual_restart {
                    info!("training reached a terminal state, exiting for supervisor restart");
                    cancel.cancel();
                    return Ok(());
                }
            }
        }
    }

    // Stop the active training first so its cleanup handler runs before the event channel and
    // connection watchdog are torn down.
    trainer_node.stop_training().await;
    cancel.cancel();
    Ok(())
}

fn unix_sigterm() -> anyhow::Result<tokio::signal::unix::Signal> {
    Ok(tokio::signal::unix::signal(
        tokio::signal::unix::SignalKind::terminate(),
    )?)
}
