use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use learning_loop_node::Node;
use learning_loop_protocol::PretrainedModel;
use learning_loop_trainer::TrainerNode;
use learning_loop_trainer_node::ShellHooks;
use learning_loop_transport::{ConnectionState, LoopClient};
use tokio_util::sync::CancellationToken;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Sets `LOOP_USERNAME`/`LOOP_PASSWORD` for the duration of a test. Callers must serialize with
/// `#[serial_test::serial]` since these are process-global environment variables.
///
/// # Safety
/// Only sound when no other thread reads or writes these variables concurrently -- guaranteed by
/// `#[serial]` on every caller.
pub fn set_test_credentials() {
    // SAFETY: see above; every caller is `#[serial]`.
    unsafe {
        std::env::set_var("LOOP_USERNAME", "test-user");
        std::env::set_var("LOOP_PASSWORD", "test-pass");
    }
}

/// Builds a minimal zip archive containing a single `model.json`, suitable for a mock server's
/// model-download responses. Uses `Stored` (no compression) so the archive is valid regardless
/// of which optional compression backend the `zip` crate was built with.
pub fn build_model_archive(model_json: &serde_json::Value) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("model.json", options).unwrap();
        std::io::Write::write_all(&mut writer, model_json.to_string().as_bytes()).unwrap();
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

/// Wires up a `TrainerNode<ShellHooks>` against `mock_url`, the same way the binary entrypoint
/// does: load (or create) node identity under `data_folder`, open the event channel, start the
/// connection watchdog, and resume any training left incomplete on disk. Returns the node and a
/// token that tears down both background tasks when cancelled.
pub async fn spawn_trainer_node(
    data_folder: &Path,
    mock_url: &str,
    train_command: &str,
    pretrained_models: Vec<PretrainedModel>,
) -> (TrainerNode<ShellHooks>, CancellationToken) {
    let client = LoopClient::new(mock_url);
    let node = Node::new(data_folder, "test-trainer", client.clone()).unwrap();

    let hooks = Arc::new(ShellHooks::new(train_command.to_string(), pretrained_models));
    let trainer_node = TrainerNode::new(node, hooks);

    client
        .set_incoming_handler(Arc::new(trainer_node.clone()))
        .await;

    let cancel = CancellationToken::new();
    client.spawn_connection_task(cancel.clone());
    trainer_node
        .node()
        .spawn_connection_watch(Arc::new(trainer_node.clone()), cancel.clone());

    trainer_node.try_continue_run_if_incomplete().await;

    (trainer_node, cancel)
}

/// Waits for the event channel's first connection, polling rather than sleeping a fixed amount.
pub async fn wait_for_connection(client: &LoopClient, timeout: Duration) {
    let mut state = client.connection_state();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if matches!(*state.borrow(), ConnectionState::Idle) {
            return;
        }
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            panic!("timed out waiting for the event channel to connect");
        }
        let _ = tokio::time::timeout(remaining, state.changed()).await;
    }
}

/// Polls `condition` until it returns true or `timeout` elapses, at which point it panics.
/// Useful for asserting on filesystem/mock-server side effects produced by a background task
/// rather than a notification this test already holds a handle to.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition was not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
