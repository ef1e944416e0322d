use std::path::PathBuf;
use std::sync::Arc;

use learning_loop_protocol::NodeId;
use learning_loop_transport::LoopClient;
use tokio_util::sync::CancellationToken;

use crate::connection::{run_connection_watch, ConnectionObserver};
use crate::identity::{load_or_create, IdentityError};

/// Base lifecycle every node role (trainer, detector, annotator, converter) builds on: a
/// persistent identity, the Learning Loop client, and the connection watchdog. Concrete
/// subclasses (only `TrainerNode` is core here) shape their own status payload and event
/// routing on top.
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub data_folder: PathBuf,
    pub client: LoopClient,
}

impl Node {
    pub fn new(
        data_folder: impl Into<PathBuf>,
        name: impl Into<String>,
        client: LoopClient,
    ) -> Result<Self, IdentityError> {
        let data_folder = data_folder.into();
        let id = load_or_create(&data_folder)?;
        Ok(Self {
            id,
            name: name.into(),
            data_folder,
            client,
        })
    }

    /// Spawns the connection watchdog, calling `observer` on every connect/disconnect edge.
    pub fn spawn_connection_watch(
        &self,
        observer: Arc<dyn ConnectionObserver>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let state = self.client.connection_state();
        tokio::spawn(run_connection_watch(state, observer, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learning_loop_transport::LoopClient;

    struct NoopObserver;
    #[async_trait::async_trait]
    impl ConnectionObserver for NoopObserver {
        async fn on_connected(&self) {}
        async fn on_disconnected(&self) {}
    }

    #[tokio::test]
    async fn identity_persists_across_construction() {
        let dir = tempfile::tempdir().unwrap();
        let client = LoopClient::new("http://localhost:9999");
        let node1 = Node::new(dir.path(), "trainer-a", client.clone()).unwrap();
        let node2 = Node::new(dir.path(), "trainer-a", client).unwrap();
        assert_eq!(node1.id, node2.id);
    }

    #[tokio::test]
    async fn connection_watch_calls_observer_on_start() {
        let dir = tempfile::tempdir().unwrap();
        let client = LoopClient::new("http://localhost:9999");
        let node = Node::new(dir.path(), "trainer-a", client).unwrap();
        let cancel = CancellationToken::new();
        let handle = node.spawn_connection_watch(Arc::new(NoopObserver), cancel.clone());
        cancel.cancel();
        let _ = handle.await;
    }
}
