use std::sync::Arc;
use std::time::Duration;

use learning_loop_core::{ErrorKey, ErrorMap, Training, TrainingState};
use learning_loop_data::DataExchanger;
use learning_loop_executor::Executor;
use learning_loop_persistence::TrainingIo;
use learning_loop_protocol::NodeId;
use learning_loop_transport::LoopClient;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;
use crate::hooks::TrainerHooks;

/// One instance per active training. Owns everything a `state` handler needs: the durable
/// `Training` record, the persistence, data-exchange and executor handles scoped to this
/// training, and the hooks implementation that supplies the domain-specific pieces.
///
/// `Arc<TrainerLogic<H>>` is the shape this is always held in -- `run_training_loop` takes one,
/// and handlers borrow it for the duration of a single state.
pub struct TrainerLogic<H: TrainerHooks> {
    training: RwLock<Training>,
    io: TrainingIo,
    data: DataExchanger,
    client: LoopClient,
    executor: Mutex<Executor>,
    errors: Mutex<ErrorMap>,
    hooks: Arc<H>,
    node_id: NodeId,
    cancel: CancellationToken,
    status_notify: Arc<Notify>,
    keep_old_trainings: bool,
}

impl<H: TrainerHooks> TrainerLogic<H> {
    pub fn new(
        training: Training,
        io: TrainingIo,
        data: DataExchanger,
        client: LoopClient,
        hooks: Arc<H>,
        node_id: NodeId,
    ) -> Self {
        Self::with_retention(training, io, data, client, hooks, node_id, false)
    }

    /// As `new`, but with `KEEP_OLD_TRAININGS` control over whether `clear_training` deletes the
    /// training folder on reaching `ReadyForCleanup`, or leaves it on disk for inspection.
    pub fn with_retention(
        training: Training,
        io: TrainingIo,
        data: DataExchanger,
        client: LoopClient,
        hooks: Arc<H>,
        node_id: NodeId,
        keep_old_trainings: bool,
    ) -> Self {
        let executor = Executor::new(training.training_folder.clone());
        Self {
            training: RwLock::new(training),
            io,
            data,
            client,
            executor: Mutex::new(executor),
            errors: Mutex::new(ErrorMap::new()),
            hooks,
            node_id,
            cancel: CancellationToken::new(),
            status_notify: Arc::new(Notify::new()),
            keep_old_trainings,
        }
    }

    pub fn keep_old_trainings(&self) -> bool {
        self.keep_old_trainings
    }

    pub async fn training(&self) -> Training {
        self.training.read().await.clone()
    }

    pub async fn errors(&self) -> ErrorMap {
        self.errors.lock().await.clone()
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn hooks(&self) -> &Arc<H> {
        &self.hooks
    }

    pub fn data(&self) -> &DataExchanger {
        &self.data
    }

    pub fn client(&self) -> &LoopClient {
        &self.client
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn status_notify(&self) -> Arc<Notify> {
        Arc::clone(&self.status_notify)
    }

    pub async fn executor_uptime(&self) -> Option<Duration> {
        self.executor.lock().await.uptime()
    }

    pub(crate) fn io(&self) -> &TrainingIo {
        &self.io
    }

    pub(crate) fn executor(&self) -> &Mutex<Executor> {
        &self.executor
    }

    /// Cancels the run. Idempotent: a `CancellationToken` tolerates being cancelled twice, and
    /// so does everything downstream of it.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub(crate) async fn set_state(&self, state: TrainingState) -> Result<(), HandlerError> {
        let mut guard = self.training.write().await;
        guard.training_state = state;
        self.io.save_training(&guard)?;
        drop(guard);
        self.status_notify.notify_one();
        Ok(())
    }

    pub(crate) async fn mutate_training(
        &self,
        f: impl FnOnce(&mut Training),
    ) -> Result<(), HandlerError> {
        let mut guard = self.training.write().await;
        f(&mut guard);
        self.io.save_training(&guard)?;
        Ok(())
    }

    pub(crate) async fn record_error(&self, key: ErrorKey, message: String) {
        self.errors.lock().await.set(key, message);
    }

    pub(crate) async fn reset_error(&self, key: ErrorKey) {
        self.errors.lock().await.reset(key);
    }
}
