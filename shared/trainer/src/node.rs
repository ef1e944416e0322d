use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use learning_loop_core::{Context, ErrorKey, ErrorMap, Hyperparameter, Training};
use learning_loop_data::DataExchanger;
use learning_loop_node::{ConnectionObserver, Node};
use learning_loop_persistence::TrainingIo;
use learning_loop_protocol::{
    BeginTrainingDetails, IncomingEvent, OutgoingEvent, PretrainedModel, SocketResponse,
    TrainerStatus,
};
use learning_loop_transport::IncomingHandler;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::hooks::TrainerHooks;
use crate::logic::TrainerLogic;
use crate::state::run_training_loop;

/// Upper bound between status pushes when nothing has changed state.
const STATUS_PUSH_INTERVAL: Duration = Duration::from_secs(5);

struct Inner<H: TrainerHooks> {
    node: Node,
    hooks: Arc<H>,
    active: Mutex<Option<(Arc<TrainerLogic<H>>, CancellationToken)>>,
    keep_old_trainings: bool,
    training_completed: Arc<tokio::sync::Notify>,
}

/// The concrete `Node` subclass for this role: routes incoming channel events to the state
/// machine, and reports status. Cheap to clone -- every clone shares the same underlying state,
/// backed by an `Arc`-wrapped handle shared across spawned tasks.
pub struct TrainerNode<H: TrainerHooks> {
    inner: Arc<Inner<H>>,
}

impl<H: TrainerHooks> Clone for TrainerNode<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: TrainerHooks + 'static> TrainerNode<H> {
    pub fn new(node: Node, hooks: Arc<H>) -> Self {
        Self::with_retention(node, hooks, false)
    }

    /// As `new`, but forwarding the `KEEP_OLD_TRAININGS` choice to every training this node runs.
    pub fn with_retention(node: Node, hooks: Arc<H>, keep_old_trainings: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                node,
                hooks,
                active: Mutex::new(None),
                keep_old_trainings,
                training_completed: Arc::new(tokio::sync::Notify::new()),
            }),
        }
    }

    pub fn node(&self) -> &Node {
        &self.inner.node
    }

    /// Fires once every time a training run reaches its terminal state (or is cancelled and
    /// cleaned up). `RESTART_AFTER_TRAINING` wiring in the binary entrypoint awaits this to
    /// decide when to self-exit.
    pub fn training_completed_notify(&self) -> Arc<tokio::sync::Notify> {
        Arc::clone(&self.inner.training_completed)
    }

    fn data_folder(&self) -> PathBuf {
        self.inner.node.data_folder.clone()
    }

    /// Resumes a training left incomplete by a previous run, if one is on disk. Call once at
    /// startup, before the node starts accepting events.
    pub async fn try_continue_run_if_incomplete(&self) {
        match TrainingIo::find_active_training(&self.data_folder()) {
            Ok(Some((training, io))) => {
                info!(training_id = %training.id, state = ?training.training_state, "resuming incomplete training");
                self.spawn_training(training, io).await;
            }
            Ok(None) => {}
            Err(err) => warn!(%err, "failed to scan for a resumable training"),
        }
    }

    /// `begin_training(org, project, details)`. Rejected while a training is already active
    /// (testable property 4).
    pub async fn begin_training(&self, context: Context, details: BeginTrainingDetails) -> bool {
        if self.inner.active.lock().await.is_some() {
            warn!("begin_training rejected: a training is already active");
            return false;
        }

        let data_folder = self.data_folder();
        // The training's own id is freshly generated per run -- `details.id` names the *base
        // model* to train from (a loop uuid or a pretrained-model name), which is a different
        // thing entirely (see `is_valid_uuid4`'s doc comment in `learning-loop-core`).
        let training_id = uuid::Uuid::new_v4().to_string();
        let mut training = Training::new(
            training_id,
            context.clone(),
            details.training_number,
            details.id,
            &data_folder,
        );
        training.data.categories = details.categories;
        training.data.hyperparameter = Some(Hyperparameter {
            resolution: details.resolution,
            flip_rl: details.flip_rl,
            flip_ud: details.flip_ud,
            extra: details.extra,
        });

        let io = TrainingIo::new(&training.training_folder);
        self.spawn_training(training, io).await;
        true
    }

    async fn spawn_training(&self, training: Training, io: TrainingIo) {
        if let Err(err) = tokio::fs::create_dir_all(&training.training_folder).await {
            warn!(%err, "failed to create training folder");
            return;
        }
        let client = self.inner.node.client.clone();
        let context = training.context.clone();
        let data = DataExchanger::new(client.clone(), context);
        let logic = Arc::new(TrainerLogic::with_retention(
            training,
            io,
            data,
            client,
            Arc::clone(&self.inner.hooks),
            self.inner.node.id.clone(),
            self.inner.keep_old_trainings,
        ));
        let cancel = logic.cancel_token().clone();
        *self.inner.active.lock().await = Some((Arc::clone(&logic), cancel.clone()));

        let status_notify = logic.status_notify();
        let status_this = self.clone();
        let status_cancel = cancel.clone();
        tokio::spawn(async move {
            status_this
                .run_status_pushes(status_notify, status_cancel)
                .await;
        });

        let this = self.clone();
        tokio::spawn(async move {
            run_training_loop(logic).await;
            *this.inner.active.lock().await = None;
            this.inner.training_completed.notify_waiters();
        });
    }

    /// Pushes a status update on every state transition (`status_notify`) and otherwise at least
    /// every `STATUS_PUSH_INTERVAL`. Stops once this training's cancellation token
    /// fires -- the final post-cleanup status push happens separately, after `active` clears.
    async fn run_status_pushes(&self, status_notify: Arc<tokio::sync::Notify>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = status_notify.notified() => {}
                _ = tokio::time::sleep(STATUS_PUSH_INTERVAL) => {}
                _ = cancel.cancelled() => break,
            }
            if let Err(err) = self.send_status().await {
                warn!(%err, "failed to push status update");
            }
        }
    }

    /// `stop_training()`. Idempotent: stopping with nothing active is a harmless no-op.
    pub async fn stop_training(&self) -> bool {
        if let Some((logic, _)) = self.inner.active.lock().await.as_ref() {
            logic.stop();
        }
        true
    }

    /// `save(org, project, model)`. This targets *a* model id, not necessarily the
    /// active training's -- but without a durable index of past trainings by model id, the only
    /// model this implementation can resolve files for is the one currently (or most recently)
    /// active under the same context. Requesting any other id fails with a descriptive error
    /// (see DESIGN.md for the Open Question this resolves).
    pub async fn save(&self, context: Context, model_id: String) -> Result<(), String> {
        let active = self.inner.active.lock().await.as_ref().map(|(l, _)| Arc::clone(l));
        let logic = active.ok_or_else(|| "no active training".to_string())?;
        let training = logic.training().await;
        if training.context != context {
            return Err("no active training for that organization/project".to_string());
        }
        if training.model_id_for_detecting.as_deref() != Some(model_id.as_str()) {
            let message = format!(
                "model '{model_id}' is not the active training's uploaded model, nothing to save"
            );
            logic.record_error(ErrorKey::SaveModel, message.clone()).await;
            return Err(message);
        }

        let result = Self::save_active(&logic, &training).await;
        match &result {
            Ok(()) => logic.reset_error(ErrorKey::SaveModel).await,
            Err(message) => logic.record_error(ErrorKey::SaveModel, message.clone()).await,
        }
        result
    }

    async fn save_active(
        logic: &TrainerLogic<H>,
        training: &learning_loop_core::Training,
    ) -> Result<(), String> {
        let files = logic
            .hooks()
            .get_latest_model_files(&training.training_folder)
            .await
            .map_err(|err| err.to_string())?;
        for (format, files) in files {
            logic
                .data()
                .upload_model_files(training.training_number, &format, &files)
                .await
                .map_err(|err| err.to_string())?;
        }
        Ok(())
    }

    async fn state_label(&self) -> String {
        match self.inner.active.lock().await.as_ref() {
            Some((logic, _)) => format!("{:?}", logic.training().await.training_state),
            None => "idle".to_string(),
        }
    }

    async fn current_errors(&self) -> ErrorMap {
        match self.inner.active.lock().await.as_ref() {
            Some((logic, _)) => logic.errors().await,
            None => ErrorMap::new(),
        }
    }

    /// Builds and sends the status heartbeat. On rejection, training is stopped if the node
    /// isn't idle -- a loop-side status rejection fails fast rather than retrying silently.
    pub async fn send_status(&self) -> Result<(), learning_loop_transport::TransportError> {
        let active = self.inner.active.lock().await.as_ref().map(|(l, _)| Arc::clone(l));
        let training_uptime = match &active {
            Some(logic) => logic.executor_uptime().await.map(|d| d.as_secs()),
            None => None,
        };

        let status = TrainerStatus {
            id: self.inner.node.id.to_string(),
            name: self.inner.node.name.clone(),
            state: self.state_label().await,
            training_progress: self.inner.hooks.training_progress(),
            model_format: None,
            training_uptime,
            provided_pretrained_models: self.provided_pretrained_models(),
            errors: self.current_errors().await,
        };

        let response = self
            .inner
            .node
            .client
            .send_status(&OutgoingEvent::UpdateTrainer { status })
            .await?;

        if !response.success {
            let is_idle = active.is_none();
            if !is_idle {
                warn!("loop rejected status update while training is active, stopping it");
                self.stop_training().await;
            }
        }
        Ok(())
    }

    fn provided_pretrained_models(&self) -> Vec<PretrainedModel> {
        self.inner.hooks.provided_pretrained_models()
    }
}

#[async_trait]
impl<H: TrainerHooks + 'static> ConnectionObserver for TrainerNode<H> {
    async fn on_connected(&self) {
        if let Err(err) = self.send_status().await {
            warn!(%err, "failed to send status after connecting");
        }
    }

    async fn on_disconnected(&self) {
        info!("event channel disconnected");
    }
}

impl<H: TrainerHooks + 'static> IncomingHandler for TrainerNode<H> {
    fn handle(&self, event: serde_json::Value) -> BoxFuture<'static, SocketResponse> {
        let this = self.clone();
        Box::pin(async move { this.dispatch(event).await })
    }
}

impl<H: TrainerHooks + 'static> TrainerNode<H> {
    async fn dispatch(&self, event: serde_json::Value) -> SocketResponse {
        let event: IncomingEvent = match serde_json::from_value(event) {
            Ok(event) => event,
            Err(err) => return SocketResponse::error(format!("malformed event: {err}")),
        };

        match event {
            IncomingEvent::BeginTraining {
                organization,
                project,
                details,
            } => {
                let context = Context::new(organization, project);
                let ok = self.begin_training(context, details).await;
                SocketResponse {
                    success: true,
                    payload: Some(serde_json::Value::Bool(ok)),
                }
            }
            IncomingEvent::StopTraining => {
                let ok = self.stop_training().await;
                SocketResponse {
                    success: true,
                    payload: Some(serde_json::Value::Bool(ok)),
                }
            }
            IncomingEvent::Save {
                organization,
                project,
                model,
            } => {
                let context = Context::new(organization, project);
                match self.save(context, model).await {
                    Ok(()) => SocketResponse::ok(),
                    Err(err) => SocketResponse::error(err),
                }
            }
            IncomingEvent::Connect => {
                self.on_connected().await;
                SocketResponse::ok()
            }
            IncomingEvent::Disconnect => {
                self.on_disconnected().await;
                SocketResponse::ok()
            }
        }
    }
}
