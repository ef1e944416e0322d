mod cleanup;
mod detect;
mod download_model;
mod prepare;
mod sync;
mod train;
mod upload_detections;
mod upload_model;

use std::sync::Arc;
use std::time::Duration;

use learning_loop_core::{ErrorKey, TrainingState};
use tracing::{info, warn};

use crate::error::HandlerError;
use crate::hooks::TrainerHooks;
use crate::logic::TrainerLogic;

pub use cleanup::clear_training;
pub use detect::do_detections;
pub use download_model::download_model;
pub use prepare::prepare;
pub use sync::sync_confusion_matrix;
pub use train::train;
pub use upload_detections::upload_detections;
pub use upload_model::upload_model;

/// Between-state pacing; deliberately nonzero so the loop yields to the event channel and other
/// tasks rather than spinning.
const BETWEEN_STATE_DELAY: Duration = Duration::from_millis(600);

/// Wraps one handler: records the transitioning state, runs `f`, then records either the
/// completed state (success) or rolls back to `transitioning.previous()` (failure), resetting or
/// setting the handler's error-map key accordingly. Cancellation is never swallowed.
async fn perform_state<H, F, Fut>(
    logic: &TrainerLogic<H>,
    key: ErrorKey,
    transitioning: TrainingState,
    completed: TrainingState,
    f: F,
) -> Result<(), HandlerError>
where
    H: TrainerHooks,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(), HandlerError>>,
{
    logic.set_state(transitioning).await?;
    match f().await {
        Ok(()) => {
            logic.set_state(completed).await?;
            logic.reset_error(key).await;
            Ok(())
        }
        Err(HandlerError::Cancelled) => Err(HandlerError::Cancelled),
        Err(HandlerError::Failed(message)) => {
            logic.record_error(key, message.clone()).await;
            logic.set_state(transitioning.previous()).await?;
            Err(HandlerError::Failed(message))
        }
    }
}

/// Runs `clear_training` through `perform_state` with a no-op transition (`ReadyForCleanup` is
/// both the transitioning and completed state) so a failure there is recorded and retried rather
/// than silently dropped.
async fn run_cleanup<H: TrainerHooks>(logic: &TrainerLogic<H>) -> Result<(), HandlerError> {
    perform_state(
        logic,
        ErrorKey::ClearTrainingData,
        TrainingState::ReadyForCleanup,
        TrainingState::ReadyForCleanup,
        || clear_training(logic),
    )
    .await
}

/// The state-machine task body. Repeatedly inspects `training.training_state`, dispatches to the
/// matching handler, and sleeps briefly between iterations. Returns once `ReadyForCleanup` has
/// been handled or the run is cancelled -- either way, cleanup has already run by the time this
/// returns.
pub async fn run_training_loop<H: TrainerHooks>(logic: Arc<TrainerLogic<H>>) {
    loop {
        let state = logic.training().await.training_state;
        let outcome = match state {
            TrainingState::Initialized | TrainingState::DataDownloading => {
                perform_state(
                    &logic,
                    ErrorKey::Prepare,
                    TrainingState::DataDownloading,
                    TrainingState::DataDownloaded,
                    || prepare(&logic),
                )
                .await
            }
            TrainingState::DataDownloaded | TrainingState::TrainModelDownloading => {
                perform_state(
                    &logic,
                    ErrorKey::DownloadModel,
                    TrainingState::TrainModelDownloading,
                    TrainingState::TrainModelDownloaded,
                    || download_model(&logic),
                )
                .await
            }
            TrainingState::TrainModelDownloaded | TrainingState::TrainingRunning => {
                perform_state(
                    &logic,
                    ErrorKey::RunTraining,
                    TrainingState::TrainingRunning,
                    TrainingState::TrainingFinished,
                    || train(&logic),
                )
                .await
            }
            TrainingState::TrainingFinished | TrainingState::ConfusionMatrixSyncing => {
                perform_state(
                    &logic,
                    ErrorKey::SyncConfusionMatrix,
                    TrainingState::ConfusionMatrixSyncing,
                    TrainingState::ConfusionMatrixSynced,
                    || sync_confusion_matrix(&logic),
                )
                .await
            }
            TrainingState::ConfusionMatrixSynced | TrainingState::TrainModelUploading => {
                perform_state(
                    &logic,
                    ErrorKey::UploadModel,
                    TrainingState::TrainModelUploading,
                    TrainingState::TrainModelUploaded,
                    || upload_model(&logic),
                )
                .await
            }
            TrainingState::TrainModelUploaded | TrainingState::Detecting => {
                perform_state(
                    &logic,
                    ErrorKey::Detecting,
                    TrainingState::Detecting,
                    TrainingState::Detected,
                    || do_detections(&logic),
                )
                .await
            }
            TrainingState::Detected | TrainingState::DetectionUploading => {
                perform_state(
                    &logic,
                    ErrorKey::UploadDetections,
                    TrainingState::DetectionUploading,
                    TrainingState::ReadyForCleanup,
                    || upload_detections(&logic),
                )
                .await
            }
            TrainingState::ReadyForCleanup => {
                let _ = run_cleanup(&logic).await;
                info!(training_id = %logic.training().await.id, "training reached terminal state");
                return;
            }
        };

        if let Err(HandlerError::Cancelled) = outcome {
            warn!("training loop cancelled, running cleanup");
            logic.set_state(TrainingState::ReadyForCleanup).await.ok();
            let _ = run_cleanup(&logic).await;
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(BETWEEN_STATE_DELAY) => {}
            _ = logic.cancel_token().cancelled() => {
                logic.set_state(TrainingState::ReadyForCleanup).await.ok();
                let _ = run_cleanup(&logic).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use async_trait::async_trait;
    use learning_loop_core::{
        BasicModel, Context, Detections, ModelInformation, Training,
    };
    use learning_loop_data::DataExchanger;
    use learning_loop_persistence::TrainingIo;
    use learning_loop_protocol::{NodeId, PretrainedModel};
    use learning_loop_transport::LoopClient;

    use super::*;
    use crate::hooks::TrainerHooks;

    struct DummyHooks;

    #[async_trait]
    impl TrainerHooks for DummyHooks {
        async fn start_training(&self, _training: &Training) -> anyhow::Result<String> {
            unimplemented!()
        }
        async fn start_training_from_scratch(
            &self,
            _training: &Training,
            _name: &str,
        ) -> anyhow::Result<String> {
            unimplemented!()
        }
        async fn get_executor_error_from_log(&self, _log: &str) -> Option<String> {
            None
        }
        async fn get_new_model(&self, _training: &Training) -> anyhow::Result<Option<BasicModel>> {
            Ok(None)
        }
        async fn on_model_published(
            &self,
            _training: &Training,
            _model: &BasicModel,
        ) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_latest_model_files(
            &self,
            _folder: &Path,
        ) -> anyhow::Result<HashMap<String, Vec<PathBuf>>> {
            Ok(HashMap::new())
        }
        async fn detect(
            &self,
            _model_info: &ModelInformation,
            _images: &[String],
            _model_folder: &Path,
        ) -> anyhow::Result<Vec<Detections>> {
            Ok(Vec::new())
        }
        async fn clear_training_data(&self, _folder: &Path) -> anyhow::Result<()> {
            Ok(())
        }
        fn provided_pretrained_models(&self) -> Vec<PretrainedModel> {
            Vec::new()
        }
    }

    fn make_logic(dir: &Path) -> TrainerLogic<DummyHooks> {
        let context = Context::new("org", "proj");
        let training = Training::new("t1".into(), context.clone(), 0, "tiny".into(), dir);
        std::fs::create_dir_all(&training.training_folder).unwrap();
        let io = TrainingIo::new(&training.training_folder);
        let client = LoopClient::new("http://localhost:1");
        let data = DataExchanger::new(client.clone(), context);
        TrainerLogic::new(training, io, data, client, Arc::new(DummyHooks), NodeId::generate())
    }

    #[tokio::test]
    async fn perform_state_rolls_back_and_records_error_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let logic = make_logic(dir.path());

        let result = perform_state(
            &logic,
            ErrorKey::Prepare,
            TrainingState::DataDownloading,
            TrainingState::DataDownloaded,
            || async { Err(HandlerError::Failed("boom".to_string())) },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(
            logic.training().await.training_state,
            TrainingState::Initialized
        );
        assert_eq!(logic.errors().await.get(ErrorKey::Prepare), Some("boom"));
    }

    #[tokio::test]
    async fn perform_state_advances_and_clears_error_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let logic = make_logic(dir.path());
        logic.record_error(ErrorKey::Prepare, "stale".to_string()).await;

        let result = perform_state(
            &logic,
            ErrorKey::Prepare,
            TrainingState::DataDownloading,
            TrainingState::DataDownloaded,
            || async { Ok(()) },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(
            logic.training().await.training_state,
            TrainingState::DataDownloaded
        );
        assert_eq!(logic.errors().await.get(ErrorKey::Prepare), None);
    }

    #[tokio::test]
    async fn cancellation_propagates_without_being_recorded_as_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let logic = make_logic(dir.path());

        let result = perform_state(
            &logic,
            ErrorKey::Prepare,
            TrainingState::DataDownloading,
            TrainingState::DataDownloaded,
            || async { Err(HandlerError::Cancelled) },
        )
        .await;

        assert!(matches!(result, Err(HandlerError::Cancelled)));
        assert!(logic.errors().await.is_empty());
    }
}
