use std::time::Duration;

use learning_loop_core::{is_valid_uuid4, ErrorKey};
use learning_loop_watcher::Ticker;
use tracing::warn;

use crate::error::HandlerError;
use crate::hooks::TrainerHooks;
use crate::logic::TrainerLogic;
use crate::state::sync::sync_confusion_matrix;

const LIVENESS_INTERVAL: Duration = Duration::from_millis(100);
const CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// `TrainModelDownloaded -> TrainingFinished`. Starts the subprocess (resuming it, if the hook
/// supports that, rather than starting fresh) and supervises it until it exits: every 100ms it
/// checks liveness, and every 5s it additionally checks the log for a fatal error and opportunistically
/// syncs the confusion matrix.
pub async fn train<H: TrainerHooks>(logic: &TrainerLogic<H>) -> Result<(), HandlerError> {
    let training = logic.training().await;
    let cmd = select_command(logic, &training).await?;

    {
        let mut executor = logic.executor().lock().await;
        executor.start(&cmd).await?;
    }

    let mut liveness = Ticker::new(LIVENESS_INTERVAL);
    let mut check = Ticker::new(CHECK_INTERVAL);
    let cancel = logic.cancel_token().clone();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                logic.executor().lock().await.stop().await.ok();
                return Err(HandlerError::Cancelled);
            }
            tick = liveness.tick(&cancel) => {
                if tick.is_none() {
                    logic.executor().lock().await.stop().await.ok();
                    return Err(HandlerError::Cancelled);
                }
                let still_running = logic.executor().lock().await.is_process_running();
                if !still_running {
                    let outcome = finish_after_exit(logic).await;
                    if outcome.is_ok() {
                        logic.reset_error(ErrorKey::TrainingError).await;
                    }
                    return outcome;
                }
            }
            tick = check.tick(&cancel) => {
                if tick.is_none() {
                    logic.executor().lock().await.stop().await.ok();
                    return Err(HandlerError::Cancelled);
                }
                if let Some(err) = executor_log_error(logic).await? {
                    logic.executor().lock().await.stop().await.ok();
                    logic.record_error(ErrorKey::TrainingError, err.clone()).await;
                    return Err(HandlerError::Failed(err));
                }
                if let Err(err) = sync_confusion_matrix(logic).await {
                    warn!(?err, "opportunistic confusion-matrix sync failed, continuing");
                }
            }
        }
    }
}

/// The subprocess has exited on its own. A log-reported error means a crash (training_error);
/// anything else means it finished.
async fn finish_after_exit<H: TrainerHooks>(logic: &TrainerLogic<H>) -> Result<(), HandlerError> {
    match executor_log_error(logic).await? {
        Some(err) => {
            logic.record_error(ErrorKey::TrainingError, err.clone()).await;
            Err(HandlerError::Failed(err))
        }
        None => Ok(()),
    }
}

async fn executor_log_error<H: TrainerHooks>(
    logic: &TrainerLogic<H>,
) -> Result<Option<String>, HandlerError> {
    let log = logic.executor().lock().await.get_log().await?;
    Ok(logic.hooks().get_executor_error_from_log(&log).await)
}

async fn select_command<H: TrainerHooks>(
    logic: &TrainerLogic<H>,
    training: &learning_loop_core::Training,
) -> Result<String, HandlerError> {
    if logic.hooks().can_resume(training) {
        return Ok(logic.hooks().resume(training).await?);
    }
    if is_valid_uuid4(&training.base_model_id) {
        return Ok(logic.hooks().start_training(training).await?);
    }
    let pretrained = logic
        .hooks()
        .provided_pretrained_models()
        .into_iter()
        .find(|m| m.name == training.base_model_id);
    match pretrained {
        Some(model) => Ok(logic
            .hooks()
            .start_training_from_scratch(training, &model.name)
            .await?),
        None => {
            // Recorded under `start_training` specifically for this branch, distinct from the
            // handler's own `run_training` key; `perform_state` still records the same message
            // under `run_training` too, which is redundant but harmless.
            let message = format!(
                "base_model_id '{}' is neither a loop uuid nor a known pretrained model",
                training.base_model_id
            );
            logic.record_error(ErrorKey::StartTraining, message.clone()).await;
            Err(HandlerError::Failed(message))
        }
    }
}
