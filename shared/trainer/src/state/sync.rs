use learning_loop_core::{ErrorKey, TrainingOut};
use learning_loop_protocol::OutgoingEvent;

use crate::error::HandlerError;
use crate::hooks::TrainerHooks;
use crate::logic::TrainerLogic;

/// Polls `get_new_model`; if a fresh snapshot is available, pushes it via `update_training` and,
/// on acceptance, lets the hook retain it. Used both as the `TrainingFinished -> ConfusionMatrixSynced`
/// handler and opportunistically every 5s from inside `_train` -- same function either way,
/// since "final sync" and "opportunistic sync" differ only in when they're called, not in what
/// they do.
///
/// Records the finer `get_new_model`/`update_model` keys alongside the outer `sync_confusion_matrix`
/// key `perform_state` already records, matching `select_command`'s `start_training` split --
/// redundant with the outer key but lets a status heartbeat distinguish which half failed.
pub async fn sync_confusion_matrix<H: TrainerHooks>(
    logic: &TrainerLogic<H>,
) -> Result<(), HandlerError> {
    let training = logic.training().await;
    let model = match logic.hooks().get_new_model(&training).await {
        Ok(model) => model,
        Err(err) => {
            logic.record_error(ErrorKey::GetNewModel, err.to_string()).await;
            return Err(err.into());
        }
    };
    let Some(model) = model else {
        return Ok(());
    };

    let training_out = TrainingOut {
        trainer_id: logic.node_id().to_string(),
        confusion_matrix: model.confusion_matrix.clone(),
        train_image_count: training.data.train_image_count(),
        test_image_count: training.data.test_image_count(),
        hyperparameters: training
            .data
            .hyperparameter
            .as_ref()
            .map(|h| serde_json::to_value(h).expect("Hyperparameter always serializes")),
    };
    let event = OutgoingEvent::UpdateTraining {
        organization: training.context.organization.clone(),
        project: training.context.project.clone(),
        training: training_out,
    };

    let response = logic.client().send_status(&event).await?;
    if !response.success {
        let message = response
            .error_message()
            .unwrap_or("update_training was rejected by the loop")
            .to_string();
        logic.record_error(ErrorKey::UpdateModel, message.clone()).await;
        return Err(HandlerError::Failed(message));
    }
    logic.reset_error(ErrorKey::GetNewModel).await;
    logic.reset_error(ErrorKey::UpdateModel).await;

    logic.hooks().on_model_published(&training, &model).await?;
    Ok(())
}
