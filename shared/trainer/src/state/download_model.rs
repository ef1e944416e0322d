use learning_loop_core::is_valid_uuid4;

use crate::error::HandlerError;
use crate::hooks::TrainerHooks;
use crate::logic::TrainerLogic;

/// Archive format requested when fetching a loop-hosted base model to continue training from.
/// `"latest"` matches the loop HTTP contract's own `models/{id}/{format}/file` route, which
/// accepts `latest` as a format alias for "whatever was uploaded most recently" (see DESIGN.md).
const BASE_MODEL_FORMAT: &str = "latest";

/// `DataDownloaded -> TrainModelDownloaded`. No-op (beyond the state transition) unless
/// `base_model_id` is a loop-issued uuid; a pretrained-model name is handled entirely inside
/// `_train` via `start_training_from_scratch`.
pub async fn download_model<H: TrainerHooks>(logic: &TrainerLogic<H>) -> Result<(), HandlerError> {
    let training = logic.training().await;
    if !is_valid_uuid4(&training.base_model_id) {
        return Ok(());
    }

    logic
        .data()
        .download_model_archive(
            &training.base_model_id,
            BASE_MODEL_FORMAT,
            &training.training_folder,
        )
        .await?;

    let model_json = training.training_folder.join("model.json");
    let base_model_json = training.training_folder.join("base_model.json");
    if tokio::fs::try_exists(&model_json).await? {
        tokio::fs::rename(&model_json, &base_model_json).await?;
    }
    Ok(())
}
