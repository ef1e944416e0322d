use crate::error::HandlerError;
use crate::hooks::TrainerHooks;
use crate::logic::TrainerLogic;

/// `ConfusionMatrixSynced -> TrainModelUploaded`. Uploads every format the hook reports, skipping
/// any already recorded in `model_upload_progress.json` so retries never upload a format twice
/// (testable property 3). The uuid returned by the *last* format uploaded this call becomes
/// `model_id_for_detecting` -- if every format was already uploaded on a prior attempt, the
/// previously stored id is left untouched.
pub async fn upload_model<H: TrainerHooks>(logic: &TrainerLogic<H>) -> Result<(), HandlerError> {
    let training = logic.training().await;
    let files_by_format = logic
        .hooks()
        .get_latest_model_files(&training.training_folder)
        .await?;
    let already_uploaded = logic.io().model_upload_progress()?;

    let mut newly_uploaded_id = None;
    for (format, files) in files_by_format {
        if already_uploaded.iter().any(|f| f == &format) {
            continue;
        }
        let id = logic
            .data()
            .upload_model_files(training.training_number, &format, &files)
            .await?;
        logic.io().mark_model_format_uploaded(&format)?;
        newly_uploaded_id = Some(id);
    }

    if let Some(id) = newly_uploaded_id {
        logic
            .mutate_training(|t| t.model_id_for_detecting = Some(id))
            .await?;
    }
    Ok(())
}
