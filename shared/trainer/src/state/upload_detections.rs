use crate::error::HandlerError;
use crate::hooks::TrainerHooks;
use crate::logic::TrainerLogic;

/// `Detected -> ReadyForCleanup`. Walks every detection batch file in ascending index order and
/// uploads it, skipping indices already covered by `detection_upload_progress.json` -- resuming
/// after a crash only re-sends the batches that never made it out (testable property 6).
pub async fn upload_detections<H: TrainerHooks>(logic: &TrainerLogic<H>) -> Result<(), HandlerError> {
    let progress = logic.io().detection_upload_progress()?;
    for idx in logic.io().detection_batch_indices()? {
        if progress.is_some_and(|p| idx <= p) {
            continue;
        }
        let batch = logic.io().read_detection_batch(idx)?;
        logic.data().upload_detection_batch(&batch).await?;
        logic.io().set_detection_upload_progress(idx)?;
    }
    Ok(())
}
