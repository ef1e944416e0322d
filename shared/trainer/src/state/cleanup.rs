use crate::error::HandlerError;
use crate::hooks::TrainerHooks;
use crate::logic::TrainerLogic;

/// Terminal state. Lets the hook decide what to keep (e.g. a retained model snapshot for a
/// later `save()` call) before the whole training folder, including the resume marker, is
/// removed. Run through `perform_state` like every other handler so a failure here is recorded
/// and retried on the next tick rather than wedging the node.
pub async fn clear_training<H: TrainerHooks>(logic: &TrainerLogic<H>) -> Result<(), HandlerError> {
    let training = logic.training().await;
    logic.hooks().clear_training_data(&training.training_folder).await?;
    if !logic.keep_old_trainings() {
        logic.io().clear()?;
    }
    Ok(())
}
