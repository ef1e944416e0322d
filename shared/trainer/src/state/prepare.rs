use learning_loop_core::{ImageData, ImageSet};

use crate::error::HandlerError;
use crate::hooks::TrainerHooks;
use crate::logic::TrainerLogic;

/// Every fifth image (by fetch order) is held out for testing. A fixed deterministic modulo
/// keeps `_prepare` idempotent and the split reproducible across retries and resumes (see
/// DESIGN.md).
const TEST_SET_STRIDE: usize = 5;

/// `Initialized -> DataDownloaded`. Idempotent: if `training.data.image_data` is already
/// populated (a prior run got this far before crashing), nothing is re-fetched.
pub async fn prepare<H: TrainerHooks>(logic: &TrainerLogic<H>) -> Result<(), HandlerError> {
    let training = logic.training().await;
    if !training.data.image_data.is_empty() {
        return Ok(());
    }

    let ids = logic.data().fetch_image_ids("state=complete").await?;
    logic
        .data()
        .download_images(&ids, &training.images_folder, |_done, _total| {})
        .await?;

    let image_data = ids
        .into_iter()
        .enumerate()
        .map(|(i, id)| ImageData {
            id,
            set: if i % TEST_SET_STRIDE == TEST_SET_STRIDE - 1 {
                ImageSet::Test
            } else {
                ImageSet::Train
            },
        })
        .collect();

    logic
        .mutate_training(|t| t.data.image_data = image_data)
        .await?;
    Ok(())
}
