use std::collections::BTreeSet;

use learning_loop_core::ModelInformation;
use learning_loop_data::DETECTION_FILE_BATCH_SIZE;

use crate::error::HandlerError;
use crate::hooks::TrainerHooks;
use crate::logic::TrainerLogic;

/// Every image state the loop tracks; detection runs over the union of all of them, not just
/// `complete` (unlike `_prepare`, which only trains on completed images).
const DETECTION_IMAGE_STATES: [&str; 4] = ["inbox", "annotate", "review", "complete"];

/// `TrainModelUploaded -> Detected`. Re-downloads the just-uploaded model (the trainer process
/// that produced it may have already exited and cleaned up its in-memory copy), then runs
/// inference over every project image in batches of `DETECTION_FILE_BATCH_SIZE`, writing each
/// batch to disk as soon as it's produced.
pub async fn do_detections<H: TrainerHooks>(logic: &TrainerLogic<H>) -> Result<(), HandlerError> {
    let training = logic.training().await;
    let model_id = training.model_id_for_detecting.clone().ok_or_else(|| {
        HandlerError::Failed("no model_id_for_detecting recorded by upload_model".to_string())
    })?;

    let model_folder = training.training_folder.join("detect_model");
    logic
        .data()
        .download_model_archive(&model_id, "latest", &model_folder)
        .await?;
    let model_info = read_model_information(&model_folder).await?;

    let mut all_ids = BTreeSet::new();
    for state in DETECTION_IMAGE_STATES {
        let ids = logic
            .data()
            .fetch_image_ids(&format!("state={state}"))
            .await?;
        logic
            .data()
            .download_images(&ids, &training.images_folder, |_done, _total| {})
            .await?;
        all_ids.extend(ids);
    }
    let all_ids: Vec<String> = all_ids.into_iter().collect();

    for (batch_idx, chunk) in all_ids.chunks(DETECTION_FILE_BATCH_SIZE).enumerate() {
        let mut detections = logic
            .hooks()
            .detect(&model_info, chunk, &model_folder)
            .await?;
        for d in &mut detections {
            d.reconcile_category_ids(&model_info.categories);
        }
        logic
            .io()
            .write_detection_batch(batch_idx as u32, &detections)?;
    }
    Ok(())
}

async fn read_model_information(
    model_folder: &std::path::Path,
) -> Result<ModelInformation, HandlerError> {
    let path = model_folder.join("model.json");
    let contents = tokio::fs::read(&path).await?;
    serde_json::from_slice(&contents)
        .map_err(|err| HandlerError::Failed(format!("malformed {}: {err}", path.display())))
}
