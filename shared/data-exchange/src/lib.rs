//! Chunked, resumable transfer of image metadata, image blobs, model archives, and detection
//! batches between a trainer node and the Learning Loop.
//!
//! Any HTTP status other than 200 from the underlying `LoopClient` is a hard error for the
//! current state machine handler -- callers in `learning-loop-trainer` catch it, record it under
//! the state's error-map key, and roll back to the previous state so the next tick retries.

mod detections;
mod errors;
mod images;
mod models;

pub use detections::upload_detection_batch;
pub use errors::DataExchangeError;
pub use images::{download_images, fetch_image_ids};
pub use models::{download_model_archive, upload_model_files};

use std::path::{Path, PathBuf};

use learning_loop_core::Context;
use learning_loop_transport::LoopClient;

/// Detections are batched into files of up to this many images before a new file is started;
/// each file is uploaded in one POST.
pub const DETECTION_FILE_BATCH_SIZE: usize = 200;

/// Upper bound on detections sent in a single upload POST. Since one file never exceeds
/// `DETECTION_FILE_BATCH_SIZE` = 200, uploads never need to re-split a file to respect this.
pub const DETECTION_UPLOAD_BATCH_SIZE: usize = 500;

/// Scoped view of the Learning Loop for one `Context` (organization + project). Owns no state
/// of its own beyond the context and a cloned `LoopClient` handle.
#[derive(Clone)]
pub struct DataExchanger {
    client: LoopClient,
    context: Context,
}

impl DataExchanger {
    pub fn new(client: LoopClient, context: Context) -> Self {
        Self { client, context }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub async fn fetch_image_ids(&self, query: &str) -> Result<Vec<String>, DataExchangeError> {
        fetch_image_ids(&self.client, &self.context, query).await
    }

    pub async fn download_images(
        &self,
        ids: &[String],
        images_folder: &Path,
        on_progress: impl Fn(usize, usize) + Send + Sync,
    ) -> Result<(), DataExchangeError> {
        download_images(&self.client, &self.context, ids, images_folder, on_progress).await
    }

    pub async fn download_model_archive(
        &self,
        model_id: &str,
        format: &str,
        target_folder: &Path,
    ) -> Result<(), DataExchangeError> {
        download_model_archive(&self.client, &self.context, model_id, format, target_folder).await
    }

    pub async fn upload_model_files(
        &self,
        training_number: u32,
        format: &str,
        files: &[PathBuf],
    ) -> Result<String, DataExchangeError> {
        upload_model_files(&self.client, &self.context, training_number, format, files).await
    }

    pub async fn upload_detection_batch(
        &self,
        batch: &[learning_loop_core::Detections],
    ) -> Result<(), DataExchangeError> {
        upload_detection_batch(&self.client, &self.context, batch).await
    }
}
