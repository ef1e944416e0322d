use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use learning_loop_core::{BasicModel, Detections, ModelInformation, Training};
use learning_loop_protocol::PretrainedModel;

/// The capability interface a concrete trainer implements. `TrainerLogic` drives the state
/// machine purely in terms of this trait and never assumes anything about how a model is
/// actually produced -- the same "logic owns the loop, the implementation owns the
/// domain-specific bit" split as `WatcherBackend` in `shared/watcher`.
///
/// Object-safe so a `TrainerLogic` can hold it as `Arc<dyn TrainerHooks>`; every method that
/// touches the filesystem or a subprocess is async to leave room for implementations that shell
/// out or call into a longer-running async library.
#[async_trait]
pub trait TrainerHooks: Send + Sync {
    /// Returns the shell command line to hand to `Executor::start` for a fresh run against a
    /// loop-hosted base model already downloaded into `training.training_folder`.
    async fn start_training(&self, training: &Training) -> anyhow::Result<String>;

    /// Same as `start_training`, but for a named pretrained starting point instead of a
    /// downloaded base model.
    async fn start_training_from_scratch(
        &self,
        training: &Training,
        pretrained_name: &str,
    ) -> anyhow::Result<String>;

    /// Whether this implementation can resume a previously interrupted run in place rather than
    /// starting over. Most implementations can't; the default reflects that.
    fn can_resume(&self, _training: &Training) -> bool {
        false
    }

    /// Called instead of `start_training`/`start_training_from_scratch` when `can_resume`
    /// returns true. Default panics via `unimplemented` deliberately -- there's no sane fallback
    /// to run if a hook claims resumability it doesn't implement.
    async fn resume(&self, training: &Training) -> anyhow::Result<String> {
        let _ = training;
        unimplemented!("resume() must be implemented when can_resume() returns true")
    }

    /// Parses the tail of the executor log for a fatal error. `None` means "nothing wrong yet,"
    /// not "training succeeded" -- success is inferred from the subprocess exiting with no error
    /// found.
    async fn get_executor_error_from_log(&self, log_tail: &str) -> Option<String>;

    /// Inspects the training directory and returns the current best snapshot, if a new one has
    /// appeared since the last call.
    async fn get_new_model(&self, training: &Training) -> anyhow::Result<Option<BasicModel>>;

    /// Called after a successful `update_training` call for a freshly observed model, so the
    /// implementation can retain or rename the winning weights under a stable name.
    async fn on_model_published(&self, training: &Training, model: &BasicModel) -> anyhow::Result<()>;

    /// Files to upload for the final trained model, one list per archive format.
    async fn get_latest_model_files(
        &self,
        training_folder: &Path,
    ) -> anyhow::Result<HashMap<String, Vec<PathBuf>>>;

    /// Runs inference for `images` (ids already downloaded into the training's images folder)
    /// using the model described by `model_info` and extracted under `model_folder`.
    async fn detect(
        &self,
        model_info: &ModelInformation,
        images: &[String],
        model_folder: &Path,
    ) -> anyhow::Result<Vec<Detections>>;

    /// Deletes scratch data under `folder`, keeping whatever this implementation wants retained
    /// beyond the training's lifetime (e.g. a `model.json` snapshot for later `save()` calls).
    async fn clear_training_data(&self, folder: &Path) -> anyhow::Result<()>;

    /// Named starting points this trainer offers besides loop-hosted base models, advertised in
    /// the status heartbeat.
    fn provided_pretrained_models(&self) -> Vec<PretrainedModel> {
        Vec::new()
    }

    /// A rough fraction-complete estimate for the status heartbeat, or `None` while idle or when
    /// the implementation doesn't track progress.
    fn training_progress(&self) -> Option<f32> {
        None
    }
}
