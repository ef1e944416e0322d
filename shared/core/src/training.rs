use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Category, Context, Hyperparameter};

/// Ordered so that "at-least" comparisons (`training_state >= TrainModelUploaded`, used by the
/// artifact-presence invariant) are a plain `PartialOrd` check. Variant declaration order here
/// *is* the progression order from the data model section -- never reorder these without also
/// updating every place that relies on the derived `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrainingState {
    Initialized,
    DataDownloading,
    DataDownloaded,
    TrainModelDownloading,
    TrainModelDownloaded,
    TrainingRunning,
    TrainingFinished,
    ConfusionMatrixSyncing,
    ConfusionMatrixSynced,
    TrainModelUploading,
    TrainModelUploaded,
    Detecting,
    Detected,
    DetectionUploading,
    ReadyForCleanup,
}

impl TrainingState {
    /// The state this handler reverts to on failure (see `perform_state` in
    /// `learning-loop-trainer`). Only meaningful for the "transitioning" states; calling it on a
    /// "completed" state is a logic error elsewhere and panics in debug builds of callers that
    /// assert it.
    pub fn previous(self) -> TrainingState {
        use TrainingState::*;
        match self {
            Initialized => Initialized,
            DataDownloading => Initialized,
            DataDownloaded => DataDownloaded,
            TrainModelDownloading => DataDownloaded,
            TrainModelDownloaded => TrainModelDownloaded,
            TrainingRunning => TrainModelDownloaded,
            TrainingFinished => TrainingFinished,
            ConfusionMatrixSyncing => TrainingFinished,
            ConfusionMatrixSynced => ConfusionMatrixSynced,
            TrainModelUploading => ConfusionMatrixSynced,
            TrainModelUploaded => TrainModelUploaded,
            Detecting => TrainModelUploaded,
            Detected => Detected,
            DetectionUploading => Detected,
            ReadyForCleanup => ReadyForCleanup,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSet {
    Train,
    Test,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    pub id: String,
    pub set: ImageSet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingData {
    pub categories: Vec<Category>,
    pub hyperparameter: Option<Hyperparameter>,
    pub image_data: Vec<ImageData>,
    pub skipped_image_count: usize,
}

impl TrainingData {
    pub fn train_image_count(&self) -> usize {
        self.image_data
            .iter()
            .filter(|i| i.set == ImageSet::Train)
            .count()
    }

    pub fn test_image_count(&self) -> usize {
        self.image_data
            .iter()
            .filter(|i| i.set == ImageSet::Test)
            .count()
    }
}

/// The durable record driving the state machine. Persisted at every state transition (see
/// `learning-loop-persistence::ActiveTrainingIo`); its existence on disk is the "there is work to
/// resume" flag (invariant 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Training {
    pub id: String,
    pub context: Context,
    pub training_number: u32,
    pub project_folder: PathBuf,
    pub images_folder: PathBuf,
    pub training_folder: PathBuf,
    pub base_model_id: String,
    pub data: TrainingData,
    pub training_state: TrainingState,
    pub model_id_for_detecting: Option<String>,
}

impl Training {
    pub fn new(
        id: String,
        context: Context,
        training_number: u32,
        base_model_id: String,
        data_folder: &std::path::Path,
    ) -> Self {
        let project_folder = crate::project_folder(data_folder, &context);
        let images_folder = crate::images_folder(data_folder, &context);
        let training_folder = crate::training_folder(data_folder, &context, &id);
        Self {
            id,
            context,
            training_number,
            project_folder,
            images_folder,
            training_folder,
            base_model_id,
            data: TrainingData::default(),
            training_state: TrainingState::Initialized,
            model_id_for_detecting: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_ordered_as_in_the_progression() {
        assert!(TrainingState::Initialized < TrainingState::DataDownloaded);
        assert!(TrainingState::DataDownloaded < TrainingState::TrainModelUploaded);
        assert!(TrainingState::TrainModelUploaded < TrainingState::ReadyForCleanup);
    }

    #[test]
    fn image_counts_partition_by_set() {
        let mut data = TrainingData::default();
        data.image_data.push(ImageData {
            id: "a".into(),
            set: ImageSet::Train,
        });
        data.image_data.push(ImageData {
            id: "b".into(),
            set: ImageSet::Test,
        });
        data.image_data.push(ImageData {
            id: "c".into(),
            set: ImageSet::Train,
        });
        assert_eq!(data.train_image_count(), 2);
        assert_eq!(data.test_image_count(), 1);
    }
}
