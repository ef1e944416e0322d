use std::path::{Path, PathBuf};

use learning_loop_core::{Detections, Training};
use tracing::warn;

use crate::atomic::{read_json, write_atomic_json};

const LAST_TRAINING_FILE: &str = "last_training.json";
const DETECTIONS_DIR: &str = "detections";
const DETECTION_UPLOAD_PROGRESS_FILE: &str = "detection_upload_progress.json";
const MODEL_UPLOAD_PROGRESS_FILE: &str = "model_upload_progress.json";

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("io error at {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("{0} contained invalid JSON: {1}")]
    Corrupt(PathBuf, #[source] serde_json::Error),
}

fn io_err(path: &Path, err: std::io::Error) -> PersistenceError {
    PersistenceError::Io(path.to_path_buf(), err)
}

/// `detection_upload_progress.json` stores the highest uploaded batch index *inclusive*, not a
/// count, so retries can resume sparsely without renumbering files.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
struct DetectionUploadProgress {
    highest_uploaded_index: Option<u32>,
}

/// One instance per active training, rooted at that training's folder
/// (`<data>/<org>/<project>/trainings/<id>/`).
pub struct TrainingIo {
    training_folder: PathBuf,
}

impl TrainingIo {
    pub fn new(training_folder: impl Into<PathBuf>) -> Self {
        Self {
            training_folder: training_folder.into(),
        }
    }

    pub fn training_folder(&self) -> &Path {
        &self.training_folder
    }

    fn path(&self, name: &str) -> PathBuf {
        self.training_folder.join(name)
    }

    /// Persists the full `Training` record. Called at every state transition by
    /// `learning-loop-trainer`'s `perform_state` helper.
    pub fn save_training(&self, training: &Training) -> Result<(), PersistenceError> {
        let path = self.path(LAST_TRAINING_FILE);
        write_atomic_json(&path, training).map_err(|e| io_err(&path, e))
    }

    pub fn load_training(&self) -> Result<Option<Training>, PersistenceError> {
        let path = self.path(LAST_TRAINING_FILE);
        read_json(&path).map_err(|e| io_err(&path, e))
    }

    /// Removes every artifact for this training, including the resume marker. Called by the
    /// `clear_training` handler on reaching `ReadyForCleanup`.
    pub fn clear(&self) -> Result<(), PersistenceError> {
        match std::fs::remove_dir_all(&self.training_folder) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(&self.training_folder, err)),
        }
    }

    /// Writes one detection batch (at most `DETECTION_FILE_BATCH_SIZE` images) to
    /// `detections/<idx>.json`.
    pub fn write_detection_batch(
        &self,
        idx: u32,
        batch: &[Detections],
    ) -> Result<(), PersistenceError> {
        let path = self
            .training_folder
            .join(DETECTIONS_DIR)
            .join(format!("{idx}.json"));
        write_atomic_json(&path, batch).map_err(|e| io_err(&path, e))
    }

    pub fn read_detection_batch(&self, idx: u32) -> Result<Vec<Detections>, PersistenceError> {
        let path = self
            .training_folder
            .join(DETECTIONS_DIR)
            .join(format!("{idx}.json"));
        Ok(read_json(&path).map_err(|e| io_err(&path, e))?.unwrap_or_default())
    }

    /// Every batch index currently on disk, ascending -- the order `upload_detections` walks.
    pub fn detection_batch_indices(&self) -> Result<Vec<u32>, PersistenceError> {
        let dir = self.training_folder.join(DETECTIONS_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut indices = Vec::new();
        let entries = std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            if let Some(idx) = entry
                .path()
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u32>().ok())
            {
                indices.push(idx);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    pub fn detection_upload_progress(&self) -> Result<Option<u32>, PersistenceError> {
        let path = self.path(DETECTION_UPLOAD_PROGRESS_FILE);
        let progress: Option<DetectionUploadProgress> =
            read_json(&path).map_err(|e| io_err(&path, e))?;
        Ok(progress.and_then(|p| p.highest_uploaded_index))
    }

    pub fn set_detection_upload_progress(&self, idx: u32) -> Result<(), PersistenceError> {
        let path = self.path(DETECTION_UPLOAD_PROGRESS_FILE);
        write_atomic_json(
            &path,
            &DetectionUploadProgress {
                highest_uploaded_index: Some(idx),
            },
        )
        .map_err(|e| io_err(&path, e))
    }

    /// Formats already uploaded, in upload order -- a `Vec`, not a set, so JSON diffs stay
    /// stable and re-runs skip already-uploaded formats (invariant 6).
    pub fn model_upload_progress(&self) -> Result<Vec<String>, PersistenceError> {
        let path = self.path(MODEL_UPLOAD_PROGRESS_FILE);
        Ok(read_json(&path).map_err(|e| io_err(&path, e))?.unwrap_or_default())
    }

    pub fn mark_model_format_uploaded(&self, format: &str) -> Result<(), PersistenceError> {
        let mut uploaded = self.model_upload_progress()?;
        if !uploaded.iter().any(|f| f == format) {
            uploaded.push(format.to_string());
        }
        let path = self.path(MODEL_UPLOAD_PROGRESS_FILE);
        write_atomic_json(&path, &uploaded).map_err(|e| io_err(&path, e))
    }

    /// Scans `<data>/*/*/trainings/*/last_training.json` for a resumable training. Invariant 1
    /// (at most one active training per node) means at most one such file should ever exist;
    /// if more than one is somehow found, the first encountered wins and the rest are logged.
    pub fn find_active_training(
        data_folder: &Path,
    ) -> Result<Option<(Training, TrainingIo)>, PersistenceError> {
        let mut found = None;
        for entry in walkdir::WalkDir::new(data_folder)
            .min_depth(1)
            .max_depth(5)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_name() == LAST_TRAINING_FILE {
                let training_folder = entry
                    .path()
                    .parent()
                    .expect("last_training.json always has a parent dir")
                    .to_path_buf();
                if found.is_some() {
                    warn!(
                        path = %entry.path().display(),
                        "found a second resumable training marker, ignoring it"
                    );
                    continue;
                }
                let io = TrainingIo::new(training_folder);
                if let Some(training) = io.load_training()? {
                    found = Some((training, io));
                }
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use learning_loop_core::{Context, Training};

    use super::*;

    fn sample_training(folder: &Path) -> Training {
        Training::new(
            "t1".into(),
            Context::new("org", "proj"),
            0,
            uuid::Uuid::new_v4().to_string(),
            folder,
        )
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let io = TrainingIo::new(dir.path().join("trainings/t1"));
        let training = sample_training(dir.path());
        io.save_training(&training).unwrap();

        let loaded = io.load_training().unwrap().unwrap();
        assert_eq!(loaded.id, training.id);
        assert_eq!(loaded.training_state, training.training_state);
    }

    #[test]
    fn load_with_no_marker_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let io = TrainingIo::new(dir.path());
        assert!(io.load_training().unwrap().is_none());
    }

    #[test]
    fn clear_removes_the_whole_folder() {
        let dir = tempfile::tempdir().unwrap();
        let training_folder = dir.path().join("trainings/t1");
        let io = TrainingIo::new(&training_folder);
        io.save_training(&sample_training(dir.path())).unwrap();
        assert!(training_folder.join(LAST_TRAINING_FILE).exists());

        io.clear().unwrap();
        assert!(!training_folder.exists());
        // idempotent
        io.clear().unwrap();
    }

    #[test]
    fn detection_batches_are_listed_in_ascending_order() {
        let dir = tempfile::tempdir().unwrap();
        let io = TrainingIo::new(dir.path());
        io.write_detection_batch(3, &[]).unwrap();
        io.write_detection_batch(1, &[]).unwrap();
        io.write_detection_batch(2, &[]).unwrap();

        assert_eq!(io.detection_batch_indices().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn model_upload_progress_dedupes_formats() {
        let dir = tempfile::tempdir().unwrap();
        let io = TrainingIo::new(dir.path());
        io.mark_model_format_uploaded("onnx").unwrap();
        io.mark_model_format_uploaded("torchscript").unwrap();
        io.mark_model_format_uploaded("onnx").unwrap();

        assert_eq!(
            io.model_upload_progress().unwrap(),
            vec!["onnx".to_string(), "torchscript".to_string()]
        );
    }

    #[test]
    fn find_active_training_locates_the_marker() {
        let dir = tempfile::tempdir().unwrap();
        let training_folder = dir.path().join("org/proj/trainings/t1");
        let io = TrainingIo::new(&training_folder);
        io.save_training(&sample_training(dir.path())).unwrap();

        let (found, found_io) = TrainingIo::find_active_training(dir.path())
            .unwrap()
            .expect("marker should be found");
        assert_eq!(found.id, "t1");
        assert_eq!(found_io.training_folder(), training_folder);
    }

    #[test]
    fn find_active_training_is_none_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TrainingIo::find_active_training(dir.path())
            .unwrap()
            .is_none());
    }
}
