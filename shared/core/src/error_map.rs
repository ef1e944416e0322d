use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The error taxonomy from the error-handling design: one key per state-machine handler (plus a
/// couple of node-level keys used outside the state machine proper).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKey {
    StartTraining,
    Prepare,
    DownloadModel,
    RunTraining,
    SyncConfusionMatrix,
    UploadModel,
    Detecting,
    UploadDetections,
    ClearTrainingData,
    TrainingError,
    GetNewModel,
    UpdateModel,
    SaveModel,
}

/// Every status heartbeat carries this map verbatim so the loop can display current failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorMap(HashMap<ErrorKey, String>);

impl ErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: ErrorKey, message: impl Into<String>) {
        self.0.insert(key, message.into());
    }

    pub fn reset(&mut self, key: ErrorKey) {
        self.0.remove(&key);
    }

    pub fn reset_all(&mut self) {
        self.0.clear();
    }

    pub fn get(&self, key: ErrorKey) -> Option<&str> {
        self.0.get(&key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &HashMap<ErrorKey, String> {
        &self.0
    }
}
