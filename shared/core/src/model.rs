use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `{tp, fp, fn}` counters for one category, as harvested from the trainer subprocess.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub tp: u32,
    pub fp: u32,
    pub fn_: u32,
}

/// Produced by the trainer subprocess and harvested via `TrainerHooks::get_new_model`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicModel {
    pub confusion_matrix: HashMap<String, CategoryCounts>,
    #[serde(default)]
    pub meta_information: serde_json::Value,
}

/// Persisted alongside model archives as `model.json` / `base_model.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInformation {
    pub id: String,
    pub version: String,
    pub categories: Vec<crate::Category>,
    pub resolution: u32,
}

/// Sent to the loop via the `update_training` event every time the confusion matrix is synced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingOut {
    pub trainer_id: String,
    pub confusion_matrix: HashMap<String, CategoryCounts>,
    pub train_image_count: usize,
    pub test_image_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hyperparameters: Option<serde_json::Value>,
}
