//! Shared data model for the Learning Loop trainer node.
//!
//! This crate has no async runtime dependency and no I/O: it is the set of plain types that
//! every other crate in the workspace passes around (`Context`, `Training`, `TrainingState`,
//! detections, categories, and the error taxonomy from the node's error-reporting design).

mod category;
mod context;
mod detections;
mod error_map;
mod hyperparameter;
mod ids;
mod model;
mod paths;
mod training;

pub use category::Category;
pub use context::Context;
pub use detections::{BoxDetection, Detections, PointDetection, SegmentationDetection};
pub use error_map::{ErrorKey, ErrorMap};
pub use hyperparameter::Hyperparameter;
pub use ids::is_valid_uuid4;
pub use model::{BasicModel, CategoryCounts, ModelInformation, TrainingOut};
pub use paths::{images_folder, project_folder, training_folder};
pub use training::{ImageData, ImageSet, Training, TrainingData, TrainingState};
