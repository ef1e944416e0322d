use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxDetection {
    pub category_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub confidence: f32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointDetection {
    pub category_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub confidence: f32,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationDetection {
    pub category_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub confidence: f32,
    /// flattened polygon coordinates, `[x0, y0, x1, y1, ...]`
    pub shape: Vec<f32>,
}

/// All detections found for one image. Serialized one-per-line into a detection batch file
/// (up to `DETECTION_FILE_BATCH_SIZE` per file, see `learning-loop-data`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detections {
    pub image_id: String,
    #[serde(default)]
    pub box_detections: Vec<BoxDetection>,
    #[serde(default)]
    pub point_detections: Vec<PointDetection>,
    #[serde(default)]
    pub segmentation_detections: Vec<SegmentationDetection>,
}

impl Detections {
    pub fn new(image_id: impl Into<String>) -> Self {
        Self {
            image_id: image_id.into(),
            box_detections: Vec::new(),
            point_detections: Vec::new(),
            segmentation_detections: Vec::new(),
        }
    }

    /// Reconciles every detection's `category_name` to the matching `category_id` from the
    /// model's category list (invariant 5: identity is by id, not name/ordering).
    pub fn reconcile_category_ids(&mut self, categories: &[crate::Category]) {
        let lookup = |name: &str| {
            categories
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.id.clone())
        };
        for d in &mut self.box_detections {
            d.category_id = lookup(&d.category_name);
        }
        for d in &mut self.point_detections {
            d.category_id = lookup(&d.category_name);
        }
        for d in &mut self.segmentation_detections {
            d.category_id = lookup(&d.category_name);
        }
    }
}
