use serde::{Deserialize, Serialize};

/// Category identity is carried by `id`, never by `name` (invariant 5 of the training data
/// model) -- detections emitted by name are reconciled to id before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    /// Unused by any invariant here; kept optional so detectors that rely on it for
    /// visualization still round-trip it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: None,
        }
    }
}
