use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `begin_training` details deserialize into this plus whatever trainer-specific keys the loop
/// sent; the three named fields are the ones the wire protocol and status payload reference by
/// name (`resolution`, `flipRl`, `flipUd`), everything else rides along in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameter {
    pub resolution: u32,
    #[serde(rename = "flipRl")]
    pub flip_rl: bool,
    #[serde(rename = "flipUd")]
    pub flip_ud: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
