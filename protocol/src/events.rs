use learning_loop_core::{Category, TrainingOut};
use serde::{Deserialize, Serialize};

/// The payload carried by `begin_training`. `id` is either a loop-issued model uuid or the name
/// of one of the trainer's `provided_pretrained_models` — `is_valid_uuid4` is what tells them
/// apart, not this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeginTrainingDetails {
    pub id: String,
    pub training_number: u32,
    pub categories: Vec<Category>,
    pub resolution: u32,
    pub flip_rl: bool,
    pub flip_ud: bool,
    /// Any additional hyperparameters the loop sends that this wire contract doesn't name.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A single pretrained starting point the trainer offers, advertised in the status payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PretrainedModel {
    pub name: String,
    pub label: String,
    pub description: String,
}

/// Events the loop sends down the event channel to a trainer node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IncomingEvent {
    BeginTraining {
        organization: String,
        project: String,
        details: BeginTrainingDetails,
    },
    StopTraining,
    Save {
        organization: String,
        project: String,
        model: String,
    },
    Connect,
    Disconnect,
}

/// The trainer's status heartbeat, sent via `update_trainer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerStatus {
    pub id: String,
    pub name: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_progress: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_format: Option<String>,
    /// Seconds since the currently running subprocess started; `None` while idle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_uptime: Option<u64>,
    pub provided_pretrained_models: Vec<PretrainedModel>,
    pub errors: learning_loop_core::ErrorMap,
}

/// Events a trainer node sends up the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutgoingEvent {
    UpdateTrainer {
        status: TrainerStatus,
    },
    UpdateTraining {
        organization: String,
        project: String,
        training: TrainingOut,
    },
}

/// Every `call(event, args)` on the event channel resolves to one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl SocketResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            payload: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: Some(serde_json::Value::String(message.into())),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        if self.success {
            return None;
        }
        self.payload.as_ref().and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_training_round_trips_extra_hyperparameters() {
        let json = serde_json::json!({
            "event": "begin_training",
            "organization": "zauberzeug",
            "project": "pytest",
            "details": {
                "id": "917d5c7f-7f9b-4b7d-8f7b-7f9b4b7d8f7b",
                "training_number": 0,
                "categories": [],
                "resolution": 800,
                "flip_rl": false,
                "flip_ud": false,
                "point_size": 10
            }
        });
        let event: IncomingEvent = serde_json::from_value(json).unwrap();
        match event {
            IncomingEvent::BeginTraining { details, .. } => {
                assert_eq!(
                    details.extra.get("point_size"),
                    Some(&serde_json::json!(10))
                );
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn socket_response_error_carries_a_message() {
        let resp = SocketResponse::error("nope");
        assert_eq!(resp.error_message(), Some("nope"));
        assert!(SocketResponse::ok().error_message().is_none());
    }
}
