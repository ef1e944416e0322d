use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use learning_loop_core::{BasicModel, Detections, ModelInformation, Training};
use learning_loop_protocol::PretrainedModel;
use learning_loop_trainer::TrainerHooks;
use tracing::info;

/// Reference `TrainerHooks` implementation: runs a configured shell command and treats its
/// output files as the model. The real training algorithm is out of this node's scope -- this
/// exists so the binary has something concrete to supervise, in the same spirit as the
/// teacher's demo/example crates that stand in for a real strategy implementation.
pub struct ShellHooks {
    train_command: String,
    pretrained_models: Vec<PretrainedModel>,
}

impl ShellHooks {
    pub fn new(train_command: String, pretrained_models: Vec<PretrainedModel>) -> Self {
        Self {
            train_command,
            pretrained_models,
        }
    }

    fn command_for(&self, base_model: &str) -> String {
        self.train_command.replace("{base_model}", base_model)
    }

    async fn write_model_info(&self, training: &Training, id: &str) -> anyhow::Result<()> {
        let resolution = training
            .data
            .hyperparameter
            .as_ref()
            .map(|h| h.resolution)
            .unwrap_or(0);
        let info = ModelInformation {
            id: id.to_string(),
            version: "downloaded".to_string(),
            categories: training.data.categories.clone(),
            resolution,
        };
        let path = training.training_folder.join("model.json");
        tokio::fs::write(&path, serde_json::to_vec_pretty(&info)?).await?;
        Ok(())
    }
}

#[async_trait]
impl TrainerHooks for ShellHooks {
    async fn start_training(&self, training: &Training) -> anyhow::Result<String> {
        self.write_model_info(training, &training.base_model_id).await?;
        Ok(self.command_for(&training.base_model_id))
    }

    async fn start_training_from_scratch(
        &self,
        training: &Training,
        pretrained_name: &str,
    ) -> anyhow::Result<String> {
        self.write_model_info(training, pretrained_name).await?;
        Ok(self.command_for(pretrained_name))
    }

    async fn get_executor_error_from_log(&self, log_tail: &str) -> Option<String> {
        log_tail
            .lines()
            .rev()
            .find(|line| line.to_uppercase().contains("ERROR"))
            .map(|line| line.to_string())
    }

    async fn get_new_model(&self, training: &Training) -> anyhow::Result<Option<BasicModel>> {
        let path = training.training_folder.join("confusion_matrix.json");
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let model: BasicModel = serde_json::from_slice(&bytes)
                    .unwrap_or_else(|_| BasicModel::default());
                // Consumed on read, so the next poll only reports a model once a fresh one
                // has actually been written.
                tokio::fs::remove_file(&path).await.ok();
                Ok(Some(model))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn on_model_published(&self, training: &Training, _model: &BasicModel) -> anyhow::Result<()> {
        info!(training_id = %training.id, "model published to the loop");
        Ok(())
    }

    async fn get_latest_model_files(
        &self,
        training_folder: &Path,
    ) -> anyhow::Result<HashMap<String, Vec<PathBuf>>> {
        let output_dir = training_folder.join("output");
        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(&output_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        if files.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(HashMap::from([("default".to_string(), files)]))
    }

    async fn detect(
        &self,
        _model_info: &ModelInformation,
        images: &[String],
        _model_folder: &Path,
    ) -> anyhow::Result<Vec<Detections>> {
        Ok(images.iter().map(Detections::new).collect())
    }

    async fn clear_training_data(&self, folder: &Path) -> anyhow::Result<()> {
        let output_dir = folder.join("output");
        match tokio::fs::remove_dir_all(&output_dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn provided_pretrained_models(&self) -> Vec<PretrainedModel> {
        self.pretrained_models.clone()
    }
}

#[cfg(test)]
mod tests {
    use learning_loop_core::Context;

    use super::*;

    fn training(training_folder: &Path) -> Training {
        let mut training = Training::new(
            "t-1".to_string(),
            Context::new("acme", "demo"),
            1,
            "base-model".to_string(),
            training_folder.parent().unwrap(),
        );
        training.training_folder = training_folder.to_path_buf();
        training
    }

    #[test]
    fn command_for_substitutes_the_base_model_placeholder() {
        let hooks = ShellHooks::new("train --model {base_model} --epochs 5".to_string(), vec![]);
        assert_eq!(
            hooks.command_for("resnet50"),
            "train --model resnet50 --epochs 5"
        );
    }

    #[tokio::test]
    async fn start_training_writes_model_info_and_returns_the_command() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path()).unwrap();
        let hooks = ShellHooks::new("run {base_model}".to_string(), vec![]);
        let training = training(dir.path());

        let command = hooks.start_training(&training).await.unwrap();
        assert_eq!(command, "run base-model");

        let info_bytes = tokio::fs::read(dir.path().join("model.json")).await.unwrap();
        let info: ModelInformation = serde_json::from_slice(&info_bytes).unwrap();
        assert_eq!(info.id, "base-model");
    }

    #[tokio::test]
    async fn get_new_model_returns_none_until_a_confusion_matrix_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let hooks = ShellHooks::new("run".to_string(), vec![]);
        let training = training(dir.path());

        assert!(hooks.get_new_model(&training).await.unwrap().is_none());

        let matrix = BasicModel::default();
        tokio::fs::write(
            dir.path().join("confusion_matrix.json"),
            serde_json::to_vec(&matrix).unwrap(),
        )
        .await
        .unwrap();

        let model = hooks.get_new_model(&training).await.unwrap();
        assert!(model.is_some());
        // Consumed on read -- a second poll with nothing new written sees nothing again.
        assert!(hooks.get_new_model(&training).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_executor_error_from_log_finds_the_last_error_line() {
        let hooks = ShellHooks::new("run".to_string(), vec![]);
        let log = "starting up\nepoch 1 loss=0.4\nERROR out of memory\nshutting down";
        assert_eq!(
            hooks.get_executor_error_from_log(log).await,
            Some("ERROR out of memory".to_string())
        );
    }
}
