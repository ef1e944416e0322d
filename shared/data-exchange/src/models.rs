use std::io::Cursor;
use std::path::Path;

use learning_loop_core::Context;
use learning_loop_transport::{LoopClient, TransportError};
use tracing::debug;

use crate::errors::DataExchangeError;

/// Downloads `GET /{org}/projects/{project}/models/{id}/{format}/file`, a zip archive, and
/// extracts it into `target_folder` one file at a time -- extracting to a temp directory first,
/// then moving each file individually, so a crash mid-move leaves at most one partial file,
/// never a half-written target directory.
pub async fn download_model_archive(
    client: &LoopClient,
    context: &Context,
    model_id: &str,
    format: &str,
    target_folder: &Path,
) -> Result<(), DataExchangeError> {
    let path = format!(
        "/{}/projects/{}/models/{model_id}/{format}/file",
        context.organization, context.project
    );
    let bytes = client.http().get_bytes(&path).await?;

    let extract_dir = tempfile::tempdir_in(
        target_folder
            .parent()
            .unwrap_or_else(|| Path::new(".")),
    )
    .map_err(|e| DataExchangeError::Io(target_folder.to_path_buf(), e))?;

    {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        archive.extract(extract_dir.path())?;
    }

    tokio::fs::create_dir_all(target_folder)
        .await
        .map_err(|e| DataExchangeError::Io(target_folder.to_path_buf(), e))?;

    for entry in walk_files(extract_dir.path())? {
        let relative = entry
            .strip_prefix(extract_dir.path())
            .expect("walked entries are under extract_dir");
        let destination = target_folder.join(relative);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DataExchangeError::Io(parent.to_path_buf(), e))?;
        }
        debug!(from = %entry.display(), to = %destination.display(), "moving extracted model file");
        std::fs::rename(&entry, &destination).map_err(|e| DataExchangeError::Io(destination.clone(), e))?;
    }
    Ok(())
}

fn walk_files(root: &Path) -> Result<Vec<std::path::PathBuf>, DataExchangeError> {
    let mut files = Vec::new();
    for entry in walkdir_shallow(root).map_err(|e| DataExchangeError::Io(root.to_path_buf(), e))? {
        if entry.is_file() {
            files.push(entry);
        }
    }
    Ok(files)
}

/// Minimal recursive file walk (the data-exchange crate has no `walkdir` dependency of its own;
/// model archives are shallow, so a hand-rolled recursion is simpler than adding one).
fn walkdir_shallow(dir: &Path) -> std::io::Result<Vec<std::path::PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    Ok(out)
}

#[derive(serde::Deserialize)]
struct UploadModelResponse {
    id: String,
}

/// `PUT /{org}/projects/{project}/trainings/{n}/models/latest/{format}/file`, multipart with
/// every file under field name `file` (matching the original uploader's shape: multiple parts,
/// same field name). Returns the new model's uuid.
pub async fn upload_model_files(
    client: &LoopClient,
    context: &Context,
    training_number: u32,
    format: &str,
    files: &[std::path::PathBuf],
) -> Result<String, DataExchangeError> {
    let path = format!(
        "/{}/projects/{}/trainings/{training_number}/models/latest/{format}/file",
        context.organization, context.project
    );

    let mut form = reqwest::multipart::Form::new();
    for file in files {
        let bytes = tokio::fs::read(file)
            .await
            .map_err(|e| DataExchangeError::Io(file.clone(), e))?;
        let filename = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
        form = form.part("file", part);
    }

    let resp = client.put_multipart(&path, form).await?;
    let parsed: UploadModelResponse = resp
        .json()
        .await
        .map_err(TransportError::from)?;
    Ok(parsed.id)
}
