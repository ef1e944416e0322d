use std::path::{Path, PathBuf};

use futures_util::{stream, StreamExt};
use learning_loop_core::Context;
use learning_loop_transport::LoopClient;
use tracing::{debug, warn};

use crate::errors::DataExchangeError;

/// How many ids go into one `images?ids=...` metadata request.
const IMAGE_ID_BATCH_SIZE: usize = 100;
/// How many raw image downloads run concurrently.
const DOWNLOAD_CONCURRENCY: usize = 10;

#[derive(serde::Deserialize)]
struct ImageIdsResponse {
    image_ids: Vec<String>,
}

/// `GET /{org}/projects/{project}/data?{query}` -- e.g. `query = "state=complete"`.
pub async fn fetch_image_ids(
    client: &LoopClient,
    context: &Context,
    query: &str,
) -> Result<Vec<String>, DataExchangeError> {
    let path = format!(
        "/{}/projects/{}/data?{query}",
        context.organization, context.project
    );
    let resp = client.get(&path).await?;
    let parsed: ImageIdsResponse = resp.json().await.map_err(learning_loop_transport::TransportError::from)?;
    Ok(parsed.image_ids)
}

/// Downloads every id in `ids` into `images_folder/<id>.jpg`, skipping ids whose file already
/// exists. Metadata is fetched in batches of `IMAGE_ID_BATCH_SIZE`; raw bytes download with
/// `DOWNLOAD_CONCURRENCY` requests in flight. `on_progress` is called with `(done, total)` after
/// each completed download so callers can expose progress as a fraction.
pub async fn download_images(
    client: &LoopClient,
    context: &Context,
    ids: &[String],
    images_folder: &Path,
    on_progress: impl Fn(usize, usize) + Send + Sync,
) -> Result<(), DataExchangeError> {
    tokio::fs::create_dir_all(images_folder)
        .await
        .map_err(|e| DataExchangeError::Io(images_folder.to_path_buf(), e))?;

    let mut missing = Vec::new();
    for id in ids {
        let path = target_path(images_folder, id);
        if !path.exists() {
            missing.push(id.clone());
        }
    }
    let total = ids.len();
    let already_done = total - missing.len();
    if missing.is_empty() {
        on_progress(total, total);
        return Ok(());
    }

    for batch in missing.chunks(IMAGE_ID_BATCH_SIZE) {
        debug!(count = batch.len(), "confirming image metadata batch");
        let query_ids = batch.join(",");
        let path = format!(
            "/{}/projects/{}/images?ids={query_ids}",
            context.organization, context.project
        );
        // The metadata response isn't otherwise needed here (the raw bytes come from the
        // per-image endpoint below), but a failed fetch here means the ids aren't valid for
        // this project, so the whole batch is a hard error for this state.
        client.get(&path).await?;
    }

    let done = std::sync::atomic::AtomicUsize::new(already_done);
    let results: Vec<Result<(), DataExchangeError>> = stream::iter(missing.iter())
        .map(|id| {
            let client = client.clone();
            let context = context.clone();
            let target = target_path(images_folder, id);
            let done = &done;
            let on_progress = &on_progress;
            async move {
                let result = download_one_image(&client, &context, id, &target).await;
                let count = done.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                on_progress(count, total);
                result
            }
        })
        .buffer_unordered(DOWNLOAD_CONCURRENCY)
        .collect()
        .await;

    for result in results {
        result?;
    }
    Ok(())
}

async fn download_one_image(
    client: &LoopClient,
    context: &Context,
    id: &str,
    target: &Path,
) -> Result<(), DataExchangeError> {
    let path = format!(
        "/{}/projects/{}/images/{id}/main",
        context.organization, context.project
    );
    match client.get(&path).await {
        Ok(resp) => {
            let bytes = resp.bytes().await.map_err(learning_loop_transport::TransportError::from)?;
            write_atomic_bytes(target, &bytes)?;
            Ok(())
        }
        Err(err) => {
            warn!(%id, %err, "failed to download image");
            Err(err.into())
        }
    }
}

fn target_path(images_folder: &Path, id: &str) -> PathBuf {
    images_folder.join(format!("{id}.jpg"))
}

fn write_atomic_bytes(target: &Path, bytes: &bytes::Bytes) -> Result<(), DataExchangeError> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| DataExchangeError::Io(target.to_path_buf(), e))?;
    std::io::Write::write_all(&mut tmp, bytes)
        .map_err(|e| DataExchangeError::Io(target.to_path_buf(), e))?;
    tmp.persist(target)
        .map_err(|e| DataExchangeError::Io(target.to_path_buf(), e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn set_credentials() {
        // SAFETY: serialized via `serial_test` so no other test races these env mutations.
        unsafe {
            std::env::set_var("LOOP_USERNAME", "images-test-user");
            std::env::set_var("LOOP_PASSWORD", "images-test-pass");
        }
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn fetch_image_ids_parses_the_id_list() {
        set_credentials();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/api/acme/projects/demo/data$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "image_ids": ["a", "b", "c"],
            })))
            .mount(&server)
            .await;

        let client = LoopClient::new(server.uri());
        let context = Context::new("acme", "demo");
        let ids = fetch_image_ids(&client, &context, "state=complete").await.unwrap();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn download_images_skips_ids_already_present_on_disk() {
        set_credentials();
        let server = MockServer::start().await;
        // Only "b" should ever be requested -- "a" already exists on disk.
        Mock::given(method("GET"))
            .and(path_regex(r"^/api/acme/projects/demo/images$"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/api/acme/projects/demo/images/b/main$"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg-bytes".to_vec()))
            .mount(&server)
            .await;

        let client = LoopClient::new(server.uri());
        let context = Context::new("acme", "demo");
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"already-here").unwrap();

        let ids = vec!["a".to_string(), "b".to_string()];
        download_images(&client, &context, &ids, dir.path(), |_done, _total| {})
            .await
            .unwrap();

        assert_eq!(
            std::fs::read(dir.path().join("a.jpg")).unwrap(),
            b"already-here"
        );
        assert_eq!(
            std::fs::read(dir.path().join("b.jpg")).unwrap(),
            b"jpeg-bytes"
        );
    }
}
