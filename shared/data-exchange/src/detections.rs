use backon::{ExponentialBuilder, Retryable};
use learning_loop_core::{Context, Detections};
use learning_loop_transport::LoopClient;

use crate::errors::DataExchangeError;

/// `POST /{org}/projects/{project}/detections` with a bare JSON array body (not wrapped in an
/// envelope object). A non-2xx response is a hard error for the current training state, but a
/// handful of in-process retries with a short bounded exponential backoff avoids treating a
/// single blip as a state-machine rollback.
pub async fn upload_detection_batch(
    client: &LoopClient,
    context: &Context,
    batch: &[Detections],
) -> Result<(), DataExchangeError> {
    let path = format!(
        "/{}/projects/{}/detections",
        context.organization, context.project
    );

    (|| async { client.post_json(&path, batch).await })
        .retry(ExponentialBuilder::default().with_max_times(3))
        .await?;
    Ok(())
}
