use std::time::Duration;

use learning_loop_persistence::TrainingIo;
use learning_loop_protocol::PretrainedModel;
use learning_loop_core::{Category, Context, Detections, Training, TrainingState};
use learning_loop_testing::{test_utils, MockLoop};
use serde_json::json;

/// A loop-hosted base model id (a valid uuid v4) that triggers the download-model state, as
/// opposed to a pretrained-model name.
const LOOP_BASE_MODEL_ID: &str = "917d5c7f-7f9b-4b7d-8f7b-7f9b4b7d8f7b";

fn detect_model_archive() -> Vec<u8> {
    test_utils::build_model_archive(&json!({
        "id": "detect-model",
        "version": "v1",
        "categories": [{"id": "c1", "name": "A"}],
        "resolution": 800,
    }))
}

/// S1: a fresh `begin_training` against a loop-hosted base model runs the whole pipeline --
/// data download, model download, the training subprocess, confusion-matrix sync, model upload,
/// detection, and detection upload -- and reaches the terminal state.
#[tokio::test]
#[serial_test::serial]
async fn happy_path_completes_through_cleanup() {
    test_utils::set_test_credentials();
    let (mock, url) = MockLoop::spawn().await;

    let ids: Vec<String> = (1..=6).map(|i| format!("img{i}")).collect();
    mock.set_image_ids("complete", ids.clone()).await;
    mock.set_model_archive(detect_model_archive()).await;

    let dir = tempfile::tempdir().unwrap();
    let (trainer_node, _cancel) = test_utils::spawn_trainer_node(
        dir.path(),
        &url,
        "mkdir -p output && printf weights > output/model.bin && printf '{}' > confusion_matrix.json",
        Vec::new(),
    )
    .await;
    test_utils::wait_for_connection(&trainer_node.node().client, Duration::from_secs(5)).await;

    let completed = trainer_node.training_completed_notify();

    let reply = mock
        .begin_training(
            "acme",
            "demo",
            json!({
                "id": LOOP_BASE_MODEL_ID,
                "training_number": 1,
                "categories": [{"id": "c1", "name": "A"}],
                "resolution": 800,
                "flip_rl": false,
                "flip_ud": false,
            }),
        )
        .await;
    assert!(reply.success, "begin_training should be accepted");
    assert_eq!(reply.payload, Some(json!(true)));

    tokio::time::timeout(Duration::from_secs(20), completed.notified())
        .await
        .expect("training did not reach a terminal state in time");

    let uploaded = mock.uploaded_models().await;
    assert_eq!(uploaded.len(), 1, "exactly one model format was produced");
    assert_eq!(uploaded[0].0, "default");
    assert_eq!(uploaded[0].1, vec!["model.bin".to_string()]);

    let batches = mock.detection_batches().await;
    let total_detections: usize = batches.iter().map(Vec::len).sum();
    assert_eq!(total_detections, ids.len());

    assert!(
        !mock.training_updates().await.is_empty(),
        "the confusion matrix sync should have pushed at least one update_training"
    );

    // `keep_old_trainings` defaults to false, so the training folder is gone by the time
    // cleanup runs.
    test_utils::wait_until(Duration::from_secs(5), || {
        TrainingIo::find_active_training(dir.path())
            .unwrap()
            .is_none()
    })
    .await;
}

/// S2: training from a named pretrained starting point skips the model-download state entirely
/// and still reaches completion.
#[tokio::test]
#[serial_test::serial]
async fn pretrained_start_skips_model_download() {
    test_utils::set_test_credentials();
    let (mock, url) = MockLoop::spawn().await;
    mock.set_image_ids("complete", vec!["a".to_string(), "b".to_string()])
        .await;
    mock.set_model_archive(detect_model_archive()).await;

    let dir = tempfile::tempdir().unwrap();
    let (trainer_node, _cancel) = test_utils::spawn_trainer_node(
        dir.path(),
        &url,
        "mkdir -p output && printf weights > output/model.bin && printf '{}' > confusion_matrix.json",
        vec![PretrainedModel {
            name: "tiny".to_string(),
            label: "Tiny".to_string(),
            description: "from scratch".to_string(),
        }],
    )
    .await;
    test_utils::wait_for_connection(&trainer_node.node().client, Duration::from_secs(5)).await;
    let completed = trainer_node.training_completed_notify();

    let reply = mock
        .begin_training(
            "acme",
            "demo",
            json!({
                "id": "tiny",
                "training_number": 1,
                "categories": [],
                "resolution": 320,
                "flip_rl": false,
                "flip_ud": false,
            }),
        )
        .await;
    assert!(reply.success);

    tokio::time::timeout(Duration::from_secs(20), completed.notified())
        .await
        .expect("training did not reach a terminal state in time");

    assert_eq!(mock.uploaded_models().await.len(), 1);
}

/// A second `begin_training` while one is already active is rejected outright rather than
/// queued or interrupting the first run.
#[tokio::test]
#[serial_test::serial]
async fn concurrent_begin_training_is_rejected() {
    test_utils::set_test_credentials();
    let (mock, url) = MockLoop::spawn().await;
    mock.set_image_ids("complete", vec!["a".to_string()]).await;
    mock.set_model_archive(detect_model_archive()).await;

    let dir = tempfile::tempdir().unwrap();
    let (trainer_node, _cancel) = test_utils::spawn_trainer_node(
        dir.path(),
        &url,
        // Sleeps long enough that the second begin_training call lands while this one is
        // still mid-flight.
        "sleep 5 && mkdir -p output && printf weights > output/model.bin && printf '{}' > confusion_matrix.json",
        Vec::new(),
    )
    .await;
    test_utils::wait_for_connection(&trainer_node.node().client, Duration::from_secs(5)).await;

    let details = json!({
        "id": LOOP_BASE_MODEL_ID,
        "training_number": 1,
        "categories": [],
        "resolution": 800,
        "flip_rl": false,
        "flip_ud": false,
    });

    let first = mock.begin_training("acme", "demo", details.clone()).await;
    assert!(first.success);
    assert_eq!(first.payload, Some(json!(true)));

    let second = mock.begin_training("acme", "demo", details).await;
    assert!(second.success, "the call itself still succeeds");
    assert_eq!(
        second.payload,
        Some(json!(false)),
        "but begin_training returns false while one is already active"
    );

    trainer_node.stop_training().await;
}

/// S4 / crash-resume: a training persisted mid-pipeline (past the model upload) is picked up by
/// a freshly constructed node pointed at the same data folder, and finishes without re-uploading
/// the model -- only the remaining detect/upload-detections states run.
#[tokio::test]
#[serial_test::serial]
async fn resumes_an_incomplete_training_without_redoing_finished_states() {
    test_utils::set_test_credentials();
    let (mock, url) = MockLoop::spawn().await;
    let ids: Vec<String> = (1..=3).map(|i| format!("img{i}")).collect();
    mock.set_image_ids("complete", ids.clone()).await;
    mock.set_model_archive(detect_model_archive()).await;

    let dir = tempfile::tempdir().unwrap();
    let context = Context::new("acme", "demo");
    let mut training = Training::new(
        "resumed-training".to_string(),
        context,
        1,
        LOOP_BASE_MODEL_ID.to_string(),
        dir.path(),
    );
    training.training_state = TrainingState::TrainModelUploaded;
    training.model_id_for_detecting = Some("already-uploaded-model".to_string());
    training.data.categories = vec![Category::new("c1", "A")];
    std::fs::create_dir_all(&training.training_folder).unwrap();
    let io = TrainingIo::new(&training.training_folder);
    io.save_training(&training).unwrap();
    io.mark_model_format_uploaded("default").unwrap();

    let (_trainer_node, _cancel) = test_utils::spawn_trainer_node(
        dir.path(),
        &url,
        "true",
        Vec::new(),
    )
    .await;

    test_utils::wait_until(Duration::from_secs(20), || {
        TrainingIo::find_active_training(dir.path())
            .unwrap()
            .is_none()
    })
    .await;

    assert!(
        mock.uploaded_models().await.is_empty(),
        "resuming past TrainModelUploaded must never re-run upload_model"
    );
    let batches = mock.detection_batches().await;
    let total_detections: usize = batches.iter().map(Vec::len).sum();
    assert_eq!(total_detections, ids.len());
}

/// S6: a training subprocess that exits with a logged error rolls the state back to
/// `TrainModelDownloaded` instead of advancing to `TrainingFinished`, and keeps retrying from
/// there rather than wedging the node.
#[tokio::test]
#[serial_test::serial]
async fn failing_train_command_rolls_back_instead_of_advancing() {
    test_utils::set_test_credentials();
    let (mock, url) = MockLoop::spawn().await;
    mock.set_image_ids("complete", vec!["a".to_string()]).await;

    let dir = tempfile::tempdir().unwrap();
    let (trainer_node, cancel) = test_utils::spawn_trainer_node(
        dir.path(),
        &url,
        // Grouped so the trailing `>> log 2>&1` the executor appends covers both statements
        // instead of only the last one.
        "(echo something went ERROR; exit 1)",
        vec![PretrainedModel {
            name: "tiny".to_string(),
            label: "Tiny".to_string(),
            description: "from scratch".to_string(),
        }],
    )
    .await;
    test_utils::wait_for_connection(&trainer_node.node().client, Duration::from_secs(5)).await;

    let reply = mock
        .begin_training(
            "acme",
            "demo",
            json!({
                "id": "tiny",
                "training_number": 1,
                "categories": [],
                "resolution": 800,
                "flip_rl": false,
                "flip_ud": false,
            }),
        )
        .await;
    assert!(reply.success);

    test_utils::wait_until(Duration::from_secs(10), || {
        let training = TrainingIo::find_active_training(dir.path()).unwrap();
        matches!(
            training.map(|(t, _)| t.training_state),
            Some(TrainingState::TrainModelDownloaded)
        )
    })
    .await;
    assert_eq!(
        TrainingIo::find_active_training(dir.path())
            .unwrap()
            .unwrap()
            .0
            .training_state,
        TrainingState::TrainModelDownloaded
    );

    trainer_node.stop_training().await;
    cancel.cancel();
}

/// S3: the loop rejecting `.../data` twice in a row doesn't wedge `prepare` -- the state bounces
/// back to `Initialized` and is recorded under `ErrorKey::Prepare` each time, then clears and
/// advances once the loop starts answering again.
#[tokio::test]
#[serial_test::serial]
async fn prepare_retries_past_transient_failures() {
    test_utils::set_test_credentials();
    let (mock, url) = MockLoop::spawn().await;
    mock.set_image_ids("complete", vec!["a".to_string(), "b".to_string()])
        .await;
    mock.set_model_archive(detect_model_archive()).await;
    mock.fail_next_data_requests(2).await;

    let dir = tempfile::tempdir().unwrap();
    let (trainer_node, _cancel) = test_utils::spawn_trainer_node(
        dir.path(),
        &url,
        "mkdir -p output && printf weights > output/model.bin && printf '{}' > confusion_matrix.json",
        Vec::new(),
    )
    .await;
    test_utils::wait_for_connection(&trainer_node.node().client, Duration::from_secs(5)).await;
    let completed = trainer_node.training_completed_notify();

    let reply = mock
        .begin_training(
            "acme",
            "demo",
            json!({
                "id": LOOP_BASE_MODEL_ID,
                "training_number": 1,
                "categories": [{"id": "c1", "name": "A"}],
                "resolution": 800,
                "flip_rl": false,
                "flip_ud": false,
            }),
        )
        .await;
    assert!(reply.success);

    // One of the status heartbeats pushed while the two failures are being retried should carry
    // the transient error under the "prepare" key.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let mut saw_prepare_error = false;
    while tokio::time::Instant::now() < deadline {
        if mock
            .trainer_statuses()
            .await
            .iter()
            .any(|status| status.get("errors").and_then(|e| e.get("prepare")).is_some())
        {
            saw_prepare_error = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(
        saw_prepare_error,
        "expected a status heartbeat reporting a transient prepare error"
    );

    tokio::time::timeout(Duration::from_secs(20), completed.notified())
        .await
        .expect("training did not recover and reach a terminal state in time");

    let last_status = mock
        .trainer_statuses()
        .await
        .last()
        .cloned()
        .expect("at least one status heartbeat was sent");
    assert!(
        last_status
            .get("errors")
            .and_then(|e| e.get("prepare"))
            .is_none(),
        "the prepare error should be cleared once the download succeeds"
    );
}

/// S5: three of ten detection batches already uploaded (progress persisted to disk) before a
/// restart -- resuming only re-sends the remaining seven, in ascending order.
#[tokio::test]
#[serial_test::serial]
async fn resumes_detection_upload_from_persisted_progress() {
    test_utils::set_test_credentials();
    let (mock, url) = MockLoop::spawn().await;

    let dir = tempfile::tempdir().unwrap();
    let context = Context::new("acme", "demo");
    let mut training = Training::new(
        "batch-resume-training".to_string(),
        context,
        1,
        LOOP_BASE_MODEL_ID.to_string(),
        dir.path(),
    );
    training.training_state = TrainingState::Detected;
    training.data.categories = vec![Category::new("c1", "A")];
    std::fs::create_dir_all(&training.training_folder).unwrap();
    let io = TrainingIo::new(&training.training_folder);
    io.save_training(&training).unwrap();
    io.mark_model_format_uploaded("default").unwrap();

    for idx in 0..10u32 {
        io.write_detection_batch(idx, &[Detections::new(format!("img{idx}"))])
            .unwrap();
    }
    // The first three batches (indices 0, 1, 2) are already accounted for.
    io.set_detection_upload_progress(2).unwrap();

    let (_trainer_node, _cancel) = test_utils::spawn_trainer_node(dir.path(), &url, "true", Vec::new()).await;

    test_utils::wait_until(Duration::from_secs(20), || {
        TrainingIo::find_active_training(dir.path())
            .unwrap()
            .is_none()
    })
    .await;

    let batches = mock.detection_batches().await;
    assert_eq!(batches.len(), 7, "only the unfinished batches should be re-sent");

    let mut uploaded_ids: Vec<String> = batches
        .iter()
        .flatten()
        .map(|d| d.image_id.clone())
        .collect();
    uploaded_ids.sort();
    let expected: Vec<String> = (3..10u32).map(|idx| format!("img{idx}")).collect();
    assert_eq!(uploaded_ids, expected);
}
