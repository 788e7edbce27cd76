use mockito::Matcher;
use paperless_push::cycle::{load_recent, load_state, CycleOptions, CycleOutcome, UploadCycle};
use paperless_push::store::JsonStore;
use paperless_push::uploader::{upload_with_retries, PaperClient, UploadSettings};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Integration tests for the paper upload path.
/// The real reqwest client talks to a local mock of the paper API.

const UPLOAD_PATH: &str = "/papers/uploadSingleImage/paper-1";

fn write_image(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"fake image payload").unwrap();
    path
}

fn settings(max_attempts: u32) -> UploadSettings {
    UploadSettings {
        timeout: Duration::from_secs(5),
        max_attempts,
    }
}

#[tokio::test]
async fn test_upload_sends_picture_field_and_api_key() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", UPLOAD_PATH)
        .match_header("x-api-key", "secret-key")
        .match_header(
            "content-type",
            Matcher::Regex("^multipart/form-data; boundary=".to_string()),
        )
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="picture"; filename="frame.png""#.to_string()),
            Matcher::Regex("(?i)content-type: image/png".to_string()),
            Matcher::Regex("fake image payload".to_string()),
        ]))
        .with_status(200)
        .with_body(r#"{"id":"abc"}"#)
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "frame.png");
    let client = PaperClient::new(&server.url(), "secret-key", "paper-1").unwrap();

    let report = upload_with_retries(&client, &path, "image/png", &settings(3))
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(report.result.ok);
    assert_eq!(report.result.status, Some(200));
    assert_eq!(report.result.body.as_deref(), Some(r#"{"id":"abc"}"#));
    assert_eq!(report.attempt_count(), 1);
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", UPLOAD_PATH)
        .with_status(401)
        .with_body("bad key")
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "frame.jpg");
    let client = PaperClient::new(&server.url(), "wrong", "paper-1").unwrap();

    let report = upload_with_retries(&client, &path, "image/jpeg", &settings(4))
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(!report.result.ok);
    assert_eq!(report.result.status, Some(401));
    assert_eq!(report.result.body.as_deref(), Some("bad key"));
    assert_eq!(report.result.error.as_deref(), Some("HTTP 401 (non-retryable)"));
}

#[tokio::test]
async fn test_server_error_is_retried_until_budget_runs_out() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", UPLOAD_PATH)
        .with_status(503)
        .with_body("maintenance")
        .expect(2)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "frame.webp");
    let client = PaperClient::new(&server.url(), "secret-key", "paper-1").unwrap();

    let report = upload_with_retries(&client, &path, "image/webp", &settings(2))
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(!report.result.ok);
    assert_eq!(report.result.status, Some(503));
    assert_eq!(report.result.error.as_deref(), Some("HTTP 503: maintenance"));
    assert_eq!(report.attempt_count(), 2);
    let backoff = report.total_backoff();
    assert!(backoff >= Duration::from_secs(2) && backoff < Duration::from_secs(3));
}

#[tokio::test]
async fn test_unreachable_server_reports_no_status() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "frame.png");
    // Port 1 on loopback refuses connections.
    let client = PaperClient::new("http://127.0.0.1:1", "secret-key", "paper-1").unwrap();

    let report = upload_with_retries(&client, &path, "image/png", &settings(1))
        .await
        .unwrap();

    assert!(!report.result.ok);
    assert_eq!(report.result.status, None);
    assert!(report.result.error.is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn test_full_cycle_against_mock_api() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", UPLOAD_PATH)
        .match_header("x-api-key", "secret-key")
        .with_status(201)
        .with_body("stored")
        .expect(3)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("input");
    std::fs::create_dir_all(&input_dir).unwrap();
    for name in ["a.png", "b.jpg", "c.webp", "readme.txt"] {
        write_image(&input_dir, name);
    }

    let cycle = UploadCycle {
        store: JsonStore::new(dir.path().join("state")),
        input_dir,
        publish_dir: dir.path().join("www"),
        publish: true,
        settings: settings(2),
        transport: Box::new(PaperClient::new(&server.url(), "secret-key", "paper-1").unwrap()),
    };

    let mut uploaded = Vec::new();
    for _ in 0..3 {
        let state = cycle.run(&CycleOptions::default()).await.unwrap();
        assert_eq!(state.last_result, Some(CycleOutcome::Success));
        assert_eq!(state.last_http_status, Some(201));
        uploaded.push(state.current_filename.unwrap());
    }

    mock.assert_async().await;

    // Three pictures, recency window of five: every cycle shows a new one.
    uploaded.sort();
    assert_eq!(uploaded, vec!["a.png", "b.jpg", "c.webp"]);

    let published: Vec<_> = std::fs::read_dir(dir.path().join("www")).unwrap().collect();
    assert_eq!(published.len(), 1);

    let state = load_state(&cycle.store).await.unwrap().unwrap();
    assert!(state.published_name.unwrap().starts_with("chosen_"));
    assert_eq!(load_recent(&cycle.store).await.unwrap().len(), 3);
}
