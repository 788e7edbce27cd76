// One pick-publish-upload cycle and the state it leaves behind

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::{AppError, AppResult};
use crate::library::{guess_mime_type, list_images};
use crate::lock::CycleLock;
use crate::publish::republish;
use crate::selector::{choose, RecencyWindow};
use crate::store::{JsonStore, STORE_KEY_RECENT, STORE_KEY_STATE};
use crate::uploader::{upload_with_retries, UploadResult, UploadSettings, UploadTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Success,
    Failed,
    DryRun,
}

/// Last cycle, as shown by `status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleState {
    /// Time of the last successful upload; failed cycles carry it forward.
    pub last_upload: Option<DateTime<Utc>>,
    pub current_filename: Option<String>,
    pub last_result: Option<CycleOutcome>,
    pub last_http_status: Option<u16>,
    pub last_error: Option<String>,
    pub published_name: Option<String>,
}

impl CycleState {
    fn failed(previous: &CycleState, filename: Option<String>, error: String) -> Self {
        Self {
            last_upload: previous.last_upload,
            current_filename: filename,
            last_result: Some(CycleOutcome::Failed),
            last_http_status: None,
            last_error: Some(error),
            published_name: None,
        }
    }

    fn from_upload(
        previous: &CycleState,
        filename: String,
        result: &UploadResult,
        published_name: Option<String>,
    ) -> Self {
        if result.ok {
            Self {
                last_upload: Some(Utc::now()),
                current_filename: Some(filename),
                last_result: Some(CycleOutcome::Success),
                last_http_status: result.status,
                last_error: None,
                published_name,
            }
        } else {
            Self {
                last_upload: previous.last_upload,
                current_filename: Some(filename),
                last_result: Some(CycleOutcome::Failed),
                last_http_status: result.status,
                last_error: result.error.clone().or_else(|| result.body.clone()),
                published_name,
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CycleOptions {
    /// Upload this file from the input directory instead of picking one.
    pub force_file: Option<String>,
    /// Pick and publish, but do not upload.
    pub dry_run: bool,
    /// Overrides the configured publish flag.
    pub publish: Option<bool>,
}

pub struct UploadCycle {
    pub store: JsonStore,
    pub input_dir: PathBuf,
    pub publish_dir: PathBuf,
    pub publish: bool,
    pub settings: UploadSettings,
    pub transport: Box<dyn UploadTransport>,
}

impl UploadCycle {
    /// Run one cycle under the cycle lock and persist its state.
    pub async fn run(&self, options: &CycleOptions) -> AppResult<CycleState> {
        let _lock = CycleLock::acquire_async(self.store.dir()).await?;
        let previous = load_state(&self.store).await?.unwrap_or_default();
        let input_dir = self.input_dir.display().to_string();

        let files = list_images(&self.input_dir).await?;
        if files.is_empty() {
            log::warn!("No images found in {}", input_dir);
            let err = AppError::empty_candidate_set(&input_dir);
            self.record(CycleState::failed(&previous, None, err.to_string()))
                .await?;
            return Err(err);
        }

        let chosen = match &options.force_file {
            Some(name) if files.contains(name) => name.clone(),
            Some(name) => {
                log::error!("force_file '{}' not found in {}", name, input_dir);
                let err = AppError::force_file_not_found(name);
                self.record(CycleState::failed(&previous, None, err.to_string()))
                    .await?;
                return Err(err);
            }
            None => choose_varied(&self.store, &files).await?,
        };

        let src_path = self.input_dir.join(&chosen);

        let mut published_name = None;
        if options.publish.unwrap_or(self.publish) {
            match republish(&src_path, &self.publish_dir).await {
                Ok(name) => published_name = Some(name),
                // Publishing is a convenience; the upload still goes ahead.
                Err(e) => log::error!("Publish copy failed: {}", e),
            }
        }

        if options.dry_run {
            log::info!(
                "Dry-run: chosen={} published_name={:?}",
                chosen,
                published_name
            );
            let state = CycleState {
                last_upload: previous.last_upload,
                current_filename: Some(chosen),
                last_result: Some(CycleOutcome::DryRun),
                last_http_status: None,
                last_error: None,
                published_name,
            };
            self.record(state.clone()).await?;
            return Ok(state);
        }

        let mime = guess_mime_type(&src_path);
        let report = match upload_with_retries(
            self.transport.as_ref(),
            &src_path,
            mime,
            &self.settings,
        )
        .await
        {
            Ok(report) => report,
            Err(e) => {
                log::error!("Upload of {} aborted: {}", chosen, e);
                self.record(CycleState::failed(&previous, Some(chosen), e.to_string()))
                    .await?;
                return Err(e);
            }
        };

        let result = &report.result;
        if result.ok {
            log::info!("Upload succeeded: {} ({:?})", chosen, result.status);
        } else {
            log::error!(
                "Upload failed: {} ({:?}) {} after {} attempt(s)",
                chosen,
                result.status,
                result.error.as_deref().unwrap_or(""),
                report.attempt_count()
            );
        }

        let state = CycleState::from_upload(&previous, chosen, result, published_name);
        self.record(state.clone()).await?;
        Ok(state)
    }

    async fn record(&self, state: CycleState) -> AppResult<()> {
        self.store.save(STORE_KEY_STATE, &state).await
    }
}

/// Pick from `files` using the persisted recency window, then persist the updated window.
pub async fn choose_varied(store: &JsonStore, files: &[String]) -> AppResult<String> {
    let window: RecencyWindow = store.load(STORE_KEY_RECENT).await?.unwrap_or_default();
    let selection = choose(files, window, &mut rand::thread_rng())?;
    store.save(STORE_KEY_RECENT, &selection.window).await?;
    Ok(selection.chosen)
}

pub async fn load_recent(store: &JsonStore) -> AppResult<RecencyWindow> {
    Ok(store.load(STORE_KEY_RECENT).await?.unwrap_or_default())
}

pub async fn reset_recent(store: &JsonStore) -> AppResult<()> {
    let _lock = CycleLock::acquire_async(store.dir()).await?;
    store.save(STORE_KEY_RECENT, &RecencyWindow::new()).await?;
    log::info!("Recent list reset");
    Ok(())
}

pub async fn load_state(store: &JsonStore) -> AppResult<Option<CycleState>> {
    store.load(STORE_KEY_STATE).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::{FilePart, HttpReply};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct FixedTransport {
        status: u16,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl UploadTransport for FixedTransport {
        async fn send(&self, _part: FilePart, _timeout: Duration) -> AppResult<HttpReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(HttpReply {
                status: self.status,
                body: "reply".to_string(),
            })
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        calls: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new(images: &[&str]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let input = dir.path().join("input");
            std::fs::create_dir_all(&input).unwrap();
            for name in images {
                std::fs::write(input.join(name), b"img").unwrap();
            }
            Self {
                dir,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn cycle(&self, status: u16) -> UploadCycle {
            UploadCycle {
                store: JsonStore::new(self.dir.path().join("state")),
                input_dir: self.dir.path().join("input"),
                publish_dir: self.dir.path().join("www"),
                publish: true,
                settings: UploadSettings {
                    timeout: Duration::from_secs(1),
                    max_attempts: 1,
                },
                transport: Box::new(FixedTransport {
                    status,
                    calls: self.calls.clone(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_successful_cycle_records_state_and_window() {
        let fixture = Fixture::new(&["a.png", "b.jpg"]);
        let cycle = fixture.cycle(200);

        let state = cycle.run(&CycleOptions::default()).await.unwrap();
        assert_eq!(state.last_result, Some(CycleOutcome::Success));
        assert_eq!(state.last_http_status, Some(200));
        assert!(state.last_upload.is_some());
        assert!(state.published_name.is_some());

        let chosen = state.current_filename.clone().unwrap();
        let window = load_recent(&cycle.store).await.unwrap();
        assert!(window.contains(&chosen));
        assert_eq!(load_state(&cycle.store).await.unwrap(), Some(state));
        assert_eq!(fixture.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dry_run_skips_upload_but_updates_window() {
        let fixture = Fixture::new(&["a.png"]);
        let cycle = fixture.cycle(200);
        let options = CycleOptions {
            dry_run: true,
            publish: Some(false),
            ..CycleOptions::default()
        };

        let state = cycle.run(&options).await.unwrap();
        assert_eq!(state.last_result, Some(CycleOutcome::DryRun));
        assert_eq!(state.current_filename.as_deref(), Some("a.png"));
        assert!(state.published_name.is_none());
        assert_eq!(fixture.calls.load(Ordering::SeqCst), 0);
        assert!(load_recent(&cycle.store).await.unwrap().contains("a.png"));
    }

    #[tokio::test]
    async fn test_forced_file_bypasses_window() {
        let fixture = Fixture::new(&["a.png", "b.png"]);
        let cycle = fixture.cycle(200);
        let options = CycleOptions {
            force_file: Some("b.png".to_string()),
            ..CycleOptions::default()
        };

        let state = cycle.run(&options).await.unwrap();
        assert_eq!(state.current_filename.as_deref(), Some("b.png"));
        assert!(load_recent(&cycle.store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_forced_file_is_recorded() {
        let fixture = Fixture::new(&["a.png"]);
        let cycle = fixture.cycle(200);
        let options = CycleOptions {
            force_file: Some("z.png".to_string()),
            ..CycleOptions::default()
        };

        let result = cycle.run(&options).await;
        assert!(matches!(result, Err(AppError::ForceFileNotFound { .. })));

        let state = load_state(&cycle.store).await.unwrap().unwrap();
        assert_eq!(state.last_result, Some(CycleOutcome::Failed));
        assert_eq!(state.last_error.as_deref(), Some("force_file not found: z.png"));
    }

    #[tokio::test]
    async fn test_empty_library_is_reported_not_uploaded() {
        let fixture = Fixture::new(&[]);
        let cycle = fixture.cycle(200);

        let result = cycle.run(&CycleOptions::default()).await;
        assert!(matches!(result, Err(AppError::EmptyCandidateSet { .. })));
        assert_eq!(fixture.calls.load(Ordering::SeqCst), 0);

        let state = load_state(&cycle.store).await.unwrap().unwrap();
        assert!(state.last_error.unwrap().starts_with("No images in"));
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_upload_time() {
        let fixture = Fixture::new(&["a.png"]);
        let first = fixture.cycle(200).run(&CycleOptions::default()).await.unwrap();

        let state = fixture.cycle(403).run(&CycleOptions::default()).await.unwrap();
        assert_eq!(state.last_result, Some(CycleOutcome::Failed));
        assert_eq!(state.last_http_status, Some(403));
        assert_eq!(state.last_error.as_deref(), Some("HTTP 403 (non-retryable)"));
        assert_eq!(state.last_upload, first.last_upload);
    }

    #[tokio::test]
    async fn test_reset_recent_clears_window() {
        let fixture = Fixture::new(&["a.png", "b.png"]);
        let cycle = fixture.cycle(200);
        cycle.run(&CycleOptions::default()).await.unwrap();
        assert!(!load_recent(&cycle.store).await.unwrap().is_empty());

        reset_recent(&cycle.store).await.unwrap();
        assert!(load_recent(&cycle.store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_held_lock_skips_cycle_without_touching_state() {
        let fixture = Fixture::new(&["a.png"]);
        let cycle = fixture.cycle(200);
        let _held = CycleLock::acquire_async(cycle.store.dir()).await.unwrap();

        let result = cycle.run(&CycleOptions::default()).await;
        assert!(matches!(result, Err(AppError::CycleLocked { .. })));
        assert_eq!(fixture.calls.load(Ordering::SeqCst), 0);
        assert!(load_state(&cycle.store).await.unwrap().is_none());
    }
}
