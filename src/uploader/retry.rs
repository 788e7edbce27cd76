use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::time::{sleep, Duration};

use super::paper_client::{FilePart, HttpReply, UploadTransport};
use crate::errors::{truncate_chars, AppError, AppResult};

/// Longest response body kept in a result.
pub const MAX_BODY_CHARS: usize = 5000;
/// Cap on the exponential part of the backoff, in seconds.
pub const MAX_BACKOFF_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Budget for each attempt, not for the whole upload.
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadClassification {
    Success,
    NonRetryable,
    Retryable,
    /// Statuses outside every known class; retried like `Retryable`.
    Unclassified,
}

impl UploadClassification {
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            400 | 401 | 403 | 404 => Self::NonRetryable,
            429 | 500..=599 => Self::Retryable,
            _ => Self::Unclassified,
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Retryable | Self::Unclassified)
    }
}

/// Final outcome of an upload, after retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub ok: bool,
    pub status: Option<u16>,
    pub body: Option<String>,
    pub error: Option<String>,
}

impl UploadResult {
    fn success(reply: HttpReply) -> Self {
        Self {
            ok: true,
            status: Some(reply.status),
            body: Some(reply.body),
            error: None,
        }
    }

    fn non_retryable(reply: HttpReply) -> Self {
        Self {
            ok: false,
            status: Some(reply.status),
            body: Some(truncate_chars(&reply.body, MAX_BODY_CHARS)),
            error: Some(format!("HTTP {} (non-retryable)", reply.status)),
        }
    }

    fn exhausted(failure: AttemptFailure) -> Self {
        Self {
            ok: false,
            status: failure.status,
            body: failure.body,
            error: Some(failure.error),
        }
    }
}

/// What went wrong in a single failed attempt. Only the latest one is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub classification: UploadClassification,
    pub status: Option<u16>,
    pub body: Option<String>,
    pub error: String,
}

impl AttemptFailure {
    fn transport(error: &AppError) -> Self {
        Self {
            classification: UploadClassification::Retryable,
            status: None,
            body: None,
            error: error.to_string(),
        }
    }

    fn http(classification: UploadClassification, reply: HttpReply) -> Self {
        let body = truncate_chars(&reply.body, MAX_BODY_CHARS);
        let error = if body.is_empty() {
            format!("HTTP {}", reply.status)
        } else {
            format!("HTTP {}: {}", reply.status, body)
        };

        Self {
            classification,
            status: Some(reply.status),
            body: Some(body),
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadAttempt {
    /// 1-based
    pub attempt: u32,
    pub classification: UploadClassification,
    pub status: Option<u16>,
    /// Sleep taken after this attempt, `None` when no further attempt followed.
    pub backoff: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct UploadReport {
    pub result: UploadResult,
    pub attempts: Vec<UploadAttempt>,
}

impl UploadReport {
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn total_backoff(&self) -> Duration {
        self.attempts.iter().filter_map(|a| a.backoff).sum()
    }
}

/// Delay after failed attempt `attempt` (1-based): `min(60, 2^attempt) + jitter` seconds.
pub fn backoff_delay(attempt: u32, jitter: f64) -> Duration {
    let exponential = 2u64.saturating_pow(attempt).min(MAX_BACKOFF_SECS);
    // Whole nanoseconds, truncated, so the delay stays below the next second.
    let jitter_nanos = if jitter.is_finite() && jitter > 0.0 {
        ((jitter * 1e9) as u64).min(999_999_999)
    } else {
        0
    };
    Duration::from_secs(exponential) + Duration::from_nanos(jitter_nanos)
}

/// `backoff_delay` with jitter drawn uniformly from `[0, 1)`.
pub fn jittered_backoff<R: Rng + ?Sized>(attempt: u32, rng: &mut R) -> Duration {
    backoff_delay(attempt, rng.gen::<f64>())
}

async fn read_file_part(file_path: &Path, content_type: &str) -> AppResult<FilePart> {
    let bytes = tokio::fs::read(file_path)
        .await
        .map_err(|e| AppError::local_io(file_path, e))?;

    let file_name = file_path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    Ok(FilePart {
        file_name,
        content_type: content_type.to_string(),
        bytes,
    })
}

/// Upload `file_path` through `transport`, retrying transient failures.
///
/// HTTP and transport failures always end up in the returned `UploadResult`.
/// `Err` is reserved for local problems: invalid settings or a file that
/// cannot be read, neither of which another attempt would fix.
pub async fn upload_with_retries<T>(
    transport: &T,
    file_path: &Path,
    content_type: &str,
    settings: &UploadSettings,
) -> AppResult<UploadReport>
where
    T: UploadTransport + ?Sized,
{
    if settings.max_attempts == 0 {
        return Err(AppError::validation(
            "max_attempts",
            "Must allow at least one attempt",
        ));
    }

    let max_attempts = settings.max_attempts;
    let mut attempts = Vec::new();
    let mut last_failure = None;

    for attempt in 1..=max_attempts {
        let part = read_file_part(file_path, content_type).await?;

        let failure = match transport.send(part, settings.timeout).await {
            Ok(reply) => match UploadClassification::from_status(reply.status) {
                UploadClassification::Success => {
                    log::info!(
                        "Upload of {} succeeded with HTTP {} on attempt {}/{}",
                        file_path.display(),
                        reply.status,
                        attempt,
                        max_attempts
                    );
                    attempts.push(UploadAttempt {
                        attempt,
                        classification: UploadClassification::Success,
                        status: Some(reply.status),
                        backoff: None,
                    });
                    return Ok(UploadReport {
                        result: UploadResult::success(reply),
                        attempts,
                    });
                }
                UploadClassification::NonRetryable => {
                    log::error!(
                        "Upload of {} rejected with HTTP {}, not retrying",
                        file_path.display(),
                        reply.status
                    );
                    attempts.push(UploadAttempt {
                        attempt,
                        classification: UploadClassification::NonRetryable,
                        status: Some(reply.status),
                        backoff: None,
                    });
                    return Ok(UploadReport {
                        result: UploadResult::non_retryable(reply),
                        attempts,
                    });
                }
                classification => AttemptFailure::http(classification, reply),
            },
            Err(e) => AttemptFailure::transport(&e),
        };

        log::warn!(
            "Upload attempt {}/{} failed: {}",
            attempt,
            max_attempts,
            failure.error
        );

        let backoff = (attempt < max_attempts)
            .then(|| jittered_backoff(attempt, &mut rand::thread_rng()));

        attempts.push(UploadAttempt {
            attempt,
            classification: failure.classification,
            status: failure.status,
            backoff,
        });
        last_failure = Some(failure);

        if let Some(delay) = backoff {
            log::info!("Retrying upload in {:.1}s", delay.as_secs_f64());
            sleep(delay).await;
        }
    }

    let failure = last_failure.unwrap_or_else(|| AttemptFailure {
        classification: UploadClassification::Retryable,
        status: None,
        body: None,
        error: "no upload attempt was made".to_string(),
    });

    log::error!(
        "Giving up on {} after {} attempts: {}",
        file_path.display(),
        max_attempts,
        failure.error
    );

    Ok(UploadReport {
        result: UploadResult::exhausted(failure),
        attempts,
    })
}
