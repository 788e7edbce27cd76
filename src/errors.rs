use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("No images in {dir}")]
    EmptyCandidateSet { dir: String },

    #[error("force_file not found: {name}")]
    ForceFileNotFound { name: String },

    #[error("Cannot read {path}: {source}")]
    LocalIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Another cycle is already running (PID {pid})")]
    CycleLocked { pid: u32 },
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn empty_candidate_set(dir: &str) -> Self {
        Self::EmptyCandidateSet {
            dir: dir.to_string(),
        }
    }

    pub fn force_file_not_found(name: &str) -> Self {
        Self::ForceFileNotFound {
            name: name.to_string(),
        }
    }

    pub fn local_io(path: &Path, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.display().to_string(),
            source,
        }
    }

    /// Errors a later cycle may not hit again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Network(_) | AppError::Io(_) | AppError::CycleLocked { .. }
        )
    }
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
