use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};

pub const STORE_KEY_RECENT: &str = "paperless_push_recent";
pub const STORE_KEY_STATE: &str = "paperless_push_state";

/// Small JSON documents persisted by key, one file per key.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> AppResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(AppError::validation("store_key", "Invalid store key"));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    /// Load the document stored under `key`, `None` if it was never saved.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        let path = self.path_for(key)?;

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::warn!(
                    "Failed to parse stored {}: {}. Starting from empty.",
                    path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Replace the document under `key`. Readers never see a half-written file.
    pub async fn save<T: Serialize>(&self, key: &str, value: &T) -> AppResult<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let tmp_path = self
            .dir
            .join(format!(".{}.{}.tmp", key, uuid::Uuid::new_v4()));
        let contents = serde_json::to_string_pretty(value)?;

        tokio::fs::write(&tmp_path, contents).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        log::debug!("Saved {}", path.display());
        Ok(())
    }
}
