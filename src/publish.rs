// Publishing: keeps a locally servable copy of the picture currently on the frame

use chrono::Local;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::errors::AppResult;

/// Name of the published copy: `chosen_<YYYYmmdd_HHMMSS>_<original name>`.
pub fn published_name(file_name: &str, timestamp: &str) -> String {
    format!("chosen_{}_{}", timestamp, file_name)
}

/// Remove regular files directly inside `publish_dir`. Subdirectories are left alone.
pub fn clear_publish_dir_sync(publish_dir: &Path) -> AppResult<usize> {
    let entries = match fs::read_dir(publish_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() {
            fs::remove_file(&path)?;
            log::debug!("Removed old published file: {}", path.display());
            removed += 1;
        }
    }

    Ok(removed)
}

/// Copy `src_path` into `publish_dir` and return the published file name.
pub fn publish_copy_sync(src_path: &Path, publish_dir: &Path) -> AppResult<String> {
    fs::create_dir_all(publish_dir)?;

    let base = src_path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let dst_name = published_name(&base, &timestamp);

    fs::copy(src_path, publish_dir.join(&dst_name))?;
    Ok(dst_name)
}

/// Replace whatever is published with a copy of `src_path`, off the async executor.
pub async fn republish(src_path: &Path, publish_dir: &Path) -> AppResult<String> {
    let src: PathBuf = src_path.to_path_buf();
    let dir: PathBuf = publish_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let removed = clear_publish_dir_sync(&dir)?;
        if removed > 0 {
            log::debug!("Cleared {} file(s) from {}", removed, dir.display());
        }
        publish_copy_sync(&src, &dir)
    })
    .await
    .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?
}
