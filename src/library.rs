// Image library: lists uploadable pictures in the input directory

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::errors::AppResult;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Whether a file name carries one of the accepted image extensions (case-insensitive).
pub fn is_image_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// MIME type sent with the multipart `picture` field.
pub fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// List image file names in `input_dir`, sorted. A missing directory is an empty library.
pub async fn list_images(input_dir: &Path) -> AppResult<Vec<String>> {
    let dir = input_dir.to_path_buf();
    tokio::task::spawn_blocking(move || list_images_sync(&dir))
        .await
        .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?
}

pub fn list_images_sync(input_dir: &Path) -> AppResult<Vec<String>> {
    let entries = match fs::read_dir(input_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("Input directory {} does not exist", input_dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.path().is_file() && is_image_name(&name) {
            files.push(name);
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}
