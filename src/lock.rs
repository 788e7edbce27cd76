use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use sysinfo::{Pid, System};

use crate::errors::{AppError, AppResult};

const LOCK_FILE_NAME: &str = "cycle.lock";

/// An unreadable lock younger than this is assumed to belong to a live owner.
const UNREADABLE_LOCK_GRACE: Duration = Duration::from_secs(30);

/// Held for the duration of one pick-and-upload cycle. Dropping it releases the lock.
#[derive(Debug)]
pub struct CycleLock {
    path: PathBuf,
    /// Exact lock file contents; `Drop` only removes a file that still matches.
    contents: String,
}

impl CycleLock {
    /// Take the lock in `state_dir`, reclaiming it if the recorded owner is gone.
    pub fn acquire(state_dir: &Path) -> AppResult<Self> {
        fs::create_dir_all(state_dir)?;
        let path = state_dir.join(LOCK_FILE_NAME);
        let current_pid = std::process::id();
        let contents = format!("{}\n{}\n", current_pid, uuid::Uuid::new_v4());

        // Two rounds: the second follows removal of a stale lock.
        for _ in 0..2 {
            match link_new_lock(state_dir, &path, &contents) {
                Ok(()) => {
                    log::debug!("Acquired cycle lock {} (PID {})", path.display(), current_pid);
                    return Ok(Self { path, contents });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let seen = match fs::read_to_string(&path) {
                        Ok(seen) => seen,
                        Err(e) if e.kind() == ErrorKind::NotFound => continue,
                        Err(e) => return Err(e.into()),
                    };
                    match parse_owner(&seen) {
                        Some(pid) if is_process_alive(pid) => {
                            return Err(AppError::CycleLocked { pid });
                        }
                        None if is_recent(&path) => {
                            return Err(AppError::CycleLocked { pid: 0 });
                        }
                        _ => {}
                    }
                    log::warn!("Removing stale cycle lock {}", path.display());
                    remove_if_unchanged(&path, &seen)?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let pid = read_owner(&path).unwrap_or_default();
        Err(AppError::CycleLocked { pid })
    }

    /// `acquire` on the blocking pool; the stale check scans the process table.
    pub async fn acquire_async(state_dir: &Path) -> AppResult<Self> {
        let dir = state_dir.to_path_buf();
        tokio::task::spawn_blocking(move || Self::acquire(&dir))
            .await
            .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CycleLock {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(seen) if seen == self.contents => {
                if let Err(e) = fs::remove_file(&self.path) {
                    log::warn!("Failed to remove cycle lock {}: {}", self.path.display(), e);
                } else {
                    log::debug!("Released cycle lock");
                }
            }
            Ok(_) => log::warn!(
                "Cycle lock {} was taken over by another owner, leaving it",
                self.path.display()
            ),
            Err(e) => log::warn!("Cycle lock {} already gone: {}", self.path.display(), e),
        }
    }
}

/// Write `contents` to a private temp file, then hard-link it to `path` so the
/// lock never exists half-written. Fails with `AlreadyExists` when held.
fn link_new_lock(state_dir: &Path, path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp_path = state_dir.join(format!(".{}.{}.tmp", LOCK_FILE_NAME, uuid::Uuid::new_v4()));
    fs::write(&tmp_path, contents)?;
    let linked = fs::hard_link(&tmp_path, path);
    if let Err(e) = fs::remove_file(&tmp_path) {
        log::debug!("Failed to remove {}: {}", tmp_path.display(), e);
    }
    linked
}

fn remove_if_unchanged(path: &Path, expected: &str) -> AppResult<()> {
    match fs::read_to_string(path) {
        Ok(seen) if seen == expected => match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        },
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn parse_owner(contents: &str) -> Option<u32> {
    contents.lines().next()?.trim().parse::<u32>().ok()
}

fn read_owner(path: &Path) -> Option<u32> {
    parse_owner(&fs::read_to_string(path).ok()?)
}

fn is_recent(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .map_or(true, |age| age < UNREADABLE_LOCK_GRACE)
}

fn is_process_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    let mut system = System::new();
    system.refresh_processes();
    system.process(Pid::from(pid as usize)).is_some()
}
