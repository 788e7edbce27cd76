// Varied picture selection backed by a bounded "recently shown" window

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use crate::errors::{AppError, AppResult};

pub const MIN_RECENT: usize = 5;
pub const MAX_RECENT: usize = 50;

/// Size of the recency window for a library of `n_files` pictures:
/// half the library, at least 5 and at most 50. Halves round to even.
pub fn recent_capacity(n_files: usize) -> usize {
    let half = (n_files as f64 * 0.5).round_ties_even() as usize;
    half.clamp(MIN_RECENT, MAX_RECENT)
}

/// Most recently chosen file names, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecencyWindow {
    #[serde(default)]
    recent: VecDeque<String>,
}

impl RecencyWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.recent.iter().any(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.recent.iter()
    }

    /// Drop names no longer in the library, then keep the newest `capacity`.
    fn retain_present(&mut self, present: &HashSet<&str>, capacity: usize) {
        self.recent.retain(|name| present.contains(name.as_str()));
        self.trim(capacity);
    }

    fn push(&mut self, name: String, capacity: usize) {
        self.recent.push_back(name);
        self.trim(capacity);
    }

    fn trim(&mut self, capacity: usize) {
        while self.recent.len() > capacity {
            self.recent.pop_front();
        }
    }
}

impl<S: Into<String>> FromIterator<S> for RecencyWindow {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            recent: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub chosen: String,
    pub window: RecencyWindow,
}

/// Pick a file not shown recently, falling back to the whole library when
/// every file is in the window. The caller persists `Selection::window`.
pub fn choose<R: Rng + ?Sized>(
    files: &[String],
    mut window: RecencyWindow,
    rng: &mut R,
) -> AppResult<Selection> {
    if files.is_empty() {
        return Err(AppError::empty_candidate_set("file list"));
    }

    let capacity = recent_capacity(files.len());
    let present: HashSet<&str> = files.iter().map(String::as_str).collect();
    window.retain_present(&present, capacity);

    let candidates: Vec<&String> = files.iter().filter(|f| !window.contains(f)).collect();

    let chosen = if candidates.is_empty() {
        log::debug!(
            "All {} files shown recently, choosing from the full library",
            files.len()
        );
        files.choose(rng)
    } else {
        candidates.choose(rng).copied()
    }
    .cloned()
    .ok_or_else(|| AppError::empty_candidate_set("file list"))?;

    window.push(chosen.clone(), capacity);
    log::debug!(
        "Chose {} ({} in recency window, capacity {})",
        chosen,
        window.len(),
        capacity
    );

    Ok(Selection { chosen, window })
}
