//! Pushes a varied, non-repeating picture from a local folder to a paperlesspaper frame.
//!
//! `selector` picks the next file against a persisted recency window, `uploader`
//! delivers it with status-aware retries, and `cycle` ties both to the store.

pub mod cli;
pub mod config;
pub mod cycle;
pub mod errors;
pub mod library;
pub mod lock;
pub mod publish;
pub mod selector;
pub mod store;
pub mod uploader;

pub use errors::{AppError, AppResult};
