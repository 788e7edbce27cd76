// Uploader module - delivers the chosen picture to the paper endpoint
//
// `paper_client` owns the HTTP wire contract, `retry` the attempt budget and backoff

pub mod paper_client;
pub mod retry;

pub use paper_client::{FilePart, HttpReply, PaperClient, UploadTransport};
pub use retry::{
    upload_with_retries, UploadAttempt, UploadClassification, UploadReport, UploadResult,
    UploadSettings,
};
