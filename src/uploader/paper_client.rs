use async_trait::async_trait;
use reqwest::{multipart, Client};
use std::time::Duration;

use crate::errors::{AppError, AppResult};

/// Multipart field the paper endpoint expects the picture in.
pub const PICTURE_FIELD: &str = "picture";

/// File content read fresh for a single attempt.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Status and body of an HTTP response, whatever the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// One upload attempt against the remote endpoint.
///
/// `Ok` carries any HTTP response, including error statuses. `Err` means the
/// request never produced a response (connect failure, timeout, broken body).
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn send(&self, part: FilePart, timeout: Duration) -> AppResult<HttpReply>;
}

/// Client for `POST {base_url}/papers/uploadSingleImage/{paper_id}`
pub struct PaperClient {
    client: Client,
    api_key: String,
    upload_url: String,
}

impl PaperClient {
    pub fn new(base_url: &str, api_key: &str, paper_id: &str) -> AppResult<Self> {
        if api_key.trim().is_empty() {
            return Err(AppError::validation("api_key", "API key cannot be empty"));
        }
        if paper_id.trim().is_empty() {
            return Err(AppError::validation("paper_id", "Paper ID cannot be empty"));
        }

        let client = Client::builder()
            .user_agent(concat!("paperless-push/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            upload_url: format!(
                "{}/papers/uploadSingleImage/{}",
                base_url.trim_end_matches('/'),
                paper_id
            ),
        })
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    fn build_form(part: FilePart) -> AppResult<multipart::Form> {
        let part = multipart::Part::bytes(part.bytes)
            .file_name(part.file_name)
            .mime_str(&part.content_type)?;

        Ok(multipart::Form::new().part(PICTURE_FIELD, part))
    }
}

#[async_trait]
impl UploadTransport for PaperClient {
    async fn send(&self, part: FilePart, timeout: Duration) -> AppResult<HttpReply> {
        let form = Self::build_form(part)?;

        log::debug!("POST {}", self.upload_url);

        let response = self
            .client
            .post(&self.upload_url)
            .header("x-api-key", &self.api_key)
            .multipart(form)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpReply { status, body })
    }
}
