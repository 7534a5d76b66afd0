//! `Uploader` trait and its HTTP implementation.
//!
//! [`HttpUploader`] POSTs a [`ChatForm`] as `multipart/form-data` to the
//! `chat` endpoint.  Success means the request completed at the transport
//! level; the response body is not inspected.  Nothing is retried.

use async_trait::async_trait;
use thiserror::Error;

use crate::chat::form::ChatForm;
use crate::config::ServerConfig;

// ---------------------------------------------------------------------------
// UploadError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// The request could not be built or did not complete (DNS, connection
    /// refused, aborted, timeout).
    #[error("upload request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        UploadError::Request(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Uploader trait
// ---------------------------------------------------------------------------

/// Sends one form to the chat endpoint.
///
/// Object-safe so the composer and the recorder can share an
/// `Arc<dyn Uploader>`.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn send(&self, form: ChatForm) -> Result<(), UploadError>;
}

// ---------------------------------------------------------------------------
// HttpUploader
// ---------------------------------------------------------------------------

pub struct HttpUploader {
    client: reqwest::Client,
    url: String,
}

impl HttpUploader {
    /// Build an uploader targeting `<base_url>/chat`.
    ///
    /// Falls back to a default client if the builder fails.
    pub fn from_config(config: &ServerConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self::new(client, config.endpoint("chat"))
    }

    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn send(&self, form: ChatForm) -> Result<(), UploadError> {
        let is_stream = form.is_stream();
        let body = form.into_multipart()?;

        let response = self.client.post(&self.url).multipart(body).send().await?;

        log::debug!(
            "chat POST ({}) → {}",
            if is_stream { "stream" } else { "message" },
            response.status()
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

/// Records every form it is given; optionally fails each call.
#[cfg(test)]
pub struct MockUploader {
    sent: std::sync::Mutex<Vec<ChatForm>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MockUploader {
    pub fn ok() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
            fail: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let mock = Self::ok();
        mock.set_failing(true);
        mock
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Every form passed to `send`, including failed ones.
    pub fn sent(&self) -> Vec<ChatForm> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Uploader for MockUploader {
    async fn send(&self, form: ChatForm) -> Result<(), UploadError> {
        self.sent.lock().unwrap().push(form);
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            Err(UploadError::Request("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_targets_chat_endpoint() {
        let config = ServerConfig {
            base_url: "http://127.0.0.1:9/app/".into(),
            timeout_secs: 1,
        };
        let uploader = HttpUploader::from_config(&config);
        assert_eq!(uploader.url(), "http://127.0.0.1:9/app/chat");
    }

    #[test]
    fn uploader_is_object_safe() {
        let uploader: Box<dyn Uploader> =
            Box::new(HttpUploader::from_config(&ServerConfig::default()));
        drop(uploader);
    }

    /// Nothing listens on the discard port, so the POST is refused at the
    /// transport level.
    #[tokio::test]
    async fn unreachable_server_is_a_request_error() {
        let uploader = HttpUploader::from_config(&ServerConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
        });
        let result = uploader.send(ChatForm::text_message("a", "b")).await;
        assert!(matches!(result, Err(UploadError::Request(_))));
    }

    #[tokio::test]
    async fn mock_records_and_fails_on_demand() {
        let mock = MockUploader::ok();
        assert!(mock.send(ChatForm::text_message("a", "1")).await.is_ok());
        mock.set_failing(true);
        assert!(mock.send(ChatForm::text_message("a", "2")).await.is_err());
        assert_eq!(mock.sent().len(), 2);
    }
}
