//! Outbound side of the chat protocol.
//!
//! * [`ChatForm`] — ordered multipart fields for text, stream chunks and
//!   file uploads.
//! * [`Uploader`] — async trait; [`HttpUploader`] is the `reqwest` backend.
//!
//! ```rust,no_run
//! use webchat_client::chat::{ChatForm, HttpUploader, Uploader};
//! use webchat_client::config::AppConfig;
//!
//! # async fn example() {
//! let config = AppConfig::default();
//! let uploader = HttpUploader::from_config(&config.server);
//! if let Err(e) = uploader.send(ChatForm::text_message("alice", "hi")).await {
//!     log::error!("{e}");
//! }
//! # }
//! ```

pub mod form;
pub mod uploader;

pub use form::{ChatForm, FieldValue};
pub use uploader::{HttpUploader, UploadError, Uploader};

#[cfg(test)]
pub use uploader::MockUploader;
