//! Incoming message feed.
//!
//! * [`FeedReader`] — reads the long-lived `messages` response chunk by
//!   chunk and appends each fragment to the feed.
//! * [`FeedQueue`] / [`SharedFeed`] — bounded FIFO list the UI renders.
//! * [`markup`] — turns server markup into [`FeedEntry`] values.
//! * [`history`] — one-shot backlog preload from the chat page.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use webchat_client::config::AppConfig;
//! use webchat_client::feed::{new_shared_feed, FeedReader};
//!
//! # async fn example() {
//! let config = AppConfig::default();
//! let feed = new_shared_feed(config.feed.capacity);
//! let reader = FeedReader::new(Arc::clone(&feed));
//! reader
//!     .run(&reqwest::Client::new(), &config.server.endpoint("messages"))
//!     .await;
//! # }
//! ```

pub mod history;
pub mod markup;
pub mod queue;
pub mod reader;

pub use history::{extract_history, fetch_history};
pub use markup::{parse_fragment, EntryBody, FeedEntry};
pub use queue::{new_shared_feed, FeedQueue, SharedFeed};
pub use reader::{FeedError, FeedNotify, FeedReader};
