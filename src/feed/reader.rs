//! Incremental reader for the `messages` stream.
//!
//! [`FeedReader`] issues one GET and then awaits body chunks one at a time
//! until the server closes the response or something fails.  Each chunk is
//! decoded and rendered on its own; nothing is buffered across chunks.
//!
//! ```text
//! GET messages ──▶ chunk ──decode──▶ trim().is_empty()? ──no──▶ FeedQueue::append
//!                   ▲                                                │
//!                   └──────────────── next chunk ◀── trim to cap ◀───┘
//! ```
//!
//! There is no reconnect: natural end of stream and failures both end the
//! reader for the lifetime of the process.
//!
//! With [`with_history`](FeedReader::with_history) the chat page backlog is
//! fetched after `messages` has answered and before its first chunk is
//! rendered.  A message posted in between can show up twice, but none is
//! lost.

use std::fmt::Display;
use std::sync::{Arc, MutexGuard};

use futures_util::{Stream, StreamExt};
use thiserror::Error;

use super::history::fetch_history;
use super::markup::{parse_fragment, FeedEntry};
use super::queue::{FeedQueue, SharedFeed};

// ---------------------------------------------------------------------------
// FeedError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Request(String),

    #[error("feed request answered with HTTP {0}")]
    Status(u16),

    #[error("feed stream broke: {0}")]
    Stream(String),
}

/// Called after every chunk that changed the feed (e.g. to request an egui
/// repaint).
pub type FeedNotify = Arc<dyn Fn() + Send + Sync>;

// ---------------------------------------------------------------------------
// FeedReader
// ---------------------------------------------------------------------------

pub struct FeedReader {
    feed: SharedFeed,
    notify: Option<FeedNotify>,
    /// Chat page to preload the backlog from.
    history: Option<String>,
}

impl FeedReader {
    pub fn new(feed: SharedFeed) -> Self {
        Self {
            feed,
            notify: None,
            history: None,
        }
    }

    pub fn with_history(mut self, chat_url: impl Into<String>) -> Self {
        self.history = Some(chat_url.into());
        self
    }

    pub fn with_notify(mut self, notify: FeedNotify) -> Self {
        self.notify = Some(notify);
        self
    }

    /// Open `url` and render its body until it ends.
    ///
    /// Failures are logged and end the reader; they are never retried.
    pub async fn run(&self, client: &reqwest::Client, url: &str) {
        log::info!("feed: opening {url}");
        match self.stream_from(client, url).await {
            Ok(fragments) => {
                log::info!("feed: stream closed by server after {fragments} fragment(s)");
            }
            Err(e) => log::error!("feed: {e}"),
        }
    }

    async fn stream_from(&self, client: &reqwest::Client, url: &str) -> Result<usize, FeedError> {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        // Chunks arriving meanwhile wait in the response body.
        if let Some(history) = &self.history {
            match fetch_history(client, history).await {
                Ok(entries) => self.preload(entries),
                Err(e) => log::warn!("feed: history preload failed: {e}"),
            }
        }

        self.pump(response.bytes_stream()).await
    }

    /// Append backlog entries ahead of the live fragments.
    pub fn preload(&self, entries: Vec<FeedEntry>) {
        let count = entries.len();
        self.lock_feed().append(entries);
        log::info!("feed: preloaded {count} message(s)");
        if let Some(notify) = &self.notify {
            notify();
        }
    }

    /// Drive `stream` to completion, one chunk at a time.
    ///
    /// Returns the number of fragments appended when the stream ends, or the
    /// first chunk error.
    pub async fn pump<S, B, E>(&self, stream: S) -> Result<usize, FeedError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        futures_util::pin_mut!(stream);
        let mut fragments = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FeedError::Stream(e.to_string()))?;
            if self.apply_chunk(chunk.as_ref()) {
                fragments += 1;
            }
        }

        Ok(fragments)
    }

    /// Render one raw chunk.  Returns whether it carried a fragment.
    pub fn apply_chunk(&self, bytes: &[u8]) -> bool {
        let text = String::from_utf8_lossy(bytes);
        let appended = !text.trim().is_empty();

        let evicted = {
            let mut feed = self.lock_feed();
            if appended {
                feed.append(parse_fragment(&text))
            } else {
                feed.trim()
            }
        };

        if appended {
            log::debug!("feed: fragment of {} bytes, {evicted} evicted", bytes.len());
            if let Some(notify) = &self.notify {
                notify();
            }
        }
        appended
    }

    /// The feed only ever holds whole entries, so a poisoned lock is still
    /// safe to use.
    fn lock_feed(&self) -> MutexGuard<'_, FeedQueue> {
        match self.feed.lock() {
            Ok(feed) => feed,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
