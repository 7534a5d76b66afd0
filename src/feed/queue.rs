//! Bounded, FIFO-evicting list of rendered feed entries.
//!
//! [`FeedQueue`] is the data behind the message list.  Appending never
//! leaves more than `capacity` entries behind: the oldest ones are evicted
//! first, in insertion order.
//!
//! The cap counts entries, whatever produced them.  Stray text outside a
//! `<div>` and each piece of a `<div>` split across two network chunks take
//! one slot each, so a browser counting only element children can keep a
//! few more messages on screen than this list does.
//!
//! ```rust
//! use webchat_client::feed::{FeedEntry, FeedQueue};
//!
//! let mut feed = FeedQueue::new(2);
//! feed.append([FeedEntry::raw("a"), FeedEntry::raw("b"), FeedEntry::raw("c")]);
//! let texts: Vec<_> = feed.iter().map(|e| e.body.to_string()).collect();
//! assert_eq!(texts, ["b", "c"]);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::markup::FeedEntry;

// ---------------------------------------------------------------------------
// FeedQueue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FeedQueue {
    entries: VecDeque<FeedEntry>,
    capacity: usize,
    /// Number of entries ever appended, evicted ones included.
    appended: u64,
}

impl FeedQueue {
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "FeedQueue capacity must be > 0");
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
            appended: 0,
        }
    }

    /// Append `entries` at the end, then evict from the front down to
    /// `capacity`.  Returns the number of evicted entries.
    ///
    /// Trimming happens after the whole batch is appended, so a single batch
    /// larger than `capacity` keeps only its own last `capacity` entries.
    pub fn append(&mut self, entries: impl IntoIterator<Item = FeedEntry>) -> usize {
        for entry in entries {
            self.entries.push_back(entry);
            self.appended += 1;
        }
        self.trim()
    }

    /// Evict the oldest entries until at most `capacity` remain.
    pub fn trim(&mut self) -> usize {
        let excess = self.entries.len().saturating_sub(self.capacity);
        self.entries.drain(..excess);
        excess
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeedEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total entries appended since creation (evicted ones included).
    pub fn appended(&self) -> u64 {
        self.appended
    }
}

// ---------------------------------------------------------------------------
// SharedFeed
// ---------------------------------------------------------------------------

/// Feed shared between the reader task (writer) and the UI (reader).
///
/// Lock for a short critical section only; never hold it across `.await`.
pub type SharedFeed = Arc<Mutex<FeedQueue>>;

pub fn new_shared_feed(capacity: usize) -> SharedFeed {
    Arc::new(Mutex::new(FeedQueue::new(capacity)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
