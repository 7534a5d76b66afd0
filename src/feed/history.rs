//! One-shot preload of the messages already on the chat page.
//!
//! The `messages` stream only carries messages posted after it was opened.
//! The chat page itself lists the current backlog inside
//! `<div id="messages">`, so fetching it once at startup fills the feed
//! before live fragments start arriving.

use std::sync::LazyLock;

use regex::Regex;

use super::markup::{parse_fragment, FeedEntry};
use super::reader::FeedError;

static MESSAGES_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<div\s+id\s*=\s*"messages"\s*>(.*?)(?:<form\b|</body\s*>|\z)"#).unwrap()
});

/// Entries listed inside the page's `<div id="messages">`, in page order.
///
/// Returns an empty list when the page has no such container.
pub fn extract_history(page: &str) -> Vec<FeedEntry> {
    MESSAGES_BLOCK
        .captures(page)
        .map(|caps| parse_fragment(&caps[1]))
        .unwrap_or_default()
}

/// GET the chat page at `url` and extract its backlog.
pub async fn fetch_history(client: &reqwest::Client, url: &str) -> Result<Vec<FeedEntry>, FeedError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FeedError::Request(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FeedError::Status(status.as_u16()));
    }

    let page = response
        .text()
        .await
        .map_err(|e| FeedError::Stream(e.to_string()))?;
    Ok(extract_history(&page))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::EntryBody;

    const PAGE: &str = "<!DOCTYPE html>\n\
<html>\n\
  <head>\n\
    <title>Chat</title>\n\
  </head>\n\
  <body>\n\
    <div id=\"messages\">\n\
      <div>08:00 <b>alice</b>: morning</div>\n\
      <div>08:01 <b>bob</b>: <a href=\"files/a.txt\">a.txt</a></div>\n\
    </div>\n\
    <form id=\"chatInputForm\" method=\"post\" enctype=\"multipart/form-data\" >\n\
      <input type=\"text\" name=\"nick\" value=\"Anonymous\" />\n\
    </form>\n\
  </body>\n\
</html>\n";

    #[test]
    fn extracts_listed_messages() {
        let entries = extract_history(PAGE);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].nick.as_deref(), Some("alice"));
        assert_eq!(entries[0].body, EntryBody::Text("morning".into()));
        assert_eq!(
            entries[1].body,
            EntryBody::Upload {
                name: "a.txt".into(),
                href: "files/a.txt".into()
            }
        );
    }

    #[test]
    fn empty_container_yields_nothing() {
        let page = "<body><div id=\"messages\">\n    </div>\n<form></form></body>";
        assert!(extract_history(page).is_empty());
    }

    #[test]
    fn page_without_container_yields_nothing() {
        assert!(extract_history("<html><body>maintenance</body></html>").is_empty());
    }
}
