//! Parsing of feed fragments into entries.
//!
//! The server flushes one line of markup per message:
//!
//! ```text
//! <div>12:34 <b>alice</b>: hello &amp; welcome</div>
//! <div>12:35 <b>bob</b>: <a href="uploads/cat.png">cat.png</a></div>
//! <div>12:36 <b>carol</b>: <audio controls="" preload="none" src="stream?carol"></audio></div>
//! ```
//!
//! Every top-level `<div>` becomes one [`FeedEntry`].  Non-blank text outside
//! any `<div>` becomes a single raw entry.  Fragments are parsed on their
//! own; a `<div>` split across two network chunks yields two raw entries.

use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static DIV: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<div\b[^>]*>(.*?)</div\s*>").unwrap());

static MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*(\d{1,2}:\d{2})\s+<b>(.*?)</b>:\s?(.*?)\s*$").unwrap()
});

static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)^<a\s+href="([^"]*)"\s*>(.*?)</a>$"#).unwrap());

static AUDIO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)^<audio\b[^>]*\bsrc="([^"]*)"[^>]*>"#).unwrap());

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|amp|lt|gt|quot|apos);").unwrap());

// ---------------------------------------------------------------------------
// FeedEntry
// ---------------------------------------------------------------------------

/// What a feed entry carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryBody {
    /// A typed message.
    Text(String),
    /// A shared file; `href` is relative to the chat page.
    Upload { name: String, href: String },
    /// A live audio stream; `src` is relative to the chat page.
    Audio { src: String },
    /// Markup that does not follow the message layout, reduced to text.
    Raw(String),
}

impl EntryBody {
    /// Link target carried by uploads and audio entries.
    pub fn link(&self) -> Option<&str> {
        match self {
            EntryBody::Upload { href, .. } => Some(href),
            EntryBody::Audio { src } => Some(src),
            EntryBody::Text(_) | EntryBody::Raw(_) => None,
        }
    }
}

impl fmt::Display for EntryBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryBody::Text(text) | EntryBody::Raw(text) => f.write_str(text),
            EntryBody::Upload { name, .. } => f.write_str(name),
            EntryBody::Audio { .. } => f.write_str("[audio stream]"),
        }
    }
}

/// One rendered line of the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// `HH:MM` as printed by the server.
    pub time: Option<String>,
    pub nick: Option<String>,
    pub body: EntryBody,
}

impl FeedEntry {
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            time: None,
            nick: None,
            body: EntryBody::Raw(text.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Split a decoded fragment into entries, in document order.
pub fn parse_fragment(fragment: &str) -> Vec<FeedEntry> {
    let mut entries = Vec::new();
    let mut last = 0;

    for caps in DIV.captures_iter(fragment) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        push_stray_text(&mut entries, &fragment[last..whole.start()]);
        entries.push(parse_message(&caps[1]));
        last = whole.end();
    }
    push_stray_text(&mut entries, &fragment[last..]);

    entries
}

fn push_stray_text(entries: &mut Vec<FeedEntry>, markup: &str) {
    let text = markup_to_text(markup);
    if !text.is_empty() {
        entries.push(FeedEntry::raw(text));
    }
}

/// Parse the inner markup of one message `<div>`.
fn parse_message(inner: &str) -> FeedEntry {
    let Some(caps) = MESSAGE.captures(inner) else {
        return FeedEntry::raw(markup_to_text(inner));
    };

    let body_markup = &caps[3];
    let body = if let Some(link) = LINK.captures(body_markup) {
        EntryBody::Upload {
            name: decode_entities(&link[2]),
            href: decode_entities(&link[1]),
        }
    } else if let Some(audio) = AUDIO.captures(body_markup) {
        EntryBody::Audio {
            src: decode_entities(&audio[1]),
        }
    } else {
        EntryBody::Text(markup_to_text(body_markup))
    };

    FeedEntry {
        time: Some(caps[1].to_string()),
        nick: Some(markup_to_text(&caps[2])),
        body,
    }
}

/// Drop tags, decode entities and trim.
pub fn markup_to_text(markup: &str) -> String {
    decode_entities(&TAG.replace_all(markup, "")).trim().to_string()
}

/// Decode the named and numeric character references the server emits.
///
/// ```
/// use webchat_client::feed::markup::decode_entities;
///
/// assert_eq!(decode_entities("a &lt;b&gt; &amp; &#39;c&#39;"), "a <b> & 'c'");
/// ```
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => numeric_reference(name),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn numeric_reference(name: &str) -> Option<char> {
    let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => name.strip_prefix('#')?.parse().ok()?,
    };
    char::from_u32(code)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
