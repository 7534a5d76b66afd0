//! Outbound chat payloads.
//!
//! Every request to the `chat` endpoint is a multipart form made of ordered
//! named fields.  [`ChatForm`] holds those fields independently of the HTTP
//! client so that the composer and the recorder can be tested without a
//! network.
//!
//! | Payload       | Fields                                            |
//! |---------------|---------------------------------------------------|
//! | text message  | `nick`, `message`                                 |
//! | stream chunk  | `stream` (empty flag), `nick`, `message` (binary) |
//! | file upload   | `nick`, `file` (binary, with file name)           |

use crate::audio::{EncodedChunk, CHUNK_FILE_NAME, CHUNK_MIME};

pub const FIELD_NICK: &str = "nick";
pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_STREAM: &str = "stream";
pub const FIELD_FILE: &str = "file";

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// Value of one form field: plain text or a named binary part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Binary {
        file_name: String,
        mime: String,
        data: Vec<u8>,
    },
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Binary { .. } => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Text(_) => None,
            FieldValue::Binary { data, .. } => Some(data),
        }
    }
}

// ---------------------------------------------------------------------------
// ChatForm
// ---------------------------------------------------------------------------

/// An ordered set of form fields destined for the `chat` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatForm {
    fields: Vec<(String, FieldValue)>,
}

impl ChatForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), FieldValue::Text(value.into())));
        self
    }

    /// Append a binary field.
    pub fn binary(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.fields.push((
            name.into(),
            FieldValue::Binary {
                file_name: file_name.into(),
                mime: mime.into(),
                data,
            },
        ));
        self
    }

    /// A typed chat message.
    pub fn text_message(nick: &str, message: &str) -> Self {
        Self::new()
            .text(FIELD_NICK, nick)
            .text(FIELD_MESSAGE, message)
    }

    /// One recorded audio chunk.
    ///
    /// The empty `stream` field marks the request as a chunk; the audio
    /// bytes travel in the `message` field.
    pub fn stream_chunk(nick: &str, chunk: EncodedChunk) -> Self {
        Self::new()
            .text(FIELD_STREAM, "")
            .text(FIELD_NICK, nick)
            .binary(FIELD_MESSAGE, CHUNK_FILE_NAME, CHUNK_MIME, chunk.data)
    }

    /// A file shared into the chat.
    pub fn file_upload(nick: &str, file_name: &str, data: Vec<u8>) -> Self {
        Self::new().text(FIELD_NICK, nick).binary(
            FIELD_FILE,
            file_name,
            "application/octet-stream",
            data,
        )
    }

    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    /// First field called `name`, if any.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Whether this form carries an audio stream chunk.
    pub fn is_stream(&self) -> bool {
        self.get(FIELD_STREAM).is_some()
    }

    /// Build the `reqwest` multipart body, preserving field order.
    pub fn into_multipart(self) -> Result<reqwest::multipart::Form, reqwest::Error> {
        use reqwest::multipart::{Form, Part};

        let mut form = Form::new();
        for (name, value) in self.fields {
            form = match value {
                FieldValue::Text(text) => form.text(name, text),
                FieldValue::Binary {
                    file_name,
                    mime,
                    data,
                } => {
                    let part = Part::bytes(data).file_name(file_name).mime_str(&mime)?;
                    form.part(name, part)
                }
            };
        }
        Ok(form)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn names(form: &ChatForm) -> Vec<&str> {
        form.fields().iter().map(|(n, _)| n.as_str()).collect()
    }

    #[test]
    fn text_message_fields() {
        let form = ChatForm::text_message("alice", "hi");
        assert_eq!(names(&form), ["nick", "message"]);
        assert_eq!(form.get("nick").and_then(FieldValue::as_text), Some("alice"));
        assert_eq!(form.get("message").and_then(FieldValue::as_text), Some("hi"));
        assert!(!form.is_stream());
    }

    #[test]
    fn stream_chunk_reuses_message_field_for_audio() {
        let chunk = EncodedChunk {
            data: vec![1, 2, 3],
        };
        let form = ChatForm::stream_chunk("bob", chunk);

        assert_eq!(names(&form), ["stream", "nick", "message"]);
        assert!(form.is_stream());
        assert_eq!(form.get("stream").and_then(FieldValue::as_text), Some(""));
        assert_eq!(
            form.get("message").and_then(FieldValue::as_bytes),
            Some(&[1u8, 2, 3][..])
        );
    }

    #[test]
    fn file_upload_keeps_file_name() {
        let form = ChatForm::file_upload("carol", "notes.txt", b"hello".to_vec());
        match form.get("file") {
            Some(FieldValue::Binary { file_name, data, .. }) => {
                assert_eq!(file_name, "notes.txt");
                assert_eq!(data, b"hello");
            }
            other => panic!("unexpected file field: {other:?}"),
        }
    }

    #[test]
    fn into_multipart_accepts_all_payloads() {
        let chunk = EncodedChunk { data: vec![0; 16] };
        assert!(ChatForm::text_message("a", "b").into_multipart().is_ok());
        assert!(ChatForm::stream_chunk("a", chunk).into_multipart().is_ok());
        assert!(ChatForm::file_upload("a", "x.bin", vec![9]).into_multipart().is_ok());
    }

    #[test]
    fn into_multipart_rejects_bad_mime() {
        let form = ChatForm::new().binary("file", "x", "not a mime", vec![1]);
        assert!(form.into_multipart().is_err());
    }
}
