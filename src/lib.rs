//! Desktop client for a minimal multipart/chunked-HTTP chat service.
//!
//! The client posts text messages and files, streams microphone audio as
//! successive chunks of one Ogg/Opus stream, and follows the server's open-ended
//! `messages` response to render a bounded live feed.
//!
//! ```text
//! ChatApp (egui) ──▶ Composer ──▶ Uploader ──POST chat──▶ server
//!                        │
//!                        └──▶ RecorderHandle ──▶ RecorderController ──▶ Uploader
//!
//! server ──GET messages──▶ FeedReader ──▶ SharedFeed ──▶ ChatApp
//! ```

pub mod app;
pub mod audio;
pub mod chat;
pub mod composer;
pub mod config;
pub mod feed;
pub mod hotkey;
pub mod recorder;
