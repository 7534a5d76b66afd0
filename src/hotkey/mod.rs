//! Global hotkey that toggles audio streaming, backed by `rdev`.
//!
//! Only [`HotkeyEvent`] is always available; the listener and key parsing
//! are behind the default `hotkey` cargo feature.
//!
//! `rdev::listen()` blocks forever, so [`HotkeyListener`] runs it on its own
//! OS thread and forwards [`HotkeyEvent`]s over a tokio channel.  Holding the
//! key down produces a single toggle: OS auto-repeat presses are swallowed by
//! [`KeyLatch`] until the key is released.
//!
//! ```no_run
//! use tokio::sync::mpsc;
//! use webchat_client::hotkey::{parse_key, HotkeyListener};
//!
//! let (tx, mut rx) = mpsc::channel(16);
//! let key = parse_key("F9").expect("unknown key");
//! let _listener = HotkeyListener::start(key, tx).expect("hotkey thread");
//! // while let Some(ev) = rx.recv().await { recorder.toggle() }
//! ```

#[cfg(feature = "hotkey")]
mod keys;
#[cfg(feature = "hotkey")]
pub mod listener;

#[cfg(feature = "hotkey")]
pub use keys::{parse_key, KeyLatch};
#[cfg(feature = "hotkey")]
pub use listener::HotkeyListener;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The streaming key went down.
    ToggleStreaming,
}
