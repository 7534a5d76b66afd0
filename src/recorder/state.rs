//! Recorder state and the handle the UI holds.
//!
//! [`RecorderState`] is published by the controller through a
//! `tokio::sync::watch` channel.  [`RecorderHandle`] is the cheap, clonable
//! front the UI, the composer and the hotkey listener use: it reads the
//! current state and queues toggle requests.

use tokio::sync::{mpsc, watch};

// ---------------------------------------------------------------------------
// RecorderState
// ---------------------------------------------------------------------------

/// States of the live-streaming recorder.
///
/// ```text
/// Idle ──toggle + mic granted──▶ Streaming
///      ──toggle + mic denied───▶ Idle
/// Streaming ──toggle──────────────▶ Idle   (final chunk still uploaded)
///           ──chunk upload failed─▶ Idle
///           ──capture ended───────▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderState {
    #[default]
    Idle,
    /// A capture session is open and chunks are being uploaded.
    Streaming,
}

impl RecorderState {
    /// Caption for the streaming toggle button.
    ///
    /// ```
    /// use webchat_client::recorder::RecorderState;
    ///
    /// assert_eq!(RecorderState::Idle.label(), "Start streaming");
    /// assert_eq!(RecorderState::Streaming.label(), "Stop streaming");
    /// ```
    pub fn label(&self) -> &'static str {
        match self {
            RecorderState::Idle => "Start streaming",
            RecorderState::Streaming => "Stop streaming",
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, RecorderState::Streaming)
    }
}

// ---------------------------------------------------------------------------
// RecorderHandle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderCommand {
    Toggle,
}

/// UI-side view of the recorder.
#[derive(Clone)]
pub struct RecorderHandle {
    commands: mpsc::Sender<RecorderCommand>,
    state: watch::Receiver<RecorderState>,
}

impl RecorderHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<RecorderCommand>,
        state: watch::Receiver<RecorderState>,
    ) -> Self {
        Self { commands, state }
    }

    /// Queue a start/stop request.  Never blocks; safe from the egui thread.
    pub fn toggle(&self) {
        if let Err(e) = self.commands.try_send(RecorderCommand::Toggle) {
            log::warn!("recorder: toggle dropped: {e}");
        }
    }

    pub fn state(&self) -> RecorderState {
        *self.state.borrow()
    }

    pub fn label(&self) -> &'static str {
        self.state().label()
    }

    /// A fresh receiver for awaiting state changes.
    pub fn subscribe(&self) -> watch::Receiver<RecorderState> {
        self.state.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
