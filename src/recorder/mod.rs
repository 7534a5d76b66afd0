//! Live audio streaming.
//!
//! # Architecture
//!
//! ```text
//! RecorderHandle::toggle()  (UI button / hotkey / composer)
//!        │  mpsc
//!        ▼
//! RecorderController::run()  ← async tokio task
//!        │
//!        ├─ Idle      → Microphone::open  → Streaming
//!        ├─ Streaming → CaptureSession::stop, upload final chunk → Idle
//!        │
//!        └─ every chunk → tokio::spawn(Uploader::send(stream form))
//!                             └─ Err → failure(generation) → Idle
//!
//! watch::Receiver<RecorderState> ←─── read by egui update() each frame
//! ```

pub mod controller;
pub mod microphone;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use controller::RecorderController;
pub use microphone::{CaptureSession, CpalMicrophone, Microphone, RecorderError};
pub use state::{RecorderCommand, RecorderHandle, RecorderState};

#[cfg(test)]
pub use microphone::MockMicrophone;
