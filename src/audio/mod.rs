//! Audio pipeline: microphone capture → downmix → resample → Opus → interval chunks.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → CaptureBuffer (mpsc) → ChunkEncoder
//!           → EncodedChunk (Ogg/Opus pages, one per interval)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::mpsc;
//! use std::time::Duration;
//! use webchat_client::audio::{AudioCapture, CaptureBuffer, ChunkEncoder};
//!
//! let (tx, rx) = mpsc::channel::<CaptureBuffer>();
//! let capture = AudioCapture::new().unwrap();
//! let _handle = capture.start(tx).unwrap(); // drop handle → stops stream
//!
//! let mut encoder = ChunkEncoder::new(16_000, Duration::from_millis(500)).unwrap();
//! while let Ok(buffer) = rx.recv() {
//!     for chunk in encoder.push(&buffer).unwrap() {
//!         println!("chunk of {} bytes", chunk.size());
//!     }
//! }
//! ```

pub mod capture;
pub mod encoder;
pub mod resample;

pub use capture::{AudioCapture, CaptureBuffer, CaptureError, StreamHandle};
pub use encoder::{ChunkEncoder, EncodeError, EncodedChunk, CHUNK_FILE_NAME, CHUNK_MIME, OPUS_FRAME};
pub use resample::{downmix_to_mono, FrameResampler, ResampleError};
