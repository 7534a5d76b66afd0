//! Microphone capability seen by the recorder.
//!
//! [`Microphone::open`] is the "ask for the mic" step; the returned
//! [`CaptureSession`] is a stream of [`EncodedChunk`]s that ends when the
//! session is stopped or the device goes away.  The controller only sees
//! these two traits, so the state machine does not depend on how chunks are
//! physically produced.
//!
//! [`CpalMicrophone`] is the production implementation: each session owns a
//! dedicated `audio-capture` thread that holds the cpal stream (cpal streams
//! are not `Send`) and runs the [`ChunkEncoder`].

use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc as std_mpsc, Arc,
};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::audio::{AudioCapture, CaptureError, ChunkEncoder, EncodeError, EncodedChunk};

/// How often the capture thread checks its stop flag while idle.
const STOP_POLL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// RecorderError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RecorderError {
    /// No device, access refused, or the device rejected the stream config.
    #[error("microphone unavailable: {0}")]
    Capture(#[from] CaptureError),

    /// The configured chunk format cannot be produced.
    #[error("audio encoder unavailable: {0}")]
    Encode(#[from] EncodeError),

    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("capture thread exited before the stream started")]
    Aborted,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A running capture.  Dropping it must release the device.
#[async_trait]
pub trait CaptureSession: Send {
    /// Next encoded chunk.  `None` means the capture ended on its own.
    ///
    /// Must be cancel-safe: the controller polls it inside `select!`.
    async fn next_chunk(&mut self) -> Option<EncodedChunk>;

    /// Stop capturing and return every chunk not yet delivered, including
    /// the final partial one.
    async fn stop(&mut self) -> Vec<EncodedChunk>;
}

/// Grants access to audio input.
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Start a capture producing one chunk per `interval` of audio.
    async fn open(&self, interval: Duration) -> Result<Box<dyn CaptureSession>, RecorderError>;
}

// ---------------------------------------------------------------------------
// CpalMicrophone
// ---------------------------------------------------------------------------

/// Default input device, encoded to mono Ogg/Opus chunks at `sample_rate`.
pub struct CpalMicrophone {
    sample_rate: u32,
}

impl CpalMicrophone {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

#[async_trait]
impl Microphone for CpalMicrophone {
    async fn open(&self, interval: Duration) -> Result<Box<dyn CaptureSession>, RecorderError> {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let sample_rate = self.sample_rate;
        let stop_flag = Arc::clone(&stop);
        std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || capture_thread(sample_rate, interval, stop_flag, ready_tx, chunk_tx))?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(Box::new(CpalSession {
                chunks: chunk_rx,
                stop,
            })),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RecorderError::Aborted),
        }
    }
}

/// Body of the per-session capture thread.
///
/// The cpal stream and the encoder live and die on this thread.  Every exit
/// path drops the [`StreamHandle`](crate::audio::StreamHandle) before
/// flushing the encoder.
fn capture_thread(
    sample_rate: u32,
    interval: Duration,
    stop: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<(), RecorderError>>,
    chunks: mpsc::UnboundedSender<EncodedChunk>,
) {
    let mut encoder = match ChunkEncoder::new(sample_rate, interval) {
        Ok(encoder) => encoder,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        }
    };

    let (buf_tx, buf_rx) = std_mpsc::channel();
    let started = AudioCapture::new().and_then(|capture| {
        let handle = capture.start(buf_tx)?;
        log::info!(
            "audio capture started ({} Hz, {} ch)",
            capture.sample_rate(),
            capture.channels()
        );
        Ok(handle)
    });

    let handle = match started {
        Ok(handle) => handle,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        // The opener gave up waiting; nobody will consume chunks.
        return;
    }

    let emit = |encoded: Vec<EncodedChunk>| {
        for chunk in encoded {
            let _ = chunks.send(chunk);
        }
    };

    while !stop.load(Ordering::Relaxed) {
        match buf_rx.recv_timeout(STOP_POLL) {
            Ok(buffer) => match encoder.push(&buffer) {
                Ok(encoded) => emit(encoded),
                Err(e) => {
                    log::error!("audio capture: {e}");
                    break;
                }
            },
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(handle);
    log::info!("audio capture stopped");

    // Buffers delivered before the stream stopped still belong to the
    // recording.
    while let Ok(buffer) = buf_rx.try_recv() {
        match encoder.push(&buffer) {
            Ok(encoded) => emit(encoded),
            Err(e) => log::error!("audio capture: {e}"),
        }
    }
    match encoder.finish() {
        Ok(last) => emit(vec![last]),
        Err(e) => log::error!("audio capture: {e}"),
    }
}

struct CpalSession {
    chunks: mpsc::UnboundedReceiver<EncodedChunk>,
    stop: Arc<AtomicBool>,
}

#[async_trait]
impl CaptureSession for CpalSession {
    async fn next_chunk(&mut self) -> Option<EncodedChunk> {
        self.chunks.recv().await
    }

    async fn stop(&mut self) -> Vec<EncodedChunk> {
        self.stop.store(true, Ordering::Relaxed);
        // The capture thread drops its sender once the final chunk is out.
        let mut rest = Vec::new();
        while let Some(chunk) = self.chunks.recv().await {
            rest.push(chunk);
        }
        rest
    }
}

impl Drop for CpalSession {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

/// Scriptable microphone: chunks are pushed by the test through
/// [`emit`](MockMicrophone::emit).
#[cfg(test)]
pub struct MockMicrophone {
    deny: AtomicBool,
    opens: std::sync::atomic::AtomicUsize,
    live: Arc<std::sync::atomic::AtomicUsize>,
    current: std::sync::Mutex<Option<mpsc::UnboundedSender<EncodedChunk>>>,
    final_chunk: std::sync::Mutex<EncodedChunk>,
}

#[cfg(test)]
impl MockMicrophone {
    pub fn granted() -> Self {
        Self {
            deny: AtomicBool::new(false),
            opens: Default::default(),
            live: Default::default(),
            current: std::sync::Mutex::new(None),
            final_chunk: std::sync::Mutex::new(EncodedChunk::empty()),
        }
    }

    pub fn denied() -> Self {
        let mic = Self::granted();
        mic.deny.store(true, Ordering::SeqCst);
        mic
    }

    /// Chunk returned by `stop()` as the flushed remainder.
    pub fn set_final_chunk(&self, chunk: EncodedChunk) {
        *self.final_chunk.lock().unwrap() = chunk;
    }

    /// Deliver `chunk` to the open session.  Returns `false` when no session
    /// is listening.
    pub fn emit(&self, chunk: EncodedChunk) -> bool {
        match self.current.lock().unwrap().as_ref() {
            Some(tx) => tx.send(chunk).is_ok(),
            None => false,
        }
    }

    /// Make the open session end as if the device disappeared.
    pub fn unplug(&self) {
        self.current.lock().unwrap().take();
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet dropped.
    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl Microphone for MockMicrophone {
    async fn open(&self, _interval: Duration) -> Result<Box<dyn CaptureSession>, RecorderError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.deny.load(Ordering::SeqCst) {
            return Err(RecorderError::Capture(CaptureError::NoDevice));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.current.lock().unwrap() = Some(tx);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            chunks: rx,
            final_chunk: self.final_chunk.lock().unwrap().clone(),
            live: Arc::clone(&self.live),
        }))
    }
}

#[cfg(test)]
struct MockSession {
    chunks: mpsc::UnboundedReceiver<EncodedChunk>,
    final_chunk: EncodedChunk,
    live: Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
#[async_trait]
impl CaptureSession for MockSession {
    async fn next_chunk(&mut self) -> Option<EncodedChunk> {
        self.chunks.recv().await
    }

    async fn stop(&mut self) -> Vec<EncodedChunk> {
        self.chunks.close();
        let mut rest = Vec::new();
        while let Ok(chunk) = self.chunks.try_recv() {
            rest.push(chunk);
        }
        rest.push(std::mem::replace(&mut self.final_chunk, EncodedChunk::empty()));
        rest
    }
}

#[cfg(test)]
impl Drop for MockSession {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
