//! Streaming controller: owns the capture session and uploads its chunks.
//!
//! [`RecorderController::run`] is a single tokio task that multiplexes
//! three inputs:
//!
//! ```text
//! RecorderCommand::Toggle ─┐
//! CaptureSession chunk ────┼─▶ select! ─▶ start / stop / upload chunk
//! chunk upload failure ────┘
//! ```
//!
//! Each chunk is uploaded from its own spawned task; the controller never
//! waits on the network.  A failed upload reports back tagged with the
//! session generation that produced it, so a late failure from an older
//! session cannot stop a newer one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::audio::EncodedChunk;
use crate::chat::{ChatForm, Uploader};
use crate::config::AudioConfig;

use super::microphone::{CaptureSession, Microphone};
use super::state::{RecorderCommand, RecorderHandle, RecorderState};

const COMMAND_QUEUE: usize = 16;

struct ActiveSession {
    generation: u64,
    capture: Box<dyn CaptureSession>,
}

/// Start/stop state machine for live audio streaming.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tokio::sync::watch;
/// use webchat_client::chat::HttpUploader;
/// use webchat_client::config::AppConfig;
/// use webchat_client::recorder::{CpalMicrophone, RecorderController};
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let (_nick_tx, nick_rx) = watch::channel(config.chat.default_nick.clone());
/// let (controller, handle) = RecorderController::new(
///     Arc::new(CpalMicrophone::new(config.audio.sample_rate)),
///     Arc::new(HttpUploader::from_config(&config.server)),
///     &config.audio,
///     nick_rx,
/// );
/// tokio::spawn(controller.run());
/// handle.toggle();
/// # }
/// ```
pub struct RecorderController {
    microphone: Arc<dyn Microphone>,
    uploader: Arc<dyn Uploader>,
    interval: Duration,
    max_chunk_bytes: usize,
    nick: watch::Receiver<String>,
    state_tx: watch::Sender<RecorderState>,
    commands: mpsc::Receiver<RecorderCommand>,
    failure_tx: mpsc::UnboundedSender<u64>,
    failure_rx: mpsc::UnboundedReceiver<u64>,
    session: Option<ActiveSession>,
    generation: u64,
}

impl RecorderController {
    /// Build a controller and the handle that drives it.
    ///
    /// `nick` is read again for every chunk, so a rename mid-stream applies
    /// to the next upload.
    pub fn new(
        microphone: Arc<dyn Microphone>,
        uploader: Arc<dyn Uploader>,
        audio: &AudioConfig,
        nick: watch::Receiver<String>,
    ) -> (Self, RecorderHandle) {
        let (cmd_tx, commands) = mpsc::channel(COMMAND_QUEUE);
        let (state_tx, state_rx) = watch::channel(RecorderState::Idle);
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();

        let controller = Self {
            microphone,
            uploader,
            interval: Duration::from_millis(audio.chunk_interval_ms),
            max_chunk_bytes: audio.max_chunk_bytes,
            nick,
            state_tx,
            commands,
            failure_tx,
            failure_rx,
            session: None,
            generation: 0,
        };
        (controller, RecorderHandle::new(cmd_tx, state_rx))
    }

    /// Run until every [`RecorderHandle`] is dropped.
    ///
    /// An open session is stopped (and its last chunk uploaded) on the way
    /// out.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(RecorderCommand::Toggle) => self.toggle().await,
                    None => break,
                },
                chunk = next_chunk(&mut self.session) => match chunk {
                    Some(chunk) => self.upload_chunk(chunk),
                    None => {
                        log::warn!("recorder: capture ended unexpectedly");
                        self.stop().await;
                    }
                },
                Some(generation) = self.failure_rx.recv() => {
                    self.handle_failure(generation).await;
                }
            }
        }

        self.stop().await;
        log::info!("recorder: command channel closed, controller shutting down");
    }

    fn state(&self) -> RecorderState {
        if self.session.is_some() {
            RecorderState::Streaming
        } else {
            RecorderState::Idle
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state());
    }

    async fn toggle(&mut self) {
        match self.state() {
            RecorderState::Idle => self.start().await,
            RecorderState::Streaming => self.stop().await,
        }
    }

    async fn start(&mut self) {
        match self.microphone.open(self.interval).await {
            Ok(capture) => {
                self.generation += 1;
                self.session = Some(ActiveSession {
                    generation: self.generation,
                    capture,
                });
                log::info!("recorder: streaming (session {})", self.generation);
                self.publish();
            }
            Err(e) => log::error!("recorder: {e}"),
        }
    }

    /// Flush the encoder, release the device, then go Idle.
    async fn stop(&mut self) {
        let Some(mut active) = self.session.take() else {
            return;
        };
        let remaining = active.capture.stop().await;
        let generation = active.generation;
        drop(active);

        for chunk in remaining {
            self.send_chunk(chunk, generation);
        }
        log::info!("recorder: stopped (session {generation})");
        self.publish();
    }

    async fn handle_failure(&mut self, generation: u64) {
        let current = self.session.as_ref().map(|active| active.generation);
        if current == Some(generation) {
            log::warn!("recorder: stopping after failed chunk upload");
            self.stop().await;
        } else {
            log::debug!("recorder: ignoring upload failure from session {generation}");
        }
    }

    fn upload_chunk(&self, chunk: EncodedChunk) {
        if let Some(active) = &self.session {
            self.send_chunk(chunk, active.generation);
        }
    }

    /// Fire-and-forget upload of one chunk.  Empty chunks are skipped.
    fn send_chunk(&self, chunk: EncodedChunk, generation: u64) {
        if chunk.is_empty() {
            log::debug!("recorder: skipping empty chunk");
            return;
        }
        if chunk.size() > self.max_chunk_bytes {
            log::warn!(
                "recorder: chunk of {} bytes exceeds the {} byte server limit",
                chunk.size(),
                self.max_chunk_bytes
            );
        }

        let form = ChatForm::stream_chunk(&self.nick.borrow(), chunk);
        let uploader = Arc::clone(&self.uploader);
        let failures = self.failure_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = uploader.send(form).await {
                log::error!("recorder: chunk upload failed: {e}");
                let _ = failures.send(generation);
            }
        });
    }
}

/// Next chunk of the open session; pending forever while idle.
async fn next_chunk(session: &mut Option<ActiveSession>) -> Option<EncodedChunk> {
    match session {
        Some(active) => active.capture.next_chunk().await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::form::{FIELD_MESSAGE, FIELD_NICK};
    use crate::chat::{MockUploader, UploadError};
    use crate::recorder::MockMicrophone;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    const WAIT: Duration = Duration::from_secs(2);

    fn chunk(byte: u8) -> EncodedChunk {
        EncodedChunk { data: vec![byte; 8] }
    }

    async fn eventually(cond: impl Fn() -> bool) {
        tokio::time::timeout(WAIT, async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn wait_state(handle: &RecorderHandle, want: RecorderState) {
        let mut rx = handle.subscribe();
        tokio::time::timeout(WAIT, rx.wait_for(|s| *s == want))
            .await
            .expect("state not reached in time")
            .expect("controller gone");
    }

    struct Harness {
        mic: Arc<MockMicrophone>,
        handle: RecorderHandle,
        nick_tx: watch::Sender<String>,
    }

    fn spawn_controller(mic: MockMicrophone, uploader: Arc<dyn Uploader>) -> Harness {
        let mic = Arc::new(mic);
        let (nick_tx, nick_rx) = watch::channel("Anonymous".to_string());
        let (controller, handle) = RecorderController::new(
            Arc::clone(&mic) as Arc<dyn Microphone>,
            uploader,
            &AudioConfig::default(),
            nick_rx,
        );
        tokio::spawn(controller.run());
        Harness {
            mic,
            handle,
            nick_tx,
        }
    }

    #[tokio::test]
    async fn toggling_twice_restores_idle_and_label() {
        let h = spawn_controller(MockMicrophone::granted(), Arc::new(MockUploader::ok()));
        let before = h.handle.label();

        h.handle.toggle();
        wait_state(&h.handle, RecorderState::Streaming).await;
        assert_eq!(h.handle.label(), "Stop streaming");
        assert_eq!(h.mic.live_sessions(), 1);

        h.handle.toggle();
        wait_state(&h.handle, RecorderState::Idle).await;
        assert_eq!(h.handle.label(), before);
        assert_eq!(h.mic.live_sessions(), 0);
    }

    #[tokio::test]
    async fn chunks_are_uploaded_as_stream_posts_with_current_nick() {
        let uploader = Arc::new(MockUploader::ok());
        let h = spawn_controller(MockMicrophone::granted(), uploader.clone());

        h.handle.toggle();
        wait_state(&h.handle, RecorderState::Streaming).await;

        assert!(h.mic.emit(chunk(1)));
        eventually(|| uploader.sent().len() == 1).await;
        h.nick_tx.send_replace("alice".into());
        assert!(h.mic.emit(chunk(2)));
        eventually(|| uploader.sent().len() == 2).await;

        let sent = uploader.sent();
        assert!(sent.iter().all(ChatForm::is_stream));
        let nicks: Vec<_> = sent
            .iter()
            .map(|f| f.get(FIELD_NICK).and_then(|v| v.as_text()).unwrap_or_default().to_string())
            .collect();
        assert_eq!(nicks, ["Anonymous", "alice"]);
        assert_eq!(
            sent[0].get(FIELD_MESSAGE).and_then(|v| v.as_bytes()),
            Some(&[1u8; 8][..])
        );
    }

    #[tokio::test]
    async fn empty_chunks_are_not_uploaded() {
        let uploader = Arc::new(MockUploader::ok());
        let h = spawn_controller(MockMicrophone::granted(), uploader.clone());

        h.handle.toggle();
        wait_state(&h.handle, RecorderState::Streaming).await;
        assert!(h.mic.emit(EncodedChunk::empty()));
        assert!(h.mic.emit(chunk(3)));

        eventually(|| uploader.sent().len() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(uploader.sent().len(), 1);
    }

    #[tokio::test]
    async fn final_chunk_is_uploaded_after_stop() {
        let uploader = Arc::new(MockUploader::ok());
        let mic = MockMicrophone::granted();
        mic.set_final_chunk(chunk(9));
        let h = spawn_controller(mic, uploader.clone());

        h.handle.toggle();
        wait_state(&h.handle, RecorderState::Streaming).await;
        h.handle.toggle();
        wait_state(&h.handle, RecorderState::Idle).await;

        eventually(|| uploader.sent().len() == 1).await;
        assert_eq!(
            uploader.sent()[0].get(FIELD_MESSAGE).and_then(|v| v.as_bytes()),
            Some(&[9u8; 8][..])
        );
    }

    #[tokio::test]
    async fn failed_upload_forces_idle_and_releases_mic() {
        let uploader = Arc::new(MockUploader::failing());
        let h = spawn_controller(MockMicrophone::granted(), uploader.clone());

        h.handle.toggle();
        wait_state(&h.handle, RecorderState::Streaming).await;
        assert!(h.mic.emit(chunk(4)));

        wait_state(&h.handle, RecorderState::Idle).await;
        assert_eq!(h.handle.label(), "Start streaming");
        assert_eq!(h.mic.live_sessions(), 0);
    }

    #[tokio::test]
    async fn denied_microphone_stays_idle() {
        let h = spawn_controller(MockMicrophone::denied(), Arc::new(MockUploader::ok()));

        h.handle.toggle();
        eventually(|| h.mic.opens() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.handle.state(), RecorderState::Idle);
        assert_eq!(h.mic.live_sessions(), 0);
    }

    #[tokio::test]
    async fn capture_ending_on_its_own_goes_idle() {
        let h = spawn_controller(MockMicrophone::granted(), Arc::new(MockUploader::ok()));

        h.handle.toggle();
        wait_state(&h.handle, RecorderState::Streaming).await;
        h.mic.unplug();

        wait_state(&h.handle, RecorderState::Idle).await;
        assert_eq!(h.mic.live_sessions(), 0);
    }

    /// Fails every upload, but only once a permit is released.
    struct GatedFailingUploader {
        gate: Semaphore,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl Uploader for GatedFailingUploader {
        async fn send(&self, _form: ChatForm) -> Result<(), UploadError> {
            let permit = self.gate.acquire().await;
            drop(permit);
            self.finished.fetch_add(1, Ordering::SeqCst);
            Err(UploadError::Request("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn late_failure_from_previous_session_is_ignored() {
        let uploader = Arc::new(GatedFailingUploader {
            gate: Semaphore::new(0),
            finished: AtomicUsize::new(0),
        });
        let h = spawn_controller(MockMicrophone::granted(), uploader.clone());

        h.handle.toggle();
        wait_state(&h.handle, RecorderState::Streaming).await;
        assert!(h.mic.emit(chunk(5)));
        // Give the controller time to spawn the (blocked) upload.
        tokio::time::sleep(Duration::from_millis(20)).await;

        h.handle.toggle();
        wait_state(&h.handle, RecorderState::Idle).await;
        h.handle.toggle();
        wait_state(&h.handle, RecorderState::Streaming).await;

        uploader.gate.add_permits(1);
        eventually(|| uploader.finished.load(Ordering::SeqCst) == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(h.handle.state(), RecorderState::Streaming);
        assert_eq!(h.mic.live_sessions(), 1);
    }

    /// Holds each upload until the test releases its chunk byte.
    struct PerChunkGate {
        gates: std::collections::HashMap<u8, Semaphore>,
        started: std::sync::Mutex<Vec<u8>>,
        completed: std::sync::Mutex<Vec<u8>>,
    }

    impl PerChunkGate {
        fn new(bytes: &[u8]) -> Self {
            Self {
                gates: bytes.iter().map(|&b| (b, Semaphore::new(0))).collect(),
                started: Default::default(),
                completed: Default::default(),
            }
        }

        fn release(&self, byte: u8) {
            self.gates[&byte].add_permits(1);
        }

        fn started(&self) -> Vec<u8> {
            self.started.lock().unwrap().clone()
        }

        fn completed(&self) -> Vec<u8> {
            self.completed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Uploader for PerChunkGate {
        async fn send(&self, form: ChatForm) -> Result<(), UploadError> {
            let byte = form
                .get(FIELD_MESSAGE)
                .and_then(|v| v.as_bytes())
                .and_then(|b| b.first().copied())
                .unwrap_or_default();
            self.started.lock().unwrap().push(byte);
            if let Some(gate) = self.gates.get(&byte) {
                let _permit = gate.acquire().await;
            }
            self.completed.lock().unwrap().push(byte);
            Ok(())
        }
    }

    #[tokio::test]
    async fn next_chunk_is_sent_while_previous_upload_is_pending() {
        let uploader = Arc::new(PerChunkGate::new(&[1, 2]));
        let h = spawn_controller(MockMicrophone::granted(), uploader.clone());

        h.handle.toggle();
        wait_state(&h.handle, RecorderState::Streaming).await;
        assert!(h.mic.emit(chunk(1)));
        eventually(|| uploader.started() == [1u8]).await;
        assert!(h.mic.emit(chunk(2)));
        eventually(|| uploader.started() == [1u8, 2]).await;
        assert!(uploader.completed().is_empty());

        // Completion order is whatever the network makes it.
        uploader.release(2);
        eventually(|| uploader.completed() == [2u8]).await;
        uploader.release(1);
        eventually(|| uploader.completed() == [2u8, 1]).await;

        assert_eq!(h.handle.state(), RecorderState::Streaming);
        assert_eq!(h.mic.live_sessions(), 1);
    }

    #[tokio::test]
    async fn dropping_handles_stops_open_session() {
        let h = spawn_controller(MockMicrophone::granted(), Arc::new(MockUploader::ok()));
        h.handle.toggle();
        wait_state(&h.handle, RecorderState::Streaming).await;

        let mic = Arc::clone(&h.mic);
        drop(h);
        eventually(|| mic.live_sessions() == 0).await;
    }
}
