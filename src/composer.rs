//! Form handling between the UI and the network.
//!
//! [`Composer`] validates what the user typed and hands it to the
//! [`Uploader`] or the recorder.  It never blocks the caller: uploads are
//! spawned on the runtime and their outcome is only logged.

use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::chat::{ChatForm, Uploader};
use crate::recorder::RecorderHandle;

/// Editable contents of the compose area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeForm {
    pub nick: String,
    pub message: String,
    /// Path of a local file to share.
    pub attachment: String,
}

impl ComposeForm {
    pub fn with_nick(nick: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A request was dispatched and the consumed field was cleared.
    Sent,
    /// Validation failed; nothing was sent and the form is untouched.
    Ignored,
}

pub struct Composer {
    uploader: Arc<dyn Uploader>,
    recorder: RecorderHandle,
    nick_tx: watch::Sender<String>,
    runtime: Handle,
}

impl Composer {
    /// `runtime` is where uploads are spawned; the egui thread is not inside
    /// it.
    pub fn new(
        uploader: Arc<dyn Uploader>,
        recorder: RecorderHandle,
        nick_tx: watch::Sender<String>,
        runtime: Handle,
    ) -> Self {
        Self {
            uploader,
            recorder,
            nick_tx,
            runtime,
        }
    }

    pub fn recorder(&self) -> &RecorderHandle {
        &self.recorder
    }

    /// Send a text message.
    ///
    /// Both fields must be non-empty as typed (whitespace counts).  On
    /// success the message is cleared before the request completes.
    pub fn submit(&self, form: &mut ComposeForm) -> SubmitOutcome {
        if form.nick.is_empty() || form.message.is_empty() {
            return SubmitOutcome::Ignored;
        }
        self.set_nick(&form.nick);

        let request = ChatForm::text_message(&form.nick, &form.message);
        form.message.clear();

        let uploader = Arc::clone(&self.uploader);
        self.runtime.spawn(async move {
            if let Err(e) = uploader.send(request).await {
                log::error!("composer: message not delivered: {e}");
            }
        });
        SubmitOutcome::Sent
    }

    /// Share the file named by `form.attachment`.
    ///
    /// The attachment field is cleared once the upload is dispatched; read
    /// and upload failures are only logged.
    pub fn upload_file(&self, form: &mut ComposeForm) -> SubmitOutcome {
        let path = form.attachment.trim();
        if form.nick.is_empty() || path.is_empty() {
            return SubmitOutcome::Ignored;
        }
        self.set_nick(&form.nick);

        let path = path.to_string();
        let nick = form.nick.clone();
        form.attachment.clear();

        let uploader = Arc::clone(&self.uploader);
        self.runtime.spawn(async move {
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) => {
                    log::error!("composer: cannot read {path}: {e}");
                    return;
                }
            };
            let file_name = Path::new(&path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.clone());

            log::info!("composer: uploading {file_name} ({} bytes)", data.len());
            if let Err(e) = uploader.send(ChatForm::file_upload(&nick, &file_name, data)).await {
                log::error!("composer: file {file_name} not delivered: {e}");
            }
        });
        SubmitOutcome::Sent
    }

    /// Start or stop streaming.
    pub fn toggle_streaming(&self) {
        self.recorder.toggle();
    }

    /// Publish the nick used for subsequent audio chunks.
    pub fn set_nick(&self, nick: &str) {
        self.nick_tx.send_if_modified(|current| {
            if current == nick {
                false
            } else {
                *current = nick.to_string();
                true
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
