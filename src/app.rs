//! Chat window — egui/eframe application.
//!
//! [`ChatApp`] renders the shared feed and the compose area.  It owns no
//! network or audio state itself: every action goes through the
//! [`Composer`], and the feed is written by the background reader.
//!
//! | Area | Contents |
//! |------|----------|
//! | centre | feed entries, oldest first, stuck to the bottom |
//! | bottom | nick, message + Send, attachment + Upload, streaming toggle |

use std::time::Duration;

use eframe::egui;
use tokio::sync::mpsc;

use crate::composer::{ComposeForm, Composer, SubmitOutcome};
use crate::config::AppConfig;
use crate::feed::{EntryBody, FeedEntry, SharedFeed};
use crate::hotkey::HotkeyEvent;

/// Poll cadence for the hotkey channel and recorder state while idle.
const IDLE_REPAINT: Duration = Duration::from_millis(200);

const STREAMING_RED: egui::Color32 = egui::Color32::from_rgb(220, 60, 60);
const DIM: egui::Color32 = egui::Color32::from_rgb(130, 130, 130);

pub struct ChatApp {
    feed: SharedFeed,
    composer: Composer,
    form: ComposeForm,
    hotkey_rx: Option<mpsc::Receiver<HotkeyEvent>>,
    /// Page the server's relative links are relative to.
    chat_url: String,
    config: AppConfig,
}

impl ChatApp {
    pub fn new(
        feed: SharedFeed,
        composer: Composer,
        hotkey_rx: Option<mpsc::Receiver<HotkeyEvent>>,
        config: &AppConfig,
    ) -> Self {
        Self {
            feed,
            composer,
            form: ComposeForm::with_nick(config.chat.default_nick.clone()),
            hotkey_rx,
            chat_url: config.server.endpoint("chat"),
            config: config.clone(),
        }
    }

    /// Remember the last nick as the default for the next run.
    fn persist_nick(&mut self) {
        if self.form.nick.is_empty() || self.form.nick == self.config.chat.default_nick {
            return;
        }
        self.config.chat.default_nick = self.form.nick.clone();
        if let Err(e) = self.config.save() {
            log::warn!("could not save settings: {e}");
        }
    }

    fn poll_hotkey(&mut self) {
        let Some(rx) = self.hotkey_rx.as_mut() else {
            return;
        };
        while let Ok(event) = rx.try_recv() {
            match event {
                HotkeyEvent::ToggleStreaming => self.composer.toggle_streaming(),
            }
        }
    }

    fn snapshot(&self) -> Vec<FeedEntry> {
        match self.feed.lock() {
            Ok(feed) => feed.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    // ── Feed ─────────────────────────────────────────────────────────────

    fn draw_feed(&self, ui: &mut egui::Ui) {
        let entries = self.snapshot();
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                if entries.is_empty() {
                    ui.label(egui::RichText::new("No messages yet").color(DIM).italics());
                }
                for entry in &entries {
                    self.draw_entry(ui, entry);
                }
            });
    }

    fn draw_entry(&self, ui: &mut egui::Ui, entry: &FeedEntry) {
        ui.horizontal_wrapped(|ui| {
            if let Some(time) = &entry.time {
                ui.label(egui::RichText::new(time).color(DIM).monospace());
            }
            if let Some(nick) = &entry.nick {
                ui.label(egui::RichText::new(format!("{nick}:")).strong());
            }
            match &entry.body {
                EntryBody::Text(text) => {
                    ui.label(text.as_str());
                }
                EntryBody::Raw(text) => {
                    ui.label(egui::RichText::new(text).color(DIM));
                }
                body @ (EntryBody::Upload { .. } | EntryBody::Audio { .. }) => {
                    let href = body.link().unwrap_or_default();
                    ui.hyperlink_to(body.to_string(), resolve_link(&self.chat_url, href));
                }
            }
        });
    }

    // ── Compose area ─────────────────────────────────────────────────────

    fn draw_compose(&mut self, ui: &mut egui::Ui) {
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            ui.label("Nick");
            let resp = ui.add(egui::TextEdit::singleline(&mut self.form.nick).desired_width(140.0));
            if resp.changed() {
                self.composer.set_nick(&self.form.nick);
            }
        });

        ui.horizontal(|ui| {
            let send_width = 60.0;
            let resp = ui.add(
                egui::TextEdit::singleline(&mut self.form.message)
                    .hint_text("Message")
                    .desired_width(ui.available_width() - send_width),
            );
            let entered = resp.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            let clicked = ui.button("Send").clicked();
            if (entered || clicked) && self.composer.submit(&mut self.form) == SubmitOutcome::Sent {
                resp.request_focus();
            }
        });

        ui.horizontal(|ui| {
            let upload_width = 70.0;
            ui.add(
                egui::TextEdit::singleline(&mut self.form.attachment)
                    .hint_text("File path")
                    .desired_width(ui.available_width() - upload_width),
            );
            if ui.button("Upload").clicked() {
                self.composer.upload_file(&mut self.form);
            }
        });

        ui.add_space(2.0);
        let recorder = self.composer.recorder();
        let streaming = recorder.state().is_streaming();
        ui.horizontal(|ui| {
            let caption = egui::RichText::new(recorder.label());
            let caption = if streaming {
                caption.color(STREAMING_RED)
            } else {
                caption
            };
            if ui.button(caption).clicked() {
                self.composer.toggle_streaming();
            }
            if streaming {
                ui.label(egui::RichText::new("● live").color(STREAMING_RED));
            }
        });
        ui.add_space(4.0);
    }
}

/// Absolute URL for a link found in the feed.
///
/// Relative links resolve against the chat page, like a browser would.
pub fn resolve_link(chat_url: &str, href: &str) -> String {
    reqwest::Url::parse(chat_url)
        .and_then(|base| base.join(href))
        .map(String::from)
        .unwrap_or_else(|_| href.to_string())
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_hotkey();

        // The feed reader requests repaints itself; this keeps the hotkey
        // and recorder label fresh.
        ctx.request_repaint_after(IDLE_REPAINT);

        egui::TopBottomPanel::bottom("compose").show(ctx, |ui| self.draw_compose(ui));
        egui::CentralPanel::default().show(ctx, |ui| self.draw_feed(ui));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        log::info!("chat window closing");
        self.persist_nick();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
