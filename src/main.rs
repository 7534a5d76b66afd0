//! Application entry point — web chat client.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Build the uploader, the nick channel and the recorder controller.
//! 5. Spawn the controller on the runtime.
//! 6. Spawn the hotkey listener thread (optional, `hotkey` feature).
//! 7. Run [`eframe::run_native`]; the feed task (the `messages` stream, with
//!    the history preload) is spawned once the egui context exists so it
//!    can request repaints.  Blocks until the window is closed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use eframe::egui;
use tokio::sync::{mpsc, watch};
use webchat_client::{
    app::ChatApp,
    chat::{HttpUploader, Uploader},
    composer::Composer,
    config::AppConfig,
    feed::{new_shared_feed, FeedReader, SharedFeed},
    hotkey::HotkeyEvent,
    recorder::{CpalMicrophone, RecorderController},
};

// ---------------------------------------------------------------------------
// Feed task
// ---------------------------------------------------------------------------

/// Follow the live stream until it ends, preloading the backlog first if
/// enabled.  Runs once; there is no reconnect.
async fn run_feed(feed: SharedFeed, config: AppConfig, ctx: egui::Context) {
    let client = match reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.server.timeout_secs))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            log::error!("feed: cannot build HTTP client: {e}");
            return;
        }
    };

    let mut reader =
        FeedReader::new(feed).with_notify(Arc::new(move || ctx.request_repaint()));
    if config.feed.preload_history {
        reader = reader.with_history(config.server.endpoint("chat"));
    }
    reader.run(&client, &config.server.endpoint("messages")).await;
}

// ---------------------------------------------------------------------------
// Hotkey
// ---------------------------------------------------------------------------

#[cfg(feature = "hotkey")]
fn start_hotkey(
    config: &AppConfig,
) -> Option<(webchat_client::hotkey::HotkeyListener, mpsc::Receiver<HotkeyEvent>)> {
    use webchat_client::hotkey::{parse_key, HotkeyListener};

    if !config.hotkey.enabled {
        return None;
    }

    let name = &config.hotkey.toggle_streaming_key;
    let key = parse_key(name).unwrap_or_else(|| {
        log::warn!("unknown hotkey {name:?}; using F9");
        rdev::Key::F9
    });

    let (tx, rx) = mpsc::channel(16);
    match HotkeyListener::start(key, tx) {
        Ok(listener) => Some((listener, rx)),
        Err(e) => {
            log::warn!("hotkey unavailable: {e}");
            None
        }
    }
}

#[cfg(not(feature = "hotkey"))]
fn start_hotkey(config: &AppConfig) -> Option<((), mpsc::Receiver<HotkeyEvent>)> {
    if config.hotkey.enabled {
        log::info!("built without the `hotkey` feature; global hotkey disabled");
    }
    None
}

// ---------------------------------------------------------------------------
// Native options builder
// ---------------------------------------------------------------------------

fn native_options(config: &AppConfig) -> eframe::NativeOptions {
    let (w, h) = config.ui.window_size;
    let mut vp = egui::ViewportBuilder::default()
        .with_title("Web Chat")
        .with_inner_size([w, h])
        .with_min_inner_size([320.0, 240.0]);

    if config.ui.always_on_top {
        vp = vp.with_always_on_top();
    }

    eframe::NativeOptions {
        viewport: vp,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("web chat client starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    log::info!("server: {}", config.server.base_url);

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Uploader, nick channel, recorder
    let uploader: Arc<dyn Uploader> = Arc::new(HttpUploader::from_config(&config.server));
    let (nick_tx, nick_rx) = watch::channel(config.chat.default_nick.clone());
    let (controller, recorder) = RecorderController::new(
        Arc::new(CpalMicrophone::new(config.audio.sample_rate)),
        Arc::clone(&uploader),
        &config.audio,
        nick_rx,
    );

    // 5. Controller task
    rt.spawn(controller.run());

    // 6. Hotkey listener thread
    let (_hotkey_listener, hotkey_rx) = match start_hotkey(&config) {
        Some((listener, rx)) => (Some(listener), Some(rx)),
        None => (None, None),
    };

    // 7. UI
    let feed = new_shared_feed(config.feed.capacity.max(1));
    let composer = Composer::new(uploader, recorder, nick_tx, rt.handle().clone());
    let app = ChatApp::new(Arc::clone(&feed), composer, hotkey_rx, &config);
    let options = native_options(&config);

    let handle = rt.handle().clone();
    let feed_config = config.clone();
    eframe::run_native(
        "Web Chat",
        options,
        Box::new(move |cc| {
            handle.spawn(run_feed(feed, feed_config, cc.egui_ctx.clone()));
            Ok(Box::new(app))
        }),
    )
    .map_err(|e| anyhow::anyhow!("UI failed: {e}"))
}
