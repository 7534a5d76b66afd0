//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Location of the chat service.
///
/// Both endpoints (`chat` and `messages`) are resolved relative to
/// `base_url`, the same way the web page resolves them relative to its own
/// location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL the `chat` and `messages` endpoints live under.
    pub base_url: String,
    /// Seconds to wait for a TCP connection before giving up.
    ///
    /// Only the connect phase is bounded: the `messages` response is
    /// expected to stay open indefinitely.
    pub timeout_secs: u64,
}

impl ServerConfig {
    /// Resolve `path` against [`base_url`](Self::base_url).
    ///
    /// ```
    /// use webchat_client::config::ServerConfig;
    ///
    /// let server = ServerConfig {
    ///     base_url: "http://example.org/bwchat/".into(),
    ///     ..ServerConfig::default()
    /// };
    /// assert_eq!(server.endpoint("chat"), "http://example.org/bwchat/chat");
    /// ```
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/bwchat".into(),
            timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// ChatConfig
// ---------------------------------------------------------------------------

/// Settings for the message composer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Nick pre-filled into the composer on startup.
    pub default_nick: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_nick: "Anonymous".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// FeedConfig
// ---------------------------------------------------------------------------

/// Settings for the incoming message feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Maximum number of entries kept on screen; older entries are evicted
    /// first.
    pub capacity: usize,
    /// Fetch the chat page once at startup and seed the feed with the
    /// messages it already lists.
    pub preload_history: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            preload_history: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for microphone streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Length of audio covered by one uploaded chunk, in milliseconds.
    pub chunk_interval_ms: u64,
    /// Sample rate of the encoded chunks in Hz.
    pub sample_rate: u32,
    /// Largest chunk the server accepts in one message field.  Larger
    /// chunks are still sent but logged as a warning.
    pub max_chunk_bytes: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            chunk_interval_ms: 500,
            sample_rate: 16_000,
            max_chunk_bytes: 32 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// HotkeyConfig
// ---------------------------------------------------------------------------

/// Global hotkey bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Whether the global hotkey listener is started at all.
    pub enabled: bool,
    /// Key that toggles streaming, same as clicking the streaming control
    /// (e.g. `"F9"`).
    pub toggle_streaming_key: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            toggle_streaming_key: "F9".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// egui window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Keep the window floating above all other windows.
    pub always_on_top: bool,
    /// Initial inner window size `(width, height)` in points.
    pub window_size: (f32, f32),
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            always_on_top: false,
            window_size: (420.0, 560.0),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use webchat_client::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Chat service location.
    pub server: ServerConfig,
    /// Composer settings.
    pub chat: ChatConfig,
    /// Message feed settings.
    pub feed: FeedConfig,
    /// Microphone streaming settings.
    pub audio: AudioConfig,
    /// Global hotkey bindings.
    pub hotkey: HotkeyConfig,
    /// Window settings.
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
