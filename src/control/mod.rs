//! Wallpaper Engine control capability
//!
//! The bridge never talks to Wallpaper Engine directly; it goes through the
//! capability traits below, grouped the way the engine groups its controls.
//! [`engine::EngineControl`] implements them over the engine's `-control`
//! command line, and [`crate::testing::MockControl`] implements them for tests.
//!
//! Every call is asynchronous and awaited by the caller before the next one is
//! issued, so implementations never see overlapping calls.

pub mod catalog;
pub mod engine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use engine::EngineControl;

/// One installed wallpaper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallpaperEntry {
    /// Workshop id, or the project folder path when the project has no id
    pub id: String,
    pub title: String,
    /// Project folder on disk
    pub path: String,
}

impl WallpaperEntry {
    pub fn new(id: impl Into<String>, title: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            path: path.into(),
        }
    }
}

/// Snapshot of the wallpaper currently shown on the primary monitor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CurrentWallpaper {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub path: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Control API failures
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Failed to launch control command `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Control command `{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("Failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Not configured: {0}")]
    NotConfigured(String),
    #[error("No wallpaper is currently active")]
    NoActiveWallpaper,
    #[error("Control call failed: {0}")]
    Other(String),
}

pub type ControlResult<T> = Result<T, ControlError>;

/// Desktop icon visibility
#[async_trait]
pub trait DesktopControl: Send + Sync {
    async fn show_icons(&self) -> ControlResult<()>;
    async fn hide_icons(&self) -> ControlResult<()>;
}

/// Audio and playback
#[async_trait]
pub trait PlaybackControl: Send + Sync {
    async fn mute(&self) -> ControlResult<()>;
    async fn unmute(&self) -> ControlResult<()>;
    async fn play(&self) -> ControlResult<()>;
    async fn pause(&self) -> ControlResult<()>;
    async fn stop(&self) -> ControlResult<()>;
}

/// Wallpaper catalog, loading and property application
#[async_trait]
pub trait WallpaperLibrary: Send + Sync {
    async fn list_wallpapers(&self) -> ControlResult<Vec<WallpaperEntry>>;
    async fn current_wallpaper(&self) -> ControlResult<CurrentWallpaper>;
    /// Load a wallpaper; `None` lets the engine pick the monitor
    async fn open_wallpaper(&self, entry: &WallpaperEntry, monitor: Option<u32>)
        -> ControlResult<()>;
    async fn apply_properties(&self, properties: &Map<String, Value>) -> ControlResult<()>;
}

/// Saved profiles
#[async_trait]
pub trait ProfileControl: Send + Sync {
    async fn list_profiles(&self) -> ControlResult<Vec<String>>;
    async fn open_profile(&self, name: &str) -> ControlResult<()>;
}

/// The full capability set the bridge needs
pub trait WallpaperControl:
    DesktopControl + PlaybackControl + WallpaperLibrary + ProfileControl
{
}

impl<T> WallpaperControl for T where
    T: DesktopControl + PlaybackControl + WallpaperLibrary + ProfileControl
{
}
