//! Wallpaper Engine control over its command line
//!
//! The engine accepts `-control <verb>` invocations of its own executable and
//! forwards them to the running instance. Reads go to the engine's files.

use super::catalog::{self, EngineConfigFile, PROJECT_FILE};
use super::{
    ControlError, ControlResult, CurrentWallpaper, DesktopControl, PlaybackControl,
    ProfileControl, WallpaperEntry, WallpaperLibrary,
};
use crate::config::EngineSection;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// A single `-control` invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    ShowIcons,
    HideIcons,
    Mute,
    Unmute,
    Play,
    Pause,
    Stop,
    OpenWallpaper { file: String, monitor: Option<u32> },
    OpenProfile { name: String },
    ApplyProperties { json: String },
}

impl ControlCommand {
    pub fn verb(&self) -> &'static str {
        match self {
            ControlCommand::ShowIcons => "showIcons",
            ControlCommand::HideIcons => "hideIcons",
            ControlCommand::Mute => "mute",
            ControlCommand::Unmute => "unmute",
            ControlCommand::Play => "play",
            ControlCommand::Pause => "pause",
            ControlCommand::Stop => "stop",
            ControlCommand::OpenWallpaper { .. } => "openWallpaper",
            ControlCommand::OpenProfile { .. } => "openProfile",
            ControlCommand::ApplyProperties { .. } => "applyProperties",
        }
    }

    /// Arguments following the executable
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["-control".to_string(), self.verb().to_string()];
        match self {
            ControlCommand::OpenWallpaper { file, monitor } => {
                args.push("-file".to_string());
                args.push(file.clone());
                if let Some(monitor) = monitor {
                    args.push("-monitor".to_string());
                    args.push(monitor.to_string());
                }
            }
            ControlCommand::OpenProfile { name } => {
                args.push("-profile".to_string());
                args.push(name.clone());
            }
            ControlCommand::ApplyProperties { json } => {
                args.push("-properties".to_string());
                args.push(format!("RAW~({json})~END"));
            }
            _ => {}
        }
        args
    }
}

/// The file `openWallpaper` expects for a catalog entry
pub fn wallpaper_file(entry: &WallpaperEntry) -> String {
    let path = Path::new(&entry.path);
    if path.extension().is_some() {
        entry.path.clone()
    } else {
        path.join(PROJECT_FILE).to_string_lossy().to_string()
    }
}

/// Control adapter backed by the engine executable
#[derive(Debug, Clone)]
pub struct EngineControl {
    executable: PathBuf,
    config_path: Option<PathBuf>,
    wallpaper_dirs: Vec<PathBuf>,
    user: Option<String>,
}

impl EngineControl {
    pub fn new(config: &EngineSection) -> Self {
        Self {
            executable: config.executable.clone(),
            config_path: config.config_path.clone(),
            wallpaper_dirs: config.wallpaper_dirs.clone(),
            user: config.user.clone(),
        }
    }

    async fn run(&self, command: ControlCommand) -> ControlResult<()> {
        let args = command.args();
        let rendered = format!("{} {}", self.executable.display(), args.join(" "));
        debug!(command = %rendered, "Running engine control command");

        let output = Command::new(&self.executable)
            .args(&args)
            .output()
            .await
            .map_err(|source| ControlError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ControlError::CommandFailed {
                command: rendered,
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(verb = command.verb(), "Engine control command completed");
        Ok(())
    }

    async fn engine_config(&self) -> ControlResult<EngineConfigFile> {
        let path = self
            .config_path
            .clone()
            .ok_or_else(|| ControlError::NotConfigured("engine.config_path".to_string()))?;
        blocking(move || EngineConfigFile::load(&path)).await
    }
}

async fn blocking<T, F>(work: F) -> ControlResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ControlResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ControlError::Other(format!("File task failed: {e}")))?
}

#[async_trait]
impl DesktopControl for EngineControl {
    async fn show_icons(&self) -> ControlResult<()> {
        self.run(ControlCommand::ShowIcons).await
    }

    async fn hide_icons(&self) -> ControlResult<()> {
        self.run(ControlCommand::HideIcons).await
    }
}

#[async_trait]
impl PlaybackControl for EngineControl {
    async fn mute(&self) -> ControlResult<()> {
        self.run(ControlCommand::Mute).await
    }

    async fn unmute(&self) -> ControlResult<()> {
        self.run(ControlCommand::Unmute).await
    }

    async fn play(&self) -> ControlResult<()> {
        self.run(ControlCommand::Play).await
    }

    async fn pause(&self) -> ControlResult<()> {
        self.run(ControlCommand::Pause).await
    }

    async fn stop(&self) -> ControlResult<()> {
        self.run(ControlCommand::Stop).await
    }
}

#[async_trait]
impl WallpaperLibrary for EngineControl {
    async fn list_wallpapers(&self) -> ControlResult<Vec<WallpaperEntry>> {
        let dirs = self.wallpaper_dirs.clone();
        blocking(move || catalog::scan_wallpapers(&dirs)).await
    }

    async fn current_wallpaper(&self) -> ControlResult<CurrentWallpaper> {
        let config = self.engine_config().await?;
        let selected = config
            .selected_wallpaper(self.user.as_deref())
            .ok_or(ControlError::NoActiveWallpaper)?;
        blocking(move || catalog::load_current_wallpaper(&selected)).await
    }

    async fn open_wallpaper(
        &self,
        entry: &WallpaperEntry,
        monitor: Option<u32>,
    ) -> ControlResult<()> {
        self.run(ControlCommand::OpenWallpaper {
            file: wallpaper_file(entry),
            monitor,
        })
        .await
    }

    async fn apply_properties(&self, properties: &Map<String, Value>) -> ControlResult<()> {
        let json = serde_json::to_string(properties)
            .map_err(|e| ControlError::Other(format!("Failed to encode properties: {e}")))?;
        self.run(ControlCommand::ApplyProperties { json }).await
    }
}

#[async_trait]
impl ProfileControl for EngineControl {
    async fn list_profiles(&self) -> ControlResult<Vec<String>> {
        let config = self.engine_config().await?;
        Ok(config.profile_names(self.user.as_deref()))
    }

    async fn open_profile(&self, name: &str) -> ControlResult<()> {
        self.run(ControlCommand::OpenProfile {
            name: name.to_string(),
        })
        .await
    }
}
