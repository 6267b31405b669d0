//! Refresh loop body
//!
//! Re-reads the catalogs and the active wallpaper from the control API and
//! republishes everything derived from them. Steps are independent: a failed
//! step is logged and recorded, and the pass moves on to the next one.

use super::Bridge;
use crate::control::{ControlResult, CurrentWallpaper, WallpaperControl};
use crate::observability::metrics;
use crate::protocol::{option_label, CurrentWallpaperState, Entity};
use crate::refresh_span;
use crate::transport::Transport;
use serde_json::Value;
use std::fmt;
use std::time::Instant;
use tracing::{info, warn, Instrument};

/// One independently fallible step of a refresh pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStep {
    Wallpapers,
    Profiles,
    SelectOptions,
    CurrentWallpaper,
    Catalogs,
}

impl RefreshStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshStep::Wallpapers => "wallpapers",
            RefreshStep::Profiles => "profiles",
            RefreshStep::SelectOptions => "select_options",
            RefreshStep::CurrentWallpaper => "current_wallpaper",
            RefreshStep::Catalogs => "catalogs",
        }
    }
}

impl fmt::Display for RefreshStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one refresh pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub failed: Vec<RefreshStep>,
}

impl RefreshReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn has_failed(&self, step: RefreshStep) -> bool {
        self.failed.contains(&step)
    }

    fn record(&mut self, step: RefreshStep, ok: bool) {
        if !ok {
            self.failed.push(step);
        }
    }
}

impl<T, C> Bridge<T, C>
where
    T: Transport,
    C: WallpaperControl,
{
    /// Run one full refresh pass; never fails as a whole
    pub async fn refresh(&mut self) -> RefreshReport {
        let span = refresh_span!(node_id = %self.topics.node_id());
        self.refresh_pass().instrument(span).await
    }

    async fn refresh_pass(&mut self) -> RefreshReport {
        let started = Instant::now();
        let mut report = RefreshReport::default();

        let ok = match self.control.list_wallpapers().await {
            Ok(wallpapers) => {
                self.state.replace_wallpapers(wallpapers);
                true
            }
            Err(e) => {
                metrics().control_failed();
                warn!(step = %RefreshStep::Wallpapers, error = %e, "Refresh step failed");
                false
            }
        };
        report.record(RefreshStep::Wallpapers, ok);

        let ok = match self.control.list_profiles().await {
            Ok(profiles) => {
                self.state.replace_profiles(profiles);
                true
            }
            Err(e) => {
                metrics().control_failed();
                warn!(step = %RefreshStep::Profiles, error = %e, "Refresh step failed");
                false
            }
        };
        report.record(RefreshStep::Profiles, ok);

        let ok = self.publish_select_discovery().await;
        if !ok {
            warn!(step = %RefreshStep::SelectOptions, "Refresh step failed");
        }
        report.record(RefreshStep::SelectOptions, ok);

        let ok = match self.publish_current_wallpaper().await {
            Ok(()) => true,
            Err(e) => {
                metrics().control_failed();
                warn!(step = %RefreshStep::CurrentWallpaper, error = %e, "Refresh step failed");
                false
            }
        };
        report.record(RefreshStep::CurrentWallpaper, ok);

        let ok = self.publish_catalogs().await;
        if !ok {
            warn!(step = %RefreshStep::Catalogs, "Refresh step failed");
        }
        report.record(RefreshStep::Catalogs, ok);

        let elapsed = started.elapsed();
        metrics().refresh_completed(elapsed, report.failed.len());
        info!(
            wallpapers = self.state.wallpapers.len(),
            profiles = self.state.profiles.len(),
            failed_steps = report.failed.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Refresh pass complete"
        );
        report
    }

    /// Publish the compact state and full attributes of the active wallpaper
    pub async fn publish_current_snapshot(&self) -> ControlResult<CurrentWallpaper> {
        let current = self.control.current_wallpaper().await?;
        self.publish_json(
            &self.topics.state(Entity::CurrentWallpaper),
            &CurrentWallpaperState::from(&current),
            true,
        )
        .await;
        self.publish_json(&self.topics.attributes(Entity::CurrentWallpaper), &current, true)
            .await;
        Ok(current)
    }

    /// Snapshot plus the select state and the last-applied properties
    async fn publish_current_wallpaper(&self) -> ControlResult<()> {
        let current = self.publish_current_snapshot().await?;

        let selected = self
            .state
            .wallpaper_by_id(&current.id)
            .map(option_label)
            .unwrap_or_else(|| current.id.clone());
        self.publish(&self.topics.state(Entity::SelectWallpaper), selected, true)
            .await;
        self.publish_json(
            &self.topics.last_set(Entity::Properties),
            &Value::Object(current.properties),
            true,
        )
        .await;
        Ok(())
    }

    /// Raw catalogs as retained JSON arrays
    async fn publish_catalogs(&self) -> bool {
        let wallpapers = self
            .publish_json(&self.topics.list(Entity::Wallpapers), &self.state.wallpapers, true)
            .await;
        let profiles = self
            .publish_json(&self.topics.list(Entity::Profiles), &self.state.profiles, true)
            .await;
        wallpapers && profiles
    }
}
