//! Command dispatcher
//!
//! Maps one inbound command message to control calls and state publishes.
//! Nothing is ever reported back over the broker: malformed payloads,
//! unknown wallpapers or profiles and control failures are logged and the
//! command is dropped.

use super::Bridge;
use crate::command_span;
use crate::control::{ControlError, WallpaperControl};
use crate::observability::metrics;
use crate::protocol::{
    on_off, parse_properties, parse_toggle, payload_text, Entity, PayloadError, WallpaperRequest,
    PAYLOAD_PRESSED,
};
use crate::transport::Transport;
use serde_json::{Map, Value};
use tracing::{debug, info, warn, Instrument};

/// A decoded command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Icons, mute or pause, with the requested value
    Toggle { entity: Entity, on: bool },
    Play,
    Stop,
    SelectWallpaper {
        request: WallpaperRequest,
        /// Payload as received, echoed to the state topic
        raw: String,
    },
    SelectProfile(String),
    ApplyProperties {
        properties: Map<String, Value>,
        raw: String,
    },
    Refresh,
}

impl Command {
    /// Decode a payload for the given command entity
    ///
    /// `Ok(None)` for entities that take no commands. Button payloads are
    /// never inspected.
    pub fn parse(entity: Entity, payload: &[u8]) -> Result<Option<Self>, PayloadError> {
        let command = match entity {
            Entity::ButtonPlay => Command::Play,
            Entity::ButtonStop => Command::Stop,
            Entity::Refresh => Command::Refresh,
            Entity::ShowIcons | Entity::Muted | Entity::Paused => Command::Toggle {
                entity,
                on: parse_toggle(payload_text(payload)?),
            },
            Entity::SelectWallpaper => {
                let text = payload_text(payload)?;
                Command::SelectWallpaper {
                    request: WallpaperRequest::parse(text)?,
                    raw: text.to_string(),
                }
            }
            Entity::SelectProfile => {
                let text = payload_text(payload)?;
                if text.trim().is_empty() {
                    return Err(PayloadError::Empty);
                }
                Command::SelectProfile(text.to_string())
            }
            Entity::Properties => {
                let text = payload_text(payload)?;
                Command::ApplyProperties {
                    properties: parse_properties(text)?,
                    raw: text.to_string(),
                }
            }
            Entity::CurrentWallpaper | Entity::Status | Entity::Wallpapers | Entity::Profiles => {
                return Ok(None)
            }
        };
        Ok(Some(command))
    }
}

/// What became of one inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Not a command topic
    Ignored,
    Applied,
    /// Malformed or unresolvable; no control call was made
    Dropped(String),
    /// A control call failed; no state was published
    Failed(String),
}

impl<T, C> Bridge<T, C>
where
    T: Transport,
    C: WallpaperControl,
{
    /// Handle one inbound broker message
    pub async fn handle_message(&mut self, topic: &str, payload: &[u8]) -> CommandOutcome {
        let Some(entity) = self.topics.command_entity(topic) else {
            debug!(topic = %topic, "Ignoring message on unrecognized topic");
            return CommandOutcome::Ignored;
        };

        let span = command_span!(topic = %topic, entity = %entity);
        self.dispatch(entity, payload).instrument(span).await
    }

    async fn dispatch(&mut self, entity: Entity, payload: &[u8]) -> CommandOutcome {
        metrics().command_received(entity.as_str());

        let outcome = match Command::parse(entity, payload) {
            Ok(Some(command)) => self.execute(command).await,
            Ok(None) => CommandOutcome::Ignored,
            Err(e) => {
                warn!(error = %e, "Dropping malformed command");
                CommandOutcome::Dropped(e.to_string())
            }
        };

        match &outcome {
            CommandOutcome::Applied => metrics().command_applied(),
            CommandOutcome::Dropped(_) => metrics().command_dropped(),
            CommandOutcome::Failed(_) => metrics().control_failed(),
            CommandOutcome::Ignored => {}
        }
        outcome
    }

    /// Run a decoded command against the control API
    pub async fn execute(&mut self, command: Command) -> CommandOutcome {
        match command {
            Command::Toggle { entity, on } => self.apply_toggle(entity, on).await,
            Command::Play => self.press(Entity::ButtonPlay).await,
            Command::Stop => self.press(Entity::ButtonStop).await,
            Command::SelectWallpaper { request, raw } => {
                self.select_wallpaper(&request, &raw).await
            }
            Command::SelectProfile(name) => self.select_profile(&name).await,
            Command::ApplyProperties { properties, raw } => {
                self.apply_properties(&properties, &raw).await
            }
            Command::Refresh => {
                let report = self.refresh().await;
                debug!(failed_steps = report.failed.len(), "Manual refresh done");
                CommandOutcome::Applied
            }
        }
    }

    async fn apply_toggle(&mut self, entity: Entity, on: bool) -> CommandOutcome {
        let result = match (entity, on) {
            (Entity::ShowIcons, true) => self.control.show_icons().await,
            (Entity::ShowIcons, false) => self.control.hide_icons().await,
            (Entity::Muted, true) => self.control.mute().await,
            (Entity::Muted, false) => self.control.unmute().await,
            (Entity::Paused, true) => self.control.pause().await,
            (Entity::Paused, false) => self.control.play().await,
            _ => return CommandOutcome::Ignored,
        };
        if let Err(e) = result {
            return control_failure(e);
        }

        self.state.shadow.set(entity, on);
        self.publish(&self.topics.state(entity), on_off(on), true)
            .await;
        info!(value = on, "Toggle applied");
        CommandOutcome::Applied
    }

    async fn press(&self, entity: Entity) -> CommandOutcome {
        let result = match entity {
            Entity::ButtonPlay => self.control.play().await,
            _ => self.control.stop().await,
        };
        if let Err(e) = result {
            return control_failure(e);
        }

        self.publish(&self.topics.state(entity), PAYLOAD_PRESSED, false)
            .await;
        CommandOutcome::Applied
    }

    async fn select_wallpaper(&self, request: &WallpaperRequest, raw: &str) -> CommandOutcome {
        let Some(entry) = request.resolve(&self.state.wallpapers).cloned() else {
            warn!(
                reference = %request.reference,
                known = self.state.wallpapers.len(),
                "Wallpaper not in catalog, dropping"
            );
            return CommandOutcome::Dropped(format!("unknown wallpaper '{}'", request.reference));
        };

        for monitor in request.target.monitors(&self.settings.monitors) {
            if let Err(e) = self.control.open_wallpaper(&entry, monitor).await {
                return control_failure(e);
            }
        }
        info!(id = %entry.id, title = %entry.title, target = ?request.target, "Wallpaper loaded");

        self.publish(&self.topics.state(Entity::SelectWallpaper), raw, true)
            .await;
        if let Err(e) = self.publish_current_snapshot().await {
            warn!(error = %e, "Failed to republish current wallpaper");
        }
        CommandOutcome::Applied
    }

    async fn select_profile(&self, name: &str) -> CommandOutcome {
        if !self.state.has_profile(name) {
            warn!(profile = %name, "Profile not found, dropping");
            return CommandOutcome::Dropped(format!("unknown profile '{name}'"));
        }
        if let Err(e) = self.control.open_profile(name).await {
            return control_failure(e);
        }
        info!(profile = %name, "Profile loaded");

        self.publish(&self.topics.state(Entity::SelectProfile), name, true)
            .await;
        CommandOutcome::Applied
    }

    async fn apply_properties(&self, properties: &Map<String, Value>, raw: &str) -> CommandOutcome {
        if let Err(e) = self.control.apply_properties(properties).await {
            return control_failure(e);
        }
        info!(keys = properties.len(), "Properties applied");

        self.publish(&self.topics.last_set(Entity::Properties), raw, true)
            .await;
        if let Err(e) = self.publish_current_snapshot().await {
            warn!(error = %e, "Failed to republish current wallpaper");
        }
        CommandOutcome::Applied
    }
}

fn control_failure(error: ControlError) -> CommandOutcome {
    warn!(error = %error, "Control call failed");
    CommandOutcome::Failed(error.to_string())
}
