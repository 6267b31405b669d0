//! State owned by the bridge
//!
//! The engine offers no query for icon visibility, mute or pause, so the
//! bridge keeps its own belief about them. Catalogs are replaced wholesale by
//! each refresh pass.

use crate::control::WallpaperEntry;
use crate::protocol::topics::Entity;

/// Locally cached toggle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowState {
    pub icons_shown: bool,
    pub muted: bool,
    pub paused: bool,
}

impl Default for ShadowState {
    /// What the engine does on startup: icons shown, audio on, playing
    fn default() -> Self {
        Self {
            icons_shown: true,
            muted: false,
            paused: false,
        }
    }
}

impl ShadowState {
    /// The toggle entities backed by shadow state
    pub const TOGGLES: [Entity; 3] = [Entity::ShowIcons, Entity::Muted, Entity::Paused];

    pub fn get(&self, entity: Entity) -> Option<bool> {
        match entity {
            Entity::ShowIcons => Some(self.icons_shown),
            Entity::Muted => Some(self.muted),
            Entity::Paused => Some(self.paused),
            _ => None,
        }
    }

    /// Record a new value; returns false for entities without shadow state
    pub fn set(&mut self, entity: Entity, value: bool) -> bool {
        let slot = match entity {
            Entity::ShowIcons => &mut self.icons_shown,
            Entity::Muted => &mut self.muted,
            Entity::Paused => &mut self.paused,
            _ => return false,
        };
        *slot = value;
        true
    }

    pub fn toggles(&self) -> [(Entity, bool); 3] {
        [
            (Entity::ShowIcons, self.icons_shown),
            (Entity::Muted, self.muted),
            (Entity::Paused, self.paused),
        ]
    }
}

/// Everything the dispatcher and refresh loop share
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeState {
    pub shadow: ShadowState,
    pub wallpapers: Vec<WallpaperEntry>,
    pub profiles: Vec<String>,
}

impl BridgeState {
    pub fn replace_wallpapers(&mut self, wallpapers: Vec<WallpaperEntry>) {
        self.wallpapers = wallpapers;
    }

    pub fn replace_profiles(&mut self, profiles: Vec<String>) {
        self.profiles = profiles;
    }

    pub fn has_profile(&self, name: &str) -> bool {
        self.profiles.iter().any(|profile| profile == name)
    }

    pub fn wallpaper_by_id(&self, id: &str) -> Option<&WallpaperEntry> {
        self.wallpapers.iter().find(|entry| entry.id == id)
    }
}
