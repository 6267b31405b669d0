//! Discovery publisher
//!
//! Builds one registration document per entity and publishes them retained.
//! The full set goes out on every connect; the two selects are re-registered
//! by each refresh pass once real options are known, since re-registration is
//! the only way to update a select's option list.

use super::Bridge;
use crate::control::WallpaperControl;
use crate::identity::NodeIdentity;
use crate::protocol::{
    wallpaper_options, DeviceDescriptor, DiscoveryDescriptor, Entity, EntityFields, TopicBuilder,
    PAYLOAD_OFF, PAYLOAD_OFFLINE, PAYLOAD_ON, PAYLOAD_ONLINE,
};
use crate::transport::Transport;
use tracing::{debug, info};

const MANUFACTURER: &str = "Wallpaper Engine";
const MODEL: &str = "Wallpaper Engine";
const TEXT_MAX_LEN: u32 = 255;

/// Entity labels and descriptor construction for one node
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryCatalog {
    device_name: String,
    device: DeviceDescriptor,
}

impl DiscoveryCatalog {
    pub fn new(device_name: &str, identity: &NodeIdentity) -> Self {
        Self {
            device_name: device_name.to_string(),
            device: DeviceDescriptor {
                identifiers: vec![format!("wallpaper_engine_{}", identity.node_id())],
                manufacturer: MANUFACTURER.to_string(),
                model: MODEL.to_string(),
                name: format!("{} {}", device_name, identity.address()),
                sw_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    /// Every registration, with the given select options
    pub fn descriptors(
        &self,
        topics: &TopicBuilder,
        wallpaper_options: Vec<String>,
        profile_options: Vec<String>,
    ) -> Vec<(Entity, DiscoveryDescriptor)> {
        let mut descriptors: Vec<(Entity, DiscoveryDescriptor)> = [
            (Entity::ShowIcons, "mdi:monitor-dashboard"),
            (Entity::Muted, "mdi:volume-off"),
            (Entity::Paused, "mdi:pause"),
        ]
        .into_iter()
        .map(|(entity, icon)| (entity, self.switch(topics, entity, icon)))
        .collect();

        for (entity, icon) in [
            (Entity::ButtonPlay, "mdi:play"),
            (Entity::ButtonStop, "mdi:stop"),
            (Entity::Refresh, "mdi:refresh"),
        ] {
            let fields = EntityFields::Button {
                command_topic: topics.command(entity),
            };
            descriptors.push((entity, self.descriptor(topics, entity, Some(icon), fields)));
        }

        descriptors.push((
            Entity::SelectWallpaper,
            self.wallpaper_select(topics, wallpaper_options),
        ));
        descriptors.push((
            Entity::SelectProfile,
            self.profile_select(topics, profile_options),
        ));

        let properties = EntityFields::Text {
            command_topic: topics.command(Entity::Properties),
            max: TEXT_MAX_LEN,
        };
        let current = EntityFields::Sensor {
            state_topic: topics.state(Entity::CurrentWallpaper),
            value_template: "{{ value_json.title }}".to_string(),
            json_attributes_topic: topics.attributes(Entity::CurrentWallpaper),
        };
        let status = EntityFields::BinarySensor {
            state_topic: topics.status(),
            payload_on: PAYLOAD_ONLINE.to_string(),
            payload_off: PAYLOAD_OFFLINE.to_string(),
            device_class: "connectivity".to_string(),
        };
        for (entity, icon, fields) in [
            (Entity::Properties, Some("mdi:tune"), properties),
            (Entity::CurrentWallpaper, Some("mdi:image"), current),
            (Entity::Status, None, status),
        ] {
            descriptors.push((entity, self.descriptor(topics, entity, icon, fields)));
        }

        descriptors
    }

    pub fn wallpaper_select(
        &self,
        topics: &TopicBuilder,
        options: Vec<String>,
    ) -> DiscoveryDescriptor {
        self.select(topics, Entity::SelectWallpaper, "mdi:image-multiple", options)
    }

    pub fn profile_select(
        &self,
        topics: &TopicBuilder,
        options: Vec<String>,
    ) -> DiscoveryDescriptor {
        self.select(topics, Entity::SelectProfile, "mdi:account-box-multiple", options)
    }

    fn switch(&self, topics: &TopicBuilder, entity: Entity, icon: &str) -> DiscoveryDescriptor {
        self.descriptor(
            topics,
            entity,
            Some(icon),
            EntityFields::Switch {
                command_topic: topics.command(entity),
                state_topic: topics.state(entity),
                payload_on: PAYLOAD_ON.to_string(),
                payload_off: PAYLOAD_OFF.to_string(),
                state_on: PAYLOAD_ON.to_string(),
                state_off: PAYLOAD_OFF.to_string(),
            },
        )
    }

    fn select(
        &self,
        topics: &TopicBuilder,
        entity: Entity,
        icon: &str,
        options: Vec<String>,
    ) -> DiscoveryDescriptor {
        self.descriptor(
            topics,
            entity,
            Some(icon),
            EntityFields::Select {
                command_topic: topics.command(entity),
                state_topic: topics.state(entity),
                options,
            },
        )
    }

    fn descriptor(
        &self,
        topics: &TopicBuilder,
        entity: Entity,
        icon: Option<&str>,
        fields: EntityFields,
    ) -> DiscoveryDescriptor {
        DiscoveryDescriptor {
            name: format!("{} {}", self.device_name, entity_label(entity)),
            unique_id: format!("{}_{}", topics.node_id(), entity.as_str()),
            availability_topic: topics.status(),
            payload_available: PAYLOAD_ONLINE.to_string(),
            payload_not_available: PAYLOAD_OFFLINE.to_string(),
            icon: icon.map(str::to_string),
            device: self.device.clone(),
            fields,
        }
    }
}

/// Display label shown after the device name
pub fn entity_label(entity: Entity) -> &'static str {
    match entity {
        Entity::ShowIcons => "Show Icons",
        Entity::Muted => "Mute",
        Entity::Paused => "Pause",
        Entity::ButtonPlay => "Play",
        Entity::ButtonStop => "Stop",
        Entity::Refresh => "Refresh",
        Entity::SelectWallpaper => "Wallpaper",
        Entity::SelectProfile => "Profile",
        Entity::Properties => "Properties",
        Entity::CurrentWallpaper => "Current Wallpaper",
        Entity::Status => "Status",
        Entity::Wallpapers => "Wallpapers",
        Entity::Profiles => "Profiles",
    }
}

impl<T, C> Bridge<T, C>
where
    T: Transport,
    C: WallpaperControl,
{
    /// Register every entity, selects with empty option lists
    ///
    /// The documents are identical on every connect, so re-registration
    /// updates the existing entities instead of creating new ones.
    pub async fn publish_discovery(&self) -> usize {
        let descriptors = self.discovery.descriptors(&self.topics, Vec::new(), Vec::new());
        let total = descriptors.len();
        let mut published = 0;
        for (entity, descriptor) in &descriptors {
            let topic = self.topics.discovery(descriptor.domain(), *entity);
            if self.publish_json(&topic, descriptor, true).await {
                published += 1;
            }
        }
        info!(published, total, "Published discovery registrations");
        published
    }

    /// Re-register both selects with the current catalogs
    pub async fn publish_select_discovery(&self) -> bool {
        let wallpaper = self
            .discovery
            .wallpaper_select(&self.topics, self.wallpaper_select_options());
        let profile = self
            .discovery
            .profile_select(&self.topics, self.state.profiles.clone());

        let wallpaper_topic = self
            .topics
            .discovery(wallpaper.domain(), Entity::SelectWallpaper);
        let profile_topic = self.topics.discovery(profile.domain(), Entity::SelectProfile);

        let wallpaper_ok = self.publish_json(&wallpaper_topic, &wallpaper, true).await;
        let profile_ok = self.publish_json(&profile_topic, &profile, true).await;
        debug!(
            wallpapers = self.state.wallpapers.len(),
            profiles = self.state.profiles.len(),
            "Re-registered selects"
        );
        wallpaper_ok && profile_ok
    }

    fn wallpaper_select_options(&self) -> Vec<String> {
        wallpaper_options(
            &self.state.wallpapers,
            &self.settings.monitors,
            self.settings.expand_monitor_options,
        )
    }
}
