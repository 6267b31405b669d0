//! Topic naming for the bridge
//!
//! Pure functions mapping (domain, entity) pairs to broker topic strings, for
//! both discovery registration topics and command/state topics. Segments are
//! joined as-is: embedded separators are not escaped, so callers only pass
//! internally generated identifiers as segments.

use std::fmt;

/// Separator between topic path segments.
pub const TOPIC_SEPARATOR: &str = "/";

/// Join path segments into a topic string.
pub fn join_topic<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(TOPIC_SEPARATOR)
}

/// Build a discovery registration topic:
/// `<root>/<domain>/<node>/<object>/config`
pub fn discovery_topic(root: &str, domain: EntityDomain, node_id: &str, object_id: &str) -> String {
    join_topic(&[root, domain.as_str(), node_id, object_id, "config"])
}

/// Entity domain tags understood by the discovery convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityDomain {
    Switch,
    Button,
    Select,
    Sensor,
    BinarySensor,
    Text,
}

impl EntityDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityDomain::Switch => "switch",
            EntityDomain::Button => "button",
            EntityDomain::Select => "select",
            EntityDomain::Sensor => "sensor",
            EntityDomain::BinarySensor => "binary_sensor",
            EntityDomain::Text => "text",
        }
    }
}

impl fmt::Display for EntityDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every entity the bridge exposes, keyed by its topic segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    ShowIcons,
    Muted,
    Paused,
    ButtonPlay,
    ButtonStop,
    Refresh,
    SelectWallpaper,
    SelectProfile,
    Properties,
    CurrentWallpaper,
    Status,
    Wallpapers,
    Profiles,
}

impl Entity {
    /// Entities that accept commands on `<prefix>/<node>/<entity>/set`
    pub const COMMANDABLE: [Entity; 9] = [
        Entity::ShowIcons,
        Entity::Muted,
        Entity::Paused,
        Entity::ButtonPlay,
        Entity::ButtonStop,
        Entity::SelectWallpaper,
        Entity::SelectProfile,
        Entity::Properties,
        Entity::Refresh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::ShowIcons => "show_icons",
            Entity::Muted => "muted",
            Entity::Paused => "paused",
            Entity::ButtonPlay => "button_play",
            Entity::ButtonStop => "button_stop",
            Entity::Refresh => "refresh",
            Entity::SelectWallpaper => "select_wallpaper",
            Entity::SelectProfile => "select_profile",
            Entity::Properties => "properties",
            Entity::CurrentWallpaper => "current_wallpaper",
            Entity::Status => "status",
            Entity::Wallpapers => "wallpapers",
            Entity::Profiles => "profiles",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node-scoped topic construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBuilder {
    discovery_prefix: String,
    state_prefix: String,
    node_id: String,
}

impl TopicBuilder {
    pub fn new(
        discovery_prefix: impl Into<String>,
        state_prefix: impl Into<String>,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            discovery_prefix: discovery_prefix.into(),
            state_prefix: state_prefix.into(),
            node_id: node_id.into(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn discovery_prefix(&self) -> &str {
        &self.discovery_prefix
    }

    /// Presence topic: `<discovery_prefix>/status/<node>`
    pub fn status(&self) -> String {
        join_topic(&[self.discovery_prefix.as_str(), "status", &self.node_id])
    }

    /// Discovery registration topic for one entity
    pub fn discovery(&self, domain: EntityDomain, entity: Entity) -> String {
        discovery_topic(
            &self.discovery_prefix,
            domain,
            &self.node_id,
            entity.as_str(),
        )
    }

    /// `<state_prefix>/<node>/<entity>/<leaf>`
    pub fn entity(&self, entity: Entity, leaf: &str) -> String {
        join_topic(&[
            self.state_prefix.as_str(),
            &self.node_id,
            entity.as_str(),
            leaf,
        ])
    }

    pub fn command(&self, entity: Entity) -> String {
        self.entity(entity, "set")
    }

    pub fn state(&self, entity: Entity) -> String {
        self.entity(entity, "state")
    }

    pub fn attributes(&self, entity: Entity) -> String {
        self.entity(entity, "attributes")
    }

    pub fn list(&self, entity: Entity) -> String {
        self.entity(entity, "list")
    }

    pub fn last_set(&self, entity: Entity) -> String {
        self.entity(entity, "last_set")
    }

    /// All command topics the dispatcher subscribes to
    pub fn command_topics(&self) -> Vec<String> {
        Entity::COMMANDABLE
            .iter()
            .map(|entity| self.command(*entity))
            .collect()
    }

    /// Reverse lookup of a command topic to its entity
    pub fn command_entity(&self, topic: &str) -> Option<Entity> {
        Entity::COMMANDABLE
            .iter()
            .copied()
            .find(|entity| self.command(*entity) == topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn builder() -> TopicBuilder {
        TopicBuilder::new("homeassistant", "we", "192_168_1_20")
    }

    proptest! {
        #[test]
        fn join_topic_round_trips_separator_free_segments(
            segments in proptest::collection::vec("[a-z0-9_]{1,12}", 1..6)
        ) {
            let topic = join_topic(&segments);
            let split: Vec<&str> = topic.split(TOPIC_SEPARATOR).collect();
            prop_assert_eq!(split, segments.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_join_topic_does_not_escape_separators() {
        assert_eq!(join_topic(&["a/b", "c"]), "a/b/c");
        assert_eq!(join_topic::<&str>(&[]), "");
    }

    #[test]
    fn test_discovery_topic() {
        assert_eq!(
            discovery_topic("homeassistant", EntityDomain::Switch, "node", "muted"),
            "homeassistant/switch/node/muted/config"
        );
        assert_eq!(
            builder().discovery(EntityDomain::BinarySensor, Entity::Status),
            "homeassistant/binary_sensor/192_168_1_20/status/config"
        );
    }

    #[test]
    fn test_entity_topics() {
        let topics = builder();
        assert_eq!(topics.status(), "homeassistant/status/192_168_1_20");
        assert_eq!(
            topics.command(Entity::ShowIcons),
            "we/192_168_1_20/show_icons/set"
        );
        assert_eq!(
            topics.state(Entity::ButtonPlay),
            "we/192_168_1_20/button_play/state"
        );
        assert_eq!(
            topics.attributes(Entity::CurrentWallpaper),
            "we/192_168_1_20/current_wallpaper/attributes"
        );
        assert_eq!(
            topics.list(Entity::Profiles),
            "we/192_168_1_20/profiles/list"
        );
        assert_eq!(
            topics.last_set(Entity::Properties),
            "we/192_168_1_20/properties/last_set"
        );
    }

    #[test]
    fn test_command_entity_lookup() {
        let topics = builder();
        for entity in Entity::COMMANDABLE {
            assert_eq!(topics.command_entity(&topics.command(entity)), Some(entity));
        }
        assert_eq!(
            topics.command_entity("we/192_168_1_20/show_icons/state"),
            None
        );
        assert_eq!(topics.command_entity("we/other_node/show_icons/set"), None);
    }

    #[test]
    fn test_command_topics_are_unique() {
        let topics = builder().command_topics();
        let mut deduped = topics.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(topics.len(), deduped.len());
        assert_eq!(topics.len(), Entity::COMMANDABLE.len());
    }
}
