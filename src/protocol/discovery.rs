//! Discovery registration descriptors
//!
//! One retained JSON document per entity, published to
//! `<prefix>/<domain>/<node>/<entity>/config`. The hub creates or updates the
//! entity keyed by `unique_id`, so re-sending an identical document is an
//! idempotent upsert.

use super::topics::EntityDomain;
use serde::Serialize;

/// Shared device block, identical for every entity of one node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceDescriptor {
    pub identifiers: Vec<String>,
    pub manufacturer: String,
    pub model: String,
    pub name: String,
    pub sw_version: String,
}

/// A full discovery registration message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryDescriptor {
    pub name: String,
    pub unique_id: String,
    pub availability_topic: String,
    pub payload_available: String,
    pub payload_not_available: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub device: DeviceDescriptor,
    #[serde(flatten)]
    pub fields: EntityFields,
}

impl DiscoveryDescriptor {
    pub fn domain(&self) -> EntityDomain {
        self.fields.domain()
    }
}

/// Class-specific discovery fields
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityFields {
    Switch {
        command_topic: String,
        state_topic: String,
        payload_on: String,
        payload_off: String,
        state_on: String,
        state_off: String,
    },
    Button {
        command_topic: String,
    },
    Select {
        command_topic: String,
        state_topic: String,
        options: Vec<String>,
    },
    Sensor {
        state_topic: String,
        value_template: String,
        json_attributes_topic: String,
    },
    BinarySensor {
        state_topic: String,
        payload_on: String,
        payload_off: String,
        device_class: String,
    },
    /// Write-only; the engine's property maps outgrow a text state
    Text {
        command_topic: String,
        max: u32,
    },
}

impl EntityFields {
    pub fn domain(&self) -> EntityDomain {
        match self {
            EntityFields::Switch { .. } => EntityDomain::Switch,
            EntityFields::Button { .. } => EntityDomain::Button,
            EntityFields::Select { .. } => EntityDomain::Select,
            EntityFields::Sensor { .. } => EntityDomain::Sensor,
            EntityFields::BinarySensor { .. } => EntityDomain::BinarySensor,
            EntityFields::Text { .. } => EntityDomain::Text,
        }
    }
}
