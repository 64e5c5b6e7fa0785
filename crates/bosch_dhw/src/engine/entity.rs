/// Entity abstraction for the engine
///
/// All entities (water heaters and anything added later) implement the Entity trait.
use serde::Serialize;

use super::device::DeviceInfo;

/// Attribute map attached to an entity state.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// State of an entity as stored by the engine: a state string plus attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EntityState {
    pub state: String,
    pub attributes: Attributes,
}

/// Base trait that all entities must implement
pub trait Entity: Send + Sync {
    /// Entity ID (e.g., "water_heater.dhw1")
    fn entity_id(&self) -> &str;

    /// Identifier that stays stable for the lifetime of the registration
    fn unique_id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Return the platform type of this entity (e.g. "water_heater")
    fn platform(&self) -> &'static str;

    /// Device this entity belongs to, if any
    fn device_info(&self) -> Option<DeviceInfo> {
        None
    }

    /// Current state string
    fn state(&self) -> String;

    /// Attributes published alongside the state
    fn state_attributes(&self) -> Attributes {
        Attributes::new()
    }

    /// Snapshot of state and attributes for engine storage
    fn entity_state(&self) -> EntityState {
        EntityState {
            state: self.state(),
            attributes: self.state_attributes(),
        }
    }
}
