use std::collections::HashMap;

use serde::Serialize;

use super::device::Device;
use super::entity::EntityState;

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    /// Entity states keyed by entity_id
    pub entities: HashMap<String, EntityState>,

    /// Device registry keyed by device id
    pub devices: HashMap<String, Device>,
}

impl State {
    /// Device an entity belongs to, if it registered one
    pub fn device_for_entity(&self, entity_id: &str) -> Option<&Device> {
        self.devices
            .values()
            .find(|device| device.entity_ids.iter().any(|id| id == entity_id))
    }
}
