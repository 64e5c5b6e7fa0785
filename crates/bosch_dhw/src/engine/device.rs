use serde::Serialize;

/// Descriptive metadata an entity reports about the device it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub sw_version: Option<String>,
    /// Parent device (e.g. the gateway a circuit hangs off)
    pub via_device: Option<(String, String)>,
}

impl DeviceInfo {
    /// Registry key: the first identifier joined as `domain:id`.
    pub fn device_id(&self) -> Option<String> {
        self.identifiers
            .first()
            .map(|(domain, id)| format!("{}:{}", domain, id))
    }
}

/// A device in the engine's registry.
///
/// A device represents a physical or logical device that contains one or more entities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub id: String,
    pub info: DeviceInfo,
    pub entity_ids: Vec<String>,
}

impl Device {
    pub fn new(id: String, info: DeviceInfo) -> Self {
        Self {
            id,
            info,
            entity_ids: Vec::new(),
        }
    }

    pub fn add_entity(&mut self, entity_id: String) {
        if !self.entity_ids.contains(&entity_id) {
            self.entity_ids.push(entity_id);
        }
    }

    pub fn remove_entity(&mut self, entity_id: &str) {
        self.entity_ids.retain(|id| id != entity_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> DeviceInfo {
        DeviceInfo {
            identifiers: vec![("bosch".to_string(), "dhw1abc".to_string())],
            name: "Water heater dhw1".to_string(),
            manufacturer: None,
            model: None,
            sw_version: None,
            via_device: None,
        }
    }

    #[test]
    fn test_device_id_from_first_identifier() {
        assert_eq!(info().device_id().as_deref(), Some("bosch:dhw1abc"));

        let mut anonymous = info();
        anonymous.identifiers.clear();
        assert_eq!(anonymous.device_id(), None);
    }

    #[test]
    fn test_add_entity_is_idempotent() {
        let mut device = Device::new("bosch:dhw1abc".to_string(), info());
        device.add_entity("water_heater.dhw1".to_string());
        device.add_entity("water_heater.dhw1".to_string());
        assert_eq!(device.entity_ids, vec!["water_heater.dhw1".to_string()]);

        device.remove_entity("water_heater.dhw1");
        assert!(device.entity_ids.is_empty());
    }
}
