//! Type-safe message system for the engine
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use tokio::sync::oneshot;

use super::device::DeviceInfo;
use super::entity::EntityState;
use super::service::ServiceSchema;
use super::water_heater::SetTemperatureRequest;

/// Error carried back to the engine when a command fails
pub type CommandError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a command: `Ok(true)` on success, `Ok(false)` when the device refused it
pub type CommandResult = Result<bool, CommandError>;

/// Reply channel attached to every command
pub type CommandReply = oneshot::Sender<CommandResult>;

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug)]
pub enum FromIntegrationMessage {
    /// An entity was created and registered
    EntityDiscovered {
        entity_id: String,
        unique_id: String,
        platform: &'static str,
        device: Option<DeviceInfo>,
        integration_name: String,
    },

    /// An entity was removed (integration unloaded, etc.)
    EntityRemoved { entity_id: String },

    /// An entity asked the engine to store a new state
    EntityStateChanged {
        entity_id: String,
        state: EntityState,
    },

    /// An integration registered a service that targets its entities
    ServiceRegistered {
        domain: String,
        service: String,
        schema: ServiceSchema,
        integration_name: String,
    },
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug)]
pub enum ToIntegrationMessage {
    SetTemperature {
        entity_id: String,
        request: SetTemperatureRequest,
        reply: CommandReply,
    },

    SetOperationMode {
        entity_id: String,
        operation_mode: String,
        reply: CommandReply,
    },

    /// Call of a service the integration registered
    CallService {
        entity_id: String,
        domain: String,
        service: String,
        data: serde_json::Value,
        reply: CommandReply,
    },
}

impl ToIntegrationMessage {
    /// Entity the command targets, used for routing
    pub fn entity_id(&self) -> &str {
        match self {
            ToIntegrationMessage::SetTemperature { entity_id, .. }
            | ToIntegrationMessage::SetOperationMode { entity_id, .. }
            | ToIntegrationMessage::CallService { entity_id, .. } => entity_id,
        }
    }
}
