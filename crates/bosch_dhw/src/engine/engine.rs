use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::device::Device;
use super::error::Error;
use super::error::Result;
use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::ToIntegrationSender;
use super::message::CommandResult;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::service::Service;
use super::state::State;
use super::water_heater::SetTemperatureRequest;

/// Entity host engine
///
/// This structure handles the flow of events from integrations, routes commands to the
/// integration owning each entity, and maintains a view of the world with State.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Map of entity_id -> integration name for routing messages
    entity_integration_map: std::sync::Mutex<HashMap<String, String>>,

    /// Registered services keyed by (domain, service)
    services: std::sync::Mutex<HashMap<(String, String), Service>>,

    /// Communication channels to integrations (for commands)
    integration_channels: HashMap<String, ToIntegrationSender>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Handles for integration tasks
    integration_handles: Vec<JoinHandle<()>>,
}

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            entity_integration_map: std::sync::Mutex::new(HashMap::new()),
            services: std::sync::Mutex::new(HashMap::new()),
            integration_channels: HashMap::new(),
            message_rx: Mutex::new(message_rx),
            message_tx,
            integration_handles: Vec::new(),
        }
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&mut self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        self.integration_channels
            .insert(name.clone(), to_integration_tx);

        // Spawn integration task
        let handle = tokio::spawn(async move {
            // Setup integration (gives it the sender for events)
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        self.integration_handles.push(handle);
    }

    /// Stop accepting commands and wait for every integration to shut down
    ///
    /// Events the integrations sent while stopping (entity removals) are
    /// applied before returning. Call this after the `run` loop has ended.
    pub async fn shutdown(&mut self) {
        // Closing the command channels ends each integration's command loop
        self.integration_channels.clear();
        for handle in self.integration_handles.drain(..) {
            if let Err(e) = handle.await {
                warn!("Integration task ended abnormally: {}", e);
            }
        }

        let rx = self.message_rx.get_mut();
        let mut pending = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            pending.push(msg);
        }
        for msg in pending {
            self.handle_event(msg);
        }
    }

    /// Whether an entity has been registered by any integration
    pub fn has_entity(&self, entity_id: &str) -> bool {
        self.entity_integration_map
            .lock()
            .map(|map| map.contains_key(entity_id))
            .unwrap_or(false)
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Ask a water heater to change its target temperature
    pub async fn set_temperature(
        &self,
        entity_id: &str,
        request: SetTemperatureRequest,
    ) -> Result<bool> {
        self.request(entity_id, |reply| ToIntegrationMessage::SetTemperature {
            entity_id: entity_id.to_string(),
            request,
            reply,
        })
        .await
    }

    /// Ask a water heater to change its operation mode
    pub async fn set_operation_mode(&self, entity_id: &str, operation_mode: &str) -> Result<bool> {
        self.request(entity_id, |reply| ToIntegrationMessage::SetOperationMode {
            entity_id: entity_id.to_string(),
            operation_mode: operation_mode.to_string(),
            reply,
        })
        .await
    }

    /// Call a service registered by an integration, targeting one of its entities
    ///
    /// The call data is checked against the service schema before it is routed.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        entity_id: &str,
        data: serde_json::Value,
    ) -> Result<bool> {
        let registered = {
            let services = self
                .services
                .lock()
                .map_err(|e| Error::Poisoned(e.to_string()))?;
            services
                .get(&(domain.to_string(), service.to_string()))
                .cloned()
                .ok_or_else(|| Error::UnknownService {
                    domain: domain.to_string(),
                    service: service.to_string(),
                })?
        };

        if let Some(field) = registered.schema.missing_field(&data) {
            return Err(Error::MissingServiceField {
                domain: domain.to_string(),
                service: service.to_string(),
                field: field.to_string(),
            });
        }

        if self.integration_for(entity_id)? != registered.integration_name {
            return Err(Error::ServiceNotForEntity {
                domain: domain.to_string(),
                service: service.to_string(),
                entity_id: entity_id.to_string(),
            });
        }

        self.request(entity_id, |reply| ToIntegrationMessage::CallService {
            entity_id: entity_id.to_string(),
            domain: domain.to_string(),
            service: service.to_string(),
            data,
            reply,
        })
        .await
    }

    /// Route a command to the owning integration and wait for its reply
    async fn request<F>(&self, entity_id: &str, build: F) -> Result<bool>
    where
        F: FnOnce(oneshot::Sender<CommandResult>) -> ToIntegrationMessage,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_command(build(reply_tx))?;

        reply_rx
            .await
            .map_err(|_| Error::NoReply(entity_id.to_string()))?
            .map_err(Error::Command)
    }

    fn integration_for(&self, entity_id: &str) -> Result<String> {
        let map = self
            .entity_integration_map
            .lock()
            .map_err(|e| Error::Poisoned(e.to_string()))?;

        map.get(entity_id)
            .cloned()
            .ok_or_else(|| Error::UnknownEntity(entity_id.to_string()))
    }

    /// Send a command to an integration
    ///
    /// Routes the command to the appropriate integration based on entity_id.
    fn send_command(&self, msg: ToIntegrationMessage) -> Result<()> {
        let integration_name = self.integration_for(msg.entity_id())?;

        let tx = self
            .integration_channels
            .get(&integration_name)
            .ok_or_else(|| Error::IntegrationUnavailable(integration_name.clone()))?;

        tx.send(msg)
            .map_err(|_| Error::IntegrationUnavailable(integration_name))
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) {
        info!("Engine starting");

        // Main event loop - only receives FromIntegration messages
        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
    }

    /// Handle an event from an integration
    fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                unique_id,
                platform,
                device,
                integration_name,
            } => {
                info!(
                    "Entity discovered: {} ({}, unique_id={}, from {})",
                    entity_id, platform, unique_id, integration_name
                );

                // Record which integration owns this entity for command routing.
                // State is not populated until the first state-change message arrives.
                if let Ok(mut map) = self.entity_integration_map.lock() {
                    map.insert(entity_id.clone(), integration_name);
                }

                if let Some(info) = device {
                    let Some(device_id) = info.device_id() else {
                        warn!("Device of {} has no identifiers, not registering", entity_id);
                        return;
                    };
                    let mut state = State::clone(&self.state.load());
                    state
                        .devices
                        .entry(device_id.clone())
                        .or_insert_with(|| Device::new(device_id, info))
                        .add_entity(entity_id);
                    self.state.store(Arc::new(state));
                }
            }
            FromIntegrationMessage::EntityRemoved { entity_id } => {
                info!("Entity removed: {}", entity_id);

                {
                    let mut state = State::clone(&self.state.load());
                    state.entities.remove(&entity_id);
                    for device in state.devices.values_mut() {
                        device.remove_entity(&entity_id);
                    }
                    state.devices.retain(|_, device| !device.entity_ids.is_empty());
                    self.state.store(Arc::new(state));
                }

                // Remove from routing map
                if let Ok(mut map) = self.entity_integration_map.lock() {
                    map.remove(&entity_id);
                }
            }
            FromIntegrationMessage::EntityStateChanged { entity_id, state } => {
                debug!("Entity state changed: {} -> {}", entity_id, state.state);

                let mut snapshot = State::clone(&self.state.load());
                snapshot.entities.insert(entity_id, state);
                self.state.store(Arc::new(snapshot));
            }
            FromIntegrationMessage::ServiceRegistered {
                domain,
                service,
                schema,
                integration_name,
            } => {
                info!(
                    "Service registered: {}.{} (from {})",
                    domain, service, integration_name
                );

                if let Ok(mut services) = self.services.lock() {
                    services.insert(
                        (domain.clone(), service.clone()),
                        Service {
                            domain,
                            service,
                            schema,
                            integration_name,
                        },
                    );
                }
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
