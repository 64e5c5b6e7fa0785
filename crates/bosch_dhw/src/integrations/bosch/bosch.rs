use std::collections::HashMap;
use std::collections::HashSet;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::BoschConfig;
use super::BoschSignal;
use super::DOMAIN;
use super::circuit::DhwCircuit;
use super::circuit::Gateway;
use super::error::Error;
use super::error::Result;
use super::water_heater::BoschWaterHeater;
use crate::engine::CommandReply;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::ServiceSchema;
use crate::engine::SignalBus;
use crate::engine::Subscription;
use crate::engine::ToIntegrationMessage;
use crate::engine::water_heater::SetTemperatureRequest;

/// Service starting (or stopping) a one-off tank charge
pub const SERVICE_CHARGE_START: &str = "charge_start";

/// Field of the charge service carrying the value written to the circuit
const ATTR_VALUE: &str = "value";

/// Type alias for the water heaters keyed by entity ID
type WaterHeatersMap = HashMap<String, Arc<Mutex<BoschWaterHeater>>>;

/// Bosch thermostat integration
///
/// Creates one water heater per DHW circuit of the gateway, polls the circuits
/// and fans refresh signals out to the water heaters.
pub struct BoschIntegration<G: Gateway> {
    gateway: Arc<G>,
    config: BoschConfig,
    signals: SignalBus<BoschSignal>,
    water_heaters: WaterHeatersMap,
    /// Refresh subscriptions, one per water heater
    subscriptions: Vec<Subscription>,
    to_engine: Option<FromIntegrationSender>,
    /// Handle to the background polling task
    poll_task: Option<JoinHandle<()>>,
}

impl<G: Gateway + 'static> BoschIntegration<G> {
    /// Create a new Bosch integration
    pub fn new(gateway: G, config: &BoschConfig) -> Self {
        Self {
            gateway: Arc::new(gateway),
            config: config.clone(),
            signals: SignalBus::new(),
            water_heaters: HashMap::new(),
            subscriptions: Vec::new(),
            to_engine: None,
            poll_task: None,
        }
    }

    /// Bus the water heaters listen on
    pub fn signals(&self) -> &SignalBus<BoschSignal> {
        &self.signals
    }

    /// Poll the circuits once the platform is ready, then every `interval`
    async fn poll_task(
        circuits: Vec<Arc<dyn DhwCircuit>>,
        signals: SignalBus<BoschSignal>,
        mut ready: broadcast::Receiver<BoschSignal>,
        interval: Duration,
    ) {
        loop {
            match ready.recv().await {
                Ok(BoschSignal::PlatformReady { platform, entities }) => {
                    debug!("Platform {} ready with {} entities", platform, entities);
                    break;
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
        drop(ready);

        // The first tick completes immediately
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            Self::refresh_circuits(&circuits, &signals).await;
        }
    }

    /// Fetch fresh values for every circuit and tell the water heaters to refresh
    async fn refresh_circuits(
        circuits: &[Arc<dyn DhwCircuit>],
        signals: &SignalBus<BoschSignal>,
    ) {
        for circuit in circuits {
            if let Err(e) = circuit.update().await {
                warn!("Failed to update circuit {}: {}", circuit.name(), e);
            }
        }
        signals.send(BoschSignal::DhwUpdate);
    }

    /// Register an entity with the engine
    async fn register_entity(entity: &dyn Entity, to_engine: &FromIntegrationSender) {
        let msg = FromIntegrationMessage::EntityDiscovered {
            entity_id: entity.entity_id().to_string(),
            unique_id: entity.unique_id().to_string(),
            platform: entity.platform(),
            device: entity.device_info(),
            integration_name: DOMAIN.to_string(),
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send EntityDiscovered message: {}", e);
        } else {
            info!("Registered entity: {}", entity.entity_id());
        }
    }

    /// Register the charge service with the engine
    async fn register_services(to_engine: &FromIntegrationSender) {
        let msg = FromIntegrationMessage::ServiceRegistered {
            domain: DOMAIN.to_string(),
            service: SERVICE_CHARGE_START.to_string(),
            schema: ServiceSchema::new().require(ATTR_VALUE),
            integration_name: DOMAIN.to_string(),
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send ServiceRegistered message: {}", e);
        }
    }

    /// Notify the engine that an entity has been removed
    async fn notify_entity_removed(entity_id: &str, to_engine: &FromIntegrationSender) {
        let msg = FromIntegrationMessage::EntityRemoved {
            entity_id: entity_id.to_string(),
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send EntityRemoved message: {}", e);
        } else {
            info!("Notified engine of entity removal: {}", entity_id);
        }
    }

    fn water_heater(&self, entity_id: &str) -> Result<Arc<Mutex<BoschWaterHeater>>> {
        self.water_heaters
            .get(entity_id)
            .cloned()
            .ok_or_else(|| Error::UnknownEntity(entity_id.to_string()))
    }

    pub async fn set_temperature(
        &self,
        entity_id: &str,
        request: SetTemperatureRequest,
    ) -> Result<bool> {
        let heater = self.water_heater(entity_id)?;
        heater.lock().await.set_temperature(request).await?;
        Ok(true)
    }

    pub async fn set_operation_mode(&self, entity_id: &str, operation_mode: &str) -> Result<bool> {
        let heater = self.water_heater(entity_id)?;
        let accepted = heater.lock().await.set_operation_mode(operation_mode).await?;
        Ok(accepted)
    }

    pub async fn call_service(
        &self,
        entity_id: &str,
        domain: &str,
        service: &str,
        data: &serde_json::Value,
    ) -> Result<bool> {
        if domain != DOMAIN || service != SERVICE_CHARGE_START {
            return Err(Error::UnsupportedService {
                domain: domain.to_string(),
                service: service.to_string(),
            });
        }

        let value = data
            .get(ATTR_VALUE)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let heater = self.water_heater(entity_id)?;
        heater.lock().await.service_charge(value).await?;
        Ok(true)
    }

    fn send_reply(reply: CommandReply, entity_id: &str, result: Result<bool>) {
        if let Err(e) = &result {
            warn!("Command for {} failed: {}", entity_id, e);
        }
        if reply.send(result.map_err(Into::into)).is_err() {
            debug!("Caller went away before the reply for {}", entity_id);
        }
    }
}

/// First of `base`, `base_2`, `base_3`, ... that is not `taken`
fn unique_entity_id(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[async_trait]
impl<G: Gateway + 'static> Integration for BoschIntegration<G> {
    fn name(&self) -> &str {
        DOMAIN
    }

    async fn setup(
        &mut self,
        tx: FromIntegrationSender,
    ) -> std::result::Result<(), Box<dyn StdError + Send>> {
        // Store sender for sending events to engine
        self.to_engine = Some(tx.clone());

        let info = self.gateway.info();
        let circuits = self.gateway.dhw_circuits();
        info!(
            "Setting up {} water heater(s) for gateway {} ({})",
            circuits.len(),
            self.config.uuid,
            info.device_type
        );

        let mut unique_ids = HashSet::new();
        let mut polled = Vec::with_capacity(circuits.len());
        for circuit in circuits {
            let heater = BoschWaterHeater::new(
                &self.config.uuid,
                Some(circuit.clone()),
                &info,
                tx.clone(),
            );
            if !unique_ids.insert(heater.unique_id().to_string()) {
                warn!("Skipping duplicate circuit: {}", heater.unique_id());
                continue;
            }

            let entity_id =
                unique_entity_id(heater.entity_id(), |id| self.water_heaters.contains_key(id));
            let heater = heater.with_entity_id(entity_id.clone());
            polled.push(circuit);

            Self::register_entity(&heater, &tx).await;

            let heater = Arc::new(Mutex::new(heater));
            self.subscriptions
                .push(BoschWaterHeater::added_to_engine(heater.clone(), &self.signals));
            self.water_heaters.insert(entity_id, heater);
        }

        // Subscribe before announcing readiness so the poller cannot miss it
        let ready = self.signals.subscribe();
        let task = tokio::spawn(Self::poll_task(
            polled,
            self.signals.clone(),
            ready,
            self.config.scan_interval(),
        ));
        self.poll_task = Some(task);

        self.signals.send(BoschSignal::PlatformReady {
            platform: "water_heater",
            entities: self.water_heaters.len(),
        });

        Self::register_services(&tx).await;

        info!("Bosch integration ready to handle commands");
        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> std::result::Result<(), Box<dyn StdError + Send>> {
        match msg {
            ToIntegrationMessage::SetTemperature {
                entity_id,
                request,
                reply,
            } => {
                info!(
                    "Handling set temperature for {}: {:?}",
                    entity_id, request.temperature
                );
                let result = self.set_temperature(&entity_id, request).await;
                Self::send_reply(reply, &entity_id, result);
            }
            ToIntegrationMessage::SetOperationMode {
                entity_id,
                operation_mode,
                reply,
            } => {
                info!(
                    "Handling operation mode for {}: {}",
                    entity_id, operation_mode
                );
                let result = self.set_operation_mode(&entity_id, &operation_mode).await;
                Self::send_reply(reply, &entity_id, result);
            }
            ToIntegrationMessage::CallService {
                entity_id,
                domain,
                service,
                data,
                reply,
            } => {
                info!("Handling service {}.{} for {}", domain, service, entity_id);
                let result = self
                    .call_service(&entity_id, &domain, &service, &data)
                    .await;
                Self::send_reply(reply, &entity_id, result);
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> std::result::Result<(), Box<dyn StdError + Send>> {
        info!("Bosch integration shutting down");

        self.subscriptions.clear();
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }

        if let Some(tx) = self.to_engine.take() {
            for entity_id in self.water_heaters.keys() {
                Self::notify_entity_removed(entity_id, &tx).await;
            }
        }
        self.water_heaters.clear();

        Ok(())
    }
}
