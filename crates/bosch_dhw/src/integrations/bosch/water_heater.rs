//! Water heater entity for a Bosch DHW circuit
//!
//! Projects the circuit's polled values into a water heater entity and
//! translates engine commands into circuit calls.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::DOMAIN;
use super::circuit::DhwCircuit;
use super::circuit::GatewayInfo;
use super::error::Error;
use super::error::Result;
use super::BoschSignal;
use crate::engine::Attributes;
use crate::engine::DeviceInfo;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::SignalBus;
use crate::engine::Subscription;
use crate::engine::water_heater::ATTR_TARGET_TEMP_HIGH;
use crate::engine::water_heater::ATTR_TARGET_TEMP_LOW;
use crate::engine::water_heater::STATE_OFF;
use crate::engine::water_heater::SetTemperatureRequest;
use crate::engine::water_heater::TemperatureUnit;
use crate::engine::water_heater::WaterHeaterEntity;
use crate::engine::water_heater::WaterHeaterFeatures;
use crate::engine::water_heater::base_attributes;

pub const DEFAULT_MIN_TEMP: f64 = 0.0;
pub const DEFAULT_MAX_TEMP: f64 = 99.0;

/// Parameter written by the charge service
pub const CHARGE: &str = "charge";

pub const ATTR_SETPOINT: &str = "setpoint";
pub const ATTR_SWITCHPOINT: &str = "switchpoint";
pub const ATTR_BOSCH_STATE: &str = "bosch_state";
pub const ATTR_TARGET_TEMP_STEP: &str = "target_temp_step";

const SUPPORT_FLAGS_HEATER: WaterHeaterFeatures =
    WaterHeaterFeatures::TARGET_TEMPERATURE.union(WaterHeaterFeatures::OPERATION_MODE);

/// Values read from the circuit on the last accepted refresh.
#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    state: Option<String>,
    target_temperature: Option<f64>,
    current_temperature: Option<f64>,
    operation_list: Vec<String>,
    mode: Option<String>,
    min_temp: f64,
    max_temp: f64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            state: None,
            target_temperature: None,
            current_temperature: None,
            operation_list: Vec::new(),
            mode: None,
            min_temp: DEFAULT_MIN_TEMP,
            max_temp: DEFAULT_MAX_TEMP,
        }
    }
}

impl Snapshot {
    fn read(circuit: &dyn DhwCircuit) -> Self {
        Self {
            state: circuit.state(),
            target_temperature: circuit.target_temperature(),
            current_temperature: circuit.current_temp(),
            operation_list: circuit.ha_modes(),
            mode: circuit.ha_mode(),
            min_temp: circuit.min_temp().unwrap_or(DEFAULT_MIN_TEMP),
            max_temp: circuit.max_temp().unwrap_or(DEFAULT_MAX_TEMP),
        }
    }

    /// Whether `fresh` differs in a field that triggers publication.
    ///
    /// Target temperature and mode are refreshed along with the rest but do
    /// not trigger an update on their own.
    fn should_publish(&self, fresh: &Snapshot) -> bool {
        self.state != fresh.state
            || self.operation_list != fresh.operation_list
            || self.current_temperature != fresh.current_temperature
            || self.min_temp != fresh.min_temp
            || self.max_temp != fresh.max_temp
    }
}

/// Water heater entity backed by one DHW circuit
pub struct BoschWaterHeater {
    entity_id: String,
    name: String,
    unique_id: String,
    uuid: String,
    circuit: Option<Arc<dyn DhwCircuit>>,
    gateway: GatewayInfo,
    temperature_unit: TemperatureUnit,
    snapshot: Snapshot,
    to_engine: FromIntegrationSender,
}

impl std::fmt::Debug for BoschWaterHeater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoschWaterHeater")
            .field("entity_id", &self.entity_id)
            .field("unique_id", &self.unique_id)
            .field("has_circuit", &self.circuit.is_some())
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

impl BoschWaterHeater {
    pub fn new(
        uuid: &str,
        circuit: Option<Arc<dyn DhwCircuit>>,
        gateway: &GatewayInfo,
        to_engine: FromIntegrationSender,
    ) -> Self {
        let name = circuit.as_ref().map(|c| c.name()).unwrap_or_default();
        Self {
            entity_id: format!("water_heater.{}", slugify(&name)),
            unique_id: format!("{}{}", name, uuid),
            name,
            uuid: uuid.to_string(),
            circuit,
            gateway: gateway.clone(),
            temperature_unit: TemperatureUnit::default(),
            snapshot: Snapshot::default(),
            to_engine,
        }
    }

    /// Register under `entity_id` instead of the one derived from the name
    pub fn with_entity_id(mut self, entity_id: String) -> Self {
        self.entity_id = entity_id;
        self
    }

    /// Circuit this entity projects, used by the poller
    pub fn circuit(&self) -> Option<&Arc<dyn DhwCircuit>> {
        self.circuit.as_ref()
    }

    /// Subscribe `this` to refresh signals until the subscription is dropped
    pub fn added_to_engine(this: Arc<Mutex<Self>>, signals: &SignalBus<BoschSignal>) -> Subscription {
        signals.connect(move |signal| {
            let heater = this.clone();
            async move {
                if signal == BoschSignal::DhwUpdate {
                    heater.lock().await.update().await;
                }
            }
        })
    }

    /// Refresh the cached state from the circuit
    ///
    /// Does nothing until the circuit finished its initial load. The engine is
    /// notified only when a monitored value changed, and the fresh values are
    /// kept only once the engine accepted them.
    pub async fn update(&mut self) {
        debug!("Updating Bosch water_heater {}", self.entity_id);
        let Some(circuit) = self.circuit.clone() else {
            return;
        };
        if !circuit.update_initialized() {
            return;
        }

        self.temperature_unit = TemperatureUnit::from_units_code(circuit.temp_units().as_deref());

        let fresh = Snapshot::read(circuit.as_ref());
        if !self.snapshot.should_publish(&fresh) {
            return;
        }

        let previous = std::mem::replace(&mut self.snapshot, fresh);
        if !self.publish_state().await {
            // Republish on the next refresh
            self.snapshot = previous;
        }
    }

    /// Send the current state to the engine, waiting for queue space
    async fn publish_state(&self) -> bool {
        let msg = FromIntegrationMessage::EntityStateChanged {
            entity_id: self.entity_id.clone(),
            state: self.entity_state(),
        };
        match self.to_engine.send(msg).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send EntityStateChanged message: {}", e);
                false
            }
        }
    }

    fn require_circuit(&self) -> Result<&Arc<dyn DhwCircuit>> {
        self.circuit
            .as_ref()
            .ok_or_else(|| Error::NoCircuit(self.entity_id.clone()))
    }

    /// Set a new target temperature
    ///
    /// A request without a finite temperature, or repeating the current
    /// target, is logged and dropped without touching the circuit. Zero is a
    /// valid target.
    pub async fn set_temperature(&self, request: SetTemperatureRequest) -> Result<()> {
        match request.temperature {
            Some(target)
                if target.is_finite() && Some(target) != self.snapshot.target_temperature =>
            {
                self.require_circuit()?.set_temperature(target).await?;
                Ok(())
            }
            _ => {
                error!("A target temperature must be provided");
                Ok(())
            }
        }
    }

    /// Set the operation mode; `true` when the circuit accepted it
    pub async fn set_operation_mode(&self, operation_mode: &str) -> Result<bool> {
        debug!(
            "Setting operation mode of {} to {}.",
            self.name, operation_mode
        );
        let status = self.require_circuit()?.set_ha_mode(operation_mode).await?;
        Ok(status > 0)
    }

    /// Start or stop a one-off tank charge
    ///
    /// The circuit forwards the value to the gateway as-is, so it is checked
    /// here: only non-empty strings and numbers are passed on.
    pub async fn service_charge(&self, value: serde_json::Value) -> Result<()> {
        validate_charge_value(&value)?;
        info!("Setting {} {} with value {}", self.name, CHARGE, value);
        self.require_circuit()?
            .set_service_call(CHARGE, value)
            .await?;
        Ok(())
    }
}

fn validate_charge_value(value: &serde_json::Value) -> Result<()> {
    let reason = match value {
        serde_json::Value::String(s) if s.trim().is_empty() => "empty string",
        serde_json::Value::String(_) | serde_json::Value::Number(_) => return Ok(()),
        _ => "expected a string or a number",
    };
    Err(Error::InvalidCharge {
        value: value.clone(),
        reason,
    })
}

/// Lowercase a name into an entity ID object id
fn slugify(name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug
    }
}

impl Entity for BoschWaterHeater {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> &'static str {
        "water_heater"
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(DeviceInfo {
            identifiers: vec![(DOMAIN.to_string(), self.unique_id.clone())],
            name: format!("Water heater {}", self.name),
            manufacturer: Some(self.gateway.device_model.clone()),
            model: Some(self.gateway.device_type.clone()),
            sw_version: Some(self.gateway.firmware.clone()),
            via_device: Some((DOMAIN.to_string(), self.uuid.clone())),
        })
    }

    fn state(&self) -> String {
        self.current_operation().unwrap_or("unknown").to_string()
    }

    fn state_attributes(&self) -> Attributes {
        let mut data = base_attributes(self);
        data.remove(ATTR_TARGET_TEMP_HIGH);
        data.remove(ATTR_TARGET_TEMP_LOW);
        data.insert(
            ATTR_SETPOINT.into(),
            self.circuit.as_ref().and_then(|c| c.setpoint()).into(),
        );
        data.insert(
            ATTR_SWITCHPOINT.into(),
            self.circuit
                .as_ref()
                .and_then(|c| c.active_program())
                .unwrap_or_default(),
        );
        data.insert(ATTR_BOSCH_STATE.into(), self.snapshot.state.clone().into());
        data.insert(ATTR_TARGET_TEMP_STEP.into(), 1.into());
        data
    }
}

impl WaterHeaterEntity for BoschWaterHeater {
    fn temperature_unit(&self) -> TemperatureUnit {
        self.temperature_unit
    }

    fn current_operation(&self) -> Option<&str> {
        self.snapshot.mode.as_deref()
    }

    fn operation_list(&self) -> &[String] {
        &self.snapshot.operation_list
    }

    fn current_temperature(&self) -> Option<f64> {
        self.snapshot.current_temperature
    }

    fn target_temperature(&self) -> Option<f64> {
        self.snapshot.target_temperature
    }

    fn min_temp(&self) -> f64 {
        self.snapshot.min_temp
    }

    fn max_temp(&self) -> f64 {
        self.snapshot.max_temp
    }

    /// Hides temperature control while the circuit is switched off
    fn supported_features(&self) -> WaterHeaterFeatures {
        let Some(circuit) = &self.circuit else {
            return SUPPORT_FLAGS_HEATER;
        };
        if circuit.ha_mode().as_deref() == Some(STATE_OFF)
            || circuit.setpoint().as_deref() == Some(STATE_OFF)
        {
            return WaterHeaterFeatures::OPERATION_MODE;
        }
        SUPPORT_FLAGS_HEATER
    }
}
