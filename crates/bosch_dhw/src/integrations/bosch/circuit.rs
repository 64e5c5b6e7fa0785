use std::sync::Arc;

use async_trait::async_trait;

/// Error reported by the vendor client for a circuit or gateway request
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CircuitError {
    #[error("request to {path} failed: {reason}")]
    Request { path: String, reason: String },

    #[error("gateway did not answer in time")]
    Timeout,

    #[error("gateway rejected the value for {0}")]
    Rejected(String),
}

/// A domestic hot water circuit as exposed by the vendor client
///
/// Reads return the values cached by the client's last `update()`. This trait
/// allows the water heater to be tested against a mock circuit.
#[async_trait]
pub trait DhwCircuit: Send + Sync {
    /// Circuit name, e.g. "dhw1"
    fn name(&self) -> String;

    /// Whether the client finished its initial data load
    fn update_initialized(&self) -> bool;

    /// Raw device state tag
    fn state(&self) -> Option<String>;

    /// Unit code reported by the device ("C" or "F")
    fn temp_units(&self) -> Option<String>;

    fn current_temp(&self) -> Option<f64>;

    fn target_temperature(&self) -> Option<f64>;

    fn min_temp(&self) -> Option<f64>;

    fn max_temp(&self) -> Option<f64>;

    /// Operation modes the circuit accepts
    fn ha_modes(&self) -> Vec<String>;

    /// Current operation mode
    fn ha_mode(&self) -> Option<String>;

    /// Active setpoint name, "off" when switched off
    fn setpoint(&self) -> Option<String>;

    /// Active switchpoint of the circuit's schedule
    fn active_program(&self) -> Option<serde_json::Value>;

    /// Fetch fresh values from the gateway
    async fn update(&self) -> Result<(), CircuitError>;

    async fn set_temperature(&self, temperature: f64) -> Result<(), CircuitError>;

    /// Set the operation mode, returning the client's status code (> 0 on success)
    async fn set_ha_mode(&self, mode: &str) -> Result<i32, CircuitError>;

    /// Write a raw named parameter. The client does not validate `value`.
    async fn set_service_call(
        &self,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), CircuitError>;
}

/// The gateway owning the circuits
pub trait Gateway: Send + Sync {
    /// Manufacturer as reported by the gateway
    fn device_model(&self) -> String;

    /// Gateway type
    fn device_type(&self) -> String;

    fn firmware(&self) -> String;

    fn dhw_circuits(&self) -> Vec<Arc<dyn DhwCircuit>>;

    /// Descriptive metadata copied into each water heater
    fn info(&self) -> GatewayInfo {
        GatewayInfo {
            device_model: self.device_model(),
            device_type: self.device_type(),
            firmware: self.firmware(),
        }
    }
}

/// Gateway metadata a water heater reports as its device info
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayInfo {
    pub device_model: String,
    pub device_type: String,
    pub firmware: String,
}

/// Mock circuit for testing
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MockCircuitState {
    pub name: String,
    pub initialized: bool,
    pub state: Option<String>,
    pub temp_units: Option<String>,
    pub current_temp: Option<f64>,
    pub target_temperature: Option<f64>,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub ha_modes: Vec<String>,
    pub ha_mode: Option<String>,
    pub setpoint: Option<String>,
    pub active_program: Option<serde_json::Value>,
    /// Status returned by set_ha_mode
    pub mode_status: i32,
    /// Error returned by every command when set
    pub fail_with: Option<CircuitError>,

    pub updates: usize,
    pub set_temperature_calls: Vec<f64>,
    pub set_mode_calls: Vec<String>,
    pub service_calls: Vec<(String, serde_json::Value)>,
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockCircuit {
    pub inner: std::sync::Mutex<MockCircuitState>,
}

#[cfg(test)]
impl MockCircuit {
    /// A circuit reporting the values of a charging tank
    pub fn charging() -> Self {
        Self::with(|s| {
            s.name = "dhw1".to_string();
            s.initialized = true;
            s.state = Some("dhw_charging".to_string());
            s.temp_units = Some("C".to_string());
            s.current_temp = Some(45.0);
            s.target_temperature = Some(55.0);
            s.min_temp = Some(30.0);
            s.max_temp = Some(65.0);
            s.ha_modes = vec!["eco".to_string(), "high_demand".to_string(), "off".to_string()];
            s.ha_mode = Some("high_demand".to_string());
            s.setpoint = Some("high".to_string());
            s.active_program = Some(serde_json::json!({"time": "06:00", "setpoint": "high"}));
            s.mode_status = 1;
        })
    }

    pub fn with(f: impl FnOnce(&mut MockCircuitState)) -> Self {
        let mut state = MockCircuitState::default();
        f(&mut state);
        Self {
            inner: std::sync::Mutex::new(state),
        }
    }

    pub fn modify(&self, f: impl FnOnce(&mut MockCircuitState)) {
        f(&mut self.inner.lock().unwrap());
    }

    pub fn snapshot(&self) -> MockCircuitState {
        self.inner.lock().unwrap().clone()
    }

    fn fail(&self) -> Result<(), CircuitError> {
        match &self.inner.lock().unwrap().fail_with {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl DhwCircuit for MockCircuit {
    fn name(&self) -> String {
        self.inner.lock().unwrap().name.clone()
    }

    fn update_initialized(&self) -> bool {
        self.inner.lock().unwrap().initialized
    }

    fn state(&self) -> Option<String> {
        self.inner.lock().unwrap().state.clone()
    }

    fn temp_units(&self) -> Option<String> {
        self.inner.lock().unwrap().temp_units.clone()
    }

    fn current_temp(&self) -> Option<f64> {
        self.inner.lock().unwrap().current_temp
    }

    fn target_temperature(&self) -> Option<f64> {
        self.inner.lock().unwrap().target_temperature
    }

    fn min_temp(&self) -> Option<f64> {
        self.inner.lock().unwrap().min_temp
    }

    fn max_temp(&self) -> Option<f64> {
        self.inner.lock().unwrap().max_temp
    }

    fn ha_modes(&self) -> Vec<String> {
        self.inner.lock().unwrap().ha_modes.clone()
    }

    fn ha_mode(&self) -> Option<String> {
        self.inner.lock().unwrap().ha_mode.clone()
    }

    fn setpoint(&self) -> Option<String> {
        self.inner.lock().unwrap().setpoint.clone()
    }

    fn active_program(&self) -> Option<serde_json::Value> {
        self.inner.lock().unwrap().active_program.clone()
    }

    async fn update(&self) -> Result<(), CircuitError> {
        self.fail()?;
        self.inner.lock().unwrap().updates += 1;
        Ok(())
    }

    async fn set_temperature(&self, temperature: f64) -> Result<(), CircuitError> {
        self.fail()?;
        self.inner
            .lock()
            .unwrap()
            .set_temperature_calls
            .push(temperature);
        Ok(())
    }

    async fn set_ha_mode(&self, mode: &str) -> Result<i32, CircuitError> {
        self.fail()?;
        let mut inner = self.inner.lock().unwrap();
        inner.set_mode_calls.push(mode.to_string());
        Ok(inner.mode_status)
    }

    async fn set_service_call(
        &self,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), CircuitError> {
        self.fail()?;
        self.inner
            .lock()
            .unwrap()
            .service_calls
            .push((name.to_string(), value));
        Ok(())
    }
}

/// Mock gateway for testing
#[cfg(test)]
#[derive(Default)]
pub struct MockGateway {
    pub circuits: Vec<Arc<MockCircuit>>,
}

#[cfg(test)]
impl Gateway for MockGateway {
    fn device_model(&self) -> String {
        "Bosch".to_string()
    }

    fn device_type(&self) -> String {
        "IVT".to_string()
    }

    fn firmware(&self) -> String {
        "04.08.02".to_string()
    }

    fn dhw_circuits(&self) -> Vec<Arc<dyn DhwCircuit>> {
        self.circuits
            .iter()
            .map(|c| c.clone() as Arc<dyn DhwCircuit>)
            .collect()
    }
}
