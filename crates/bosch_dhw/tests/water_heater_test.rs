use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bosch_dhw::engine::Error;
use bosch_dhw::engine::water_heater::SetTemperatureRequest;
use bosch_dhw::integrations::bosch::BoschConfig;
use bosch_dhw::integrations::bosch::BoschIntegration;
use bosch_dhw::integrations::bosch::CircuitError;
use bosch_dhw::integrations::bosch::DhwCircuit;
use bosch_dhw::integrations::bosch::Gateway;
use bosch_dhw::Engine;
use serde_json::json;
use tokio::task::JoinHandle;

const ENTITY_ID: &str = "water_heater.dhw1";

#[derive(Debug, Default)]
struct Recorded {
    temperatures: Vec<f64>,
    modes: Vec<String>,
    service_calls: Vec<(String, serde_json::Value)>,
}

/// Circuit with fixed readings that records every command
#[derive(Debug, Default)]
struct FakeCircuit {
    recorded: Mutex<Recorded>,
}

#[async_trait]
impl DhwCircuit for FakeCircuit {
    fn name(&self) -> String {
        "dhw1".to_string()
    }

    fn update_initialized(&self) -> bool {
        true
    }

    fn state(&self) -> Option<String> {
        Some("dhw_charging".to_string())
    }

    fn temp_units(&self) -> Option<String> {
        Some("C".to_string())
    }

    fn current_temp(&self) -> Option<f64> {
        Some(45.0)
    }

    fn target_temperature(&self) -> Option<f64> {
        Some(55.0)
    }

    fn min_temp(&self) -> Option<f64> {
        Some(30.0)
    }

    fn max_temp(&self) -> Option<f64> {
        Some(65.0)
    }

    fn ha_modes(&self) -> Vec<String> {
        vec!["eco".to_string(), "high_demand".to_string()]
    }

    fn ha_mode(&self) -> Option<String> {
        Some("high_demand".to_string())
    }

    fn setpoint(&self) -> Option<String> {
        Some("high".to_string())
    }

    fn active_program(&self) -> Option<serde_json::Value> {
        None
    }

    async fn update(&self) -> Result<(), CircuitError> {
        Ok(())
    }

    async fn set_temperature(&self, temperature: f64) -> Result<(), CircuitError> {
        self.recorded.lock().unwrap().temperatures.push(temperature);
        Ok(())
    }

    async fn set_ha_mode(&self, mode: &str) -> Result<i32, CircuitError> {
        if mode == "turbo" {
            return Err(CircuitError::Rejected("operation mode".to_string()));
        }
        self.recorded.lock().unwrap().modes.push(mode.to_string());
        Ok(if mode == "off" { 0 } else { 1 })
    }

    async fn set_service_call(
        &self,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), CircuitError> {
        self.recorded
            .lock()
            .unwrap()
            .service_calls
            .push((name.to_string(), value));
        Ok(())
    }
}

struct FakeGateway {
    circuit: Arc<FakeCircuit>,
}

impl Gateway for FakeGateway {
    fn device_model(&self) -> String {
        "Bosch".to_string()
    }

    fn device_type(&self) -> String {
        "NEFIT/EASY".to_string()
    }

    fn firmware(&self) -> String {
        "02.04".to_string()
    }

    fn dhw_circuits(&self) -> Vec<Arc<dyn DhwCircuit>> {
        vec![self.circuit.clone() as Arc<dyn DhwCircuit>]
    }
}

/// Start an engine running the Bosch integration and wait for the first state
async fn start() -> (Arc<Engine>, Arc<FakeCircuit>, JoinHandle<()>) {
    let circuit = Arc::new(FakeCircuit::default());
    let gateway = FakeGateway {
        circuit: circuit.clone(),
    };

    let mut engine = Engine::new();
    engine.register_integration(
        "bosch".to_string(),
        Box::new(BoschIntegration::new(gateway, &BoschConfig::new("123456"))),
    );
    let engine = Arc::new(engine);

    let runner = engine.clone();
    let run = tokio::spawn(async move { runner.run().await });

    for _ in 0..100 {
        if engine.state_snapshot().entities.contains_key(ENTITY_ID) {
            // Let the service registration land as well
            tokio::time::sleep(Duration::from_millis(20)).await;
            return (engine, circuit, run);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("water heater never published its state");
}

#[tokio::test]
async fn test_state_published_to_engine() {
    let (engine, _circuit, _run) = start().await;
    assert!(engine.has_entity(ENTITY_ID));

    let snapshot = engine.state_snapshot();
    let state = &snapshot.entities[ENTITY_ID];
    assert_eq!(state.state, "high_demand");
    assert_eq!(state.attributes["current_temperature"], json!(45.0));
    assert_eq!(state.attributes["min_temp"], json!(30.0));
    assert_eq!(state.attributes["max_temp"], json!(65.0));
    assert_eq!(state.attributes["bosch_state"], json!("dhw_charging"));
    assert!(!state.attributes.contains_key("target_temp_high"));

    let device = snapshot.device_for_entity(ENTITY_ID).unwrap();
    assert_eq!(device.id, "bosch:dhw1123456");
    assert_eq!(device.info.name, "Water heater dhw1");
    assert_eq!(device.info.model.as_deref(), Some("NEFIT/EASY"));
}

#[tokio::test]
async fn test_set_operation_mode_through_engine() {
    let (engine, circuit, _run) = start().await;

    assert!(engine.set_operation_mode(ENTITY_ID, "eco").await.unwrap());
    assert!(!engine.set_operation_mode(ENTITY_ID, "off").await.unwrap());

    let err = engine
        .set_operation_mode(ENTITY_ID, "turbo")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Command(_)));
    let source = std::error::Error::source(&err).unwrap();
    assert_eq!(source.to_string(), "gateway rejected the value for operation mode");

    assert_eq!(
        circuit.recorded.lock().unwrap().modes,
        vec!["eco".to_string(), "off".to_string()]
    );
}

#[tokio::test]
async fn test_set_temperature_through_engine() {
    let (engine, circuit, _run) = start().await;

    // Same as the current target: dropped before reaching the circuit
    engine
        .set_temperature(ENTITY_ID, SetTemperatureRequest::new(55.0))
        .await
        .unwrap();
    engine
        .set_temperature(ENTITY_ID, SetTemperatureRequest::default())
        .await
        .unwrap();
    assert!(circuit.recorded.lock().unwrap().temperatures.is_empty());

    engine
        .set_temperature(ENTITY_ID, SetTemperatureRequest::new(60.0))
        .await
        .unwrap();
    assert_eq!(circuit.recorded.lock().unwrap().temperatures, vec![60.0]);
}

#[tokio::test]
async fn test_charge_service_through_engine() {
    let (engine, circuit, _run) = start().await;

    let err = engine
        .call_service("bosch", "charge_start", ENTITY_ID, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingServiceField { ref field, .. } if field == "value"));

    let err = engine
        .call_service("bosch", "charge_stop", ENTITY_ID, json!({"value": "stop"}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownService { .. }));

    let err = engine
        .call_service("bosch", "charge_start", ENTITY_ID, json!({"value": null}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Command(_)));

    assert!(engine
        .call_service("bosch", "charge_start", ENTITY_ID, json!({"value": "start"}))
        .await
        .unwrap());

    assert_eq!(
        circuit.recorded.lock().unwrap().service_calls,
        vec![("charge".to_string(), json!("start"))]
    );
}

#[tokio::test]
async fn test_unknown_entity() {
    let (engine, _circuit, _run) = start().await;

    let err = engine
        .set_operation_mode("water_heater.nope", "eco")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownEntity(ref id) if id == "water_heater.nope"));
}

#[tokio::test]
async fn test_shutdown_removes_entities() {
    let (engine, _circuit, run) = start().await;

    run.abort();
    let _ = run.await;
    let Ok(mut engine) = Arc::try_unwrap(engine) else {
        panic!("engine still shared after the run loop ended");
    };

    engine.shutdown().await;

    let snapshot = engine.state_snapshot();
    assert!(!engine.has_entity(ENTITY_ID));
    assert!(!snapshot.entities.contains_key(ENTITY_ID));
    assert!(snapshot.devices.is_empty());

    let err = engine
        .set_operation_mode(ENTITY_ID, "eco")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownEntity(_)));
}
