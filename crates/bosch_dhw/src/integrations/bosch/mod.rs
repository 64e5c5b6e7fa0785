// Private module - allowed by clippy.toml allow-private-module-inception
#[allow(clippy::module_inception)]
mod bosch;
mod circuit;
mod config;
mod error;
mod water_heater;

use anyhow::Context;
pub use bosch::BoschIntegration;
pub use bosch::SERVICE_CHARGE_START;
pub use circuit::CircuitError;
pub use circuit::DhwCircuit;
pub use circuit::Gateway;
pub use circuit::GatewayInfo;
pub use config::BoschConfig;
pub use error::Error;
pub use error::Result;
pub use water_heater::BoschWaterHeater;
pub use water_heater::DEFAULT_MAX_TEMP;
pub use water_heater::DEFAULT_MIN_TEMP;

use crate::config::Config;

/// Domain used for device identifiers and services
pub const DOMAIN: &str = "bosch";

/// Signals sent on the integration's bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoschSignal {
    /// Circuits were polled; water heaters should refresh
    DhwUpdate,

    /// All entities of a platform were created
    PlatformReady {
        platform: &'static str,
        entities: usize,
    },
}

/// Build the integration for `gateway` when the config enables it
pub fn init_bosch<G: Gateway + 'static>(
    config: &Config,
    gateway: G,
) -> anyhow::Result<Option<BoschIntegration<G>>> {
    let bosch_config = if let Some(c) = &config.integrations.bosch {
        c
    } else {
        return Ok(None);
    };

    validate(bosch_config).context("Invalid Bosch integration config")?;
    Ok(Some(BoschIntegration::new(gateway, bosch_config)))
}

fn validate(config: &BoschConfig) -> anyhow::Result<()> {
    anyhow::ensure!(!config.uuid.trim().is_empty(), "uuid must not be empty");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::bosch::circuit::MockGateway;

    #[test]
    fn test_init_without_config() {
        let config = Config::default();
        assert!(init_bosch(&config, MockGateway::default()).unwrap().is_none());
    }

    #[test]
    fn test_init_with_config() {
        let config = Config::parse(
            r#"
            [integrations.bosch]
            uuid = "123456"
            "#,
        )
        .unwrap();

        let integration = init_bosch(&config, MockGateway::default()).unwrap();
        assert!(integration.is_some());
    }

    #[test]
    fn test_init_rejects_blank_uuid() {
        let config = Config::parse(
            r#"
            [integrations.bosch]
            uuid = "  "
            "#,
        )
        .unwrap();

        let err = init_bosch(&config, MockGateway::default()).err().unwrap();
        assert!(format!("{:#}", err).contains("uuid must not be empty"));
    }
}
