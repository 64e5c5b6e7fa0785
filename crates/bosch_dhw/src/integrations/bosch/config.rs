use std::time::Duration;

use serde::Deserialize;

fn default_scan_interval() -> u64 {
    30
}

/// Configuration for the Bosch integration
#[derive(Debug, Clone, Deserialize)]
pub struct BoschConfig {
    /// Identifier of the gateway connection; suffixes every entity's unique ID
    pub uuid: String,

    /// Seconds between circuit polls (default: 30)
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
}

impl BoschConfig {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            scan_interval: default_scan_interval(),
        }
    }

    /// Poll interval, never shorter than one second
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval.max(1))
    }
}
