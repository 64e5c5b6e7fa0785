use super::circuit::CircuitError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("water heater {0} has no circuit attached")]
    NoCircuit(String),

    #[error("unknown water heater: {0}")]
    UnknownEntity(String),

    #[error("unsupported service {domain}.{service}")]
    UnsupportedService { domain: String, service: String },

    #[error("invalid charge value {value}: {reason}")]
    InvalidCharge {
        value: serde_json::Value,
        reason: &'static str,
    },

    #[error(transparent)]
    Circuit(#[from] CircuitError),
}
