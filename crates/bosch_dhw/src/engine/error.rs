use super::message::CommandError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned to callers of the engine's command API
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no integration found for entity: {0}")]
    UnknownEntity(String),

    #[error("integration channel not found: {0}")]
    IntegrationUnavailable(String),

    #[error("service {domain}.{service} is not registered")]
    UnknownService { domain: String, service: String },

    #[error("service {domain}.{service} is not provided by the integration owning {entity_id}")]
    ServiceNotForEntity {
        domain: String,
        service: String,
        entity_id: String,
    },

    #[error("service {domain}.{service} requires field '{field}'")]
    MissingServiceField {
        domain: String,
        service: String,
        field: String,
    },

    #[error("integration dropped the reply for {0}")]
    NoReply(String),

    #[error("command failed: {0}")]
    Command(#[source] CommandError),

    #[error("engine lock poisoned: {0}")]
    Poisoned(String),
}
