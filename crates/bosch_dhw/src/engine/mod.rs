mod device;
// Private module - allowed by clippy.toml allow-private-module-inception
#[allow(clippy::module_inception)]
mod engine;
mod entity;
mod error;
mod integration;
mod message;
mod service;
pub mod signal;
pub mod state;
pub mod water_heater;

pub use device::Device;
pub use device::DeviceInfo;
pub use engine::Engine;
pub use entity::Attributes;
pub use entity::Entity;
pub use entity::EntityState;
pub use error::Error;
pub use error::Result;
pub use integration::FromIntegrationReceiver;
pub use integration::FromIntegrationSender;
pub use integration::Integration;
pub use message::CommandError;
pub use message::CommandReply;
pub use message::CommandResult;
pub use message::FromIntegrationMessage;
pub use message::ToIntegrationMessage;
pub use service::Service;
pub use service::ServiceSchema;
pub use signal::SignalBus;
pub use signal::Subscription;
pub use state::State;
