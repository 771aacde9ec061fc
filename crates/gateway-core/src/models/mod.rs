//! Shared data types: errors, client identity, service topology, and
//! configuration.

pub mod error;
pub mod identity;
pub mod service;
pub mod settings;

pub use error::GatewayError;
pub use identity::{ClientIdentity, Tier};
pub use service::{HealthRecord, Instance, Service, ServiceName};
pub use settings::Settings;
