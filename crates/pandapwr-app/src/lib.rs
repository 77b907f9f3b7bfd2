pub mod api;
pub mod config;
pub mod flow;
pub mod registry;

pub use config::{DeviceEntry, IntegrationConfig};
pub use registry::{ChannelRegistry, SetupError};
