use tracing::info;

use pandapwr_client::{ClientConfig, PandaPwrClient};

use crate::config::DeviceEntry;
use crate::registry::SetupError;

pub const ENTRY_TITLE: &str = "Panda PWR";

/// User-facing setup step: checks that a device answers at `ip_address`.
///
/// Uses a throwaway client; the registry builds the long-lived one.
pub async fn validate_input(ip_address: &str, config: &ClientConfig) -> Result<DeviceEntry, SetupError> {
    let entry = DeviceEntry::new(ip_address.trim());
    let client = PandaPwrClient::new(entry.endpoint(), config.clone())?;

    if !client.test_connection().await {
        return Err(SetupError::CannotConnect {
            ip_address: entry.ip_address,
        });
    }

    info!(ip = %entry.ip_address, title = ENTRY_TITLE, "device accepted");
    Ok(entry)
}
