use aws_config::{BehaviorVersion as version, Region};

use crate::error::ConfigError;

/// Account id accepted by Glacier as "the account owning the credentials".
pub const DEFAULT_ACCOUNT: &str = "-";

/// Coordinates of a single vault, shared by both commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    pub region: String,
    pub account: String,
    pub vault: String,
}

impl VaultConfig {
    pub fn new(region: &str, account: &str, vault: &str) -> Result<Self, ConfigError> {
        Ok(VaultConfig {
            region: required("region", region)?,
            account: required("account", account)?,
            vault: required("vault", vault)?,
        })
    }

    /// Loads credentials from the default provider chain, pinned to this region.
    pub async fn load_sdk_config(&self) -> aws_config::SdkConfig {
        aws_config::defaults(version::v2023_11_09())
            .region(Region::new(self.region.clone()))
            .load()
            .await
    }
}

fn required(name: &'static str, value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Blank(name));
    }
    Ok(value.to_owned())
}
