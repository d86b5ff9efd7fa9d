//! Configuration management for the key ring controller

use serde::Deserialize;
use std::collections::HashMap;
use std::env;

/// Environment variable prefix for all settings
pub const ENV_PREFIX: &str = "KMS_KEYRING";

/// Historical variable used to pin the KMS API endpoint
pub const LEGACY_ENDPOINT_VAR: &str = "IBMCLOUD_KP_API_ENDPOINT";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Console,
    Json,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KmsConfig {
    /// IAM API key, exchanged for access tokens
    pub api_key: Option<String>,
    /// Pre-acquired IAM access token (used when no API key is set)
    pub access_token: Option<String>,
    pub iam_url: String,
    pub resource_controller_url: String,
    /// Replaces the endpoint advertised by the instance
    pub endpoint_override: Option<String>,
    pub timeout_secs: u64,
    /// Send the extra key ring request ahead of the create call
    pub prepare_before_create: bool,
    /// Require the key ring id to be listed for Read to report it present
    pub verify_read_membership: bool,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl KmsConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let mut loaded = Self::load(None)?;
        if loaded.endpoint_override.is_none() {
            loaded.endpoint_override = env::var(LEGACY_ENDPOINT_VAR).ok();
        }
        Ok(loaded)
    }

    /// Load configuration from an explicit variable map instead of the process
    /// environment. Keys carry the `KMS_KEYRING_` prefix.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, config::ConfigError> {
        let legacy = vars.get(LEGACY_ENDPOINT_VAR).cloned();
        let mut loaded = Self::load(Some(vars))?;
        if loaded.endpoint_override.is_none() {
            loaded.endpoint_override = legacy;
        }
        Ok(loaded)
    }

    fn load(vars: Option<HashMap<String, String>>) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .set_default("iam_url", "https://iam.cloud.ibm.com")?
            .set_default(
                "resource_controller_url",
                "https://resource-controller.cloud.ibm.com",
            )?
            .set_default("timeout_secs", 30)?
            .set_default("prepare_before_create", true)?
            .set_default("verify_read_membership", false)?
            .set_default("log_level", "info")?
            .set_default("log_format", "console")?
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(vars),
            )
            .build()?
            .try_deserialize()
    }

    /// Default log level; `RUST_LOG` still takes precedence
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}
