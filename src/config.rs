//! Configuration management for the coordinator
//!
//! Loads configuration from TOML files with environment variable
//! substitution. Embedding applications that construct the coordinator
//! programmatically can skip the file entirely and use the `Default` impls.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub reaper: ReaperConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Per-store-call timeout and source of the transaction deadline
    /// (`created_at + timeout_seconds`).
    pub timeout_seconds: u64,
    /// Retention window for terminal transaction records.
    pub cleanup_after_seconds: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            cleanup_after_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReaperConfig {
    pub reap_interval_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            reap_interval_secs: 5,
            cleanup_interval_secs: 300,
        }
    }
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("KGTX_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings = toml::from_str(&config_str)
            .with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Load settings for a specific environment
    pub fn load_env(env_name: &str) -> Result<Self> {
        let config_path = PathBuf::from(format!("config/{}.toml", env_name));
        env::set_var("KGTX_CONFIG", config_path.to_str().unwrap());
        Self::load()
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.coordinator.timeout_seconds == 0 {
            anyhow::bail!("coordinator.timeout_seconds must be greater than zero");
        }
        if self.reaper.reap_interval_secs == 0 || self.reaper.cleanup_interval_secs == 0 {
            anyhow::bail!("reaper intervals must be greater than zero");
        }
        if self.reaper.reap_interval_secs > self.coordinator.timeout_seconds {
            tracing::warn!(
                "reaper interval exceeds the transaction timeout - expired transactions \
                 will linger for up to a full interval"
            );
        }
        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
