use crate::error::Context;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use humantime::parse_duration;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GatekeeperConfig {
    #[serde(default)]
    pub environment: EnvironmentSettings,
    #[serde(default)]
    pub gate: GateSettings,
    #[serde(default)]
    pub management: ManagementSettings,
}

/// Deployment context as reported by the environment provider.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EnvironmentSettings {
    #[serde(default = "default_environment_name")]
    pub name: String,
    #[serde(default)]
    pub managed_cloud: bool,
    #[serde(default)]
    pub cold_start: bool,
    /// Skips orchestration entirely; ignored for production profiles.
    #[serde(default)]
    pub bypass_validation: bool,
    /// Per-service criticality overrides, keyed by check name. Production keeps its defaults.
    #[serde(default)]
    pub criticality: BTreeMap<String, bool>,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            name: default_environment_name(),
            managed_cloud: false,
            cold_start: false,
            bypass_validation: false,
            criticality: BTreeMap::new(),
        }
    }
}

impl EnvironmentSettings {
    pub fn managed(name: impl Into<String>, cold_start: bool) -> Self {
        Self {
            name: name.into(),
            managed_cloud: true,
            cold_start,
            ..Self::default()
        }
    }

    pub fn self_hosted(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_criticality(mut self, check: impl Into<String>, critical: bool) -> Self {
        self.criticality.insert(check.into(), critical);
        self
    }

    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass_validation = bypass;
        self
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GateSettings {
    #[serde(default = "default_poll_interval", deserialize_with = "de_duration")]
    pub poll_interval: Duration,
    /// Placeholder for the stabilisation window after dependencies report ready.
    #[serde(default, deserialize_with = "de_duration")]
    pub settle_delay: Duration,
    #[serde(default = "default_validation_timeout", deserialize_with = "de_duration")]
    pub default_timeout: Duration,
    #[serde(default = "default_queue_timeout", deserialize_with = "de_duration")]
    pub queue_timeout: Duration,
    #[serde(default = "default_sweep_interval", deserialize_with = "de_duration")]
    pub queue_sweep_interval: Duration,
    #[serde(default = "default_health_timeout", deserialize_with = "de_duration")]
    pub health_timeout: Duration,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            settle_delay: Duration::ZERO,
            default_timeout: default_validation_timeout(),
            queue_timeout: default_queue_timeout(),
            queue_sweep_interval: default_sweep_interval(),
            health_timeout: default_health_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ManagementSettings {
    #[serde(default = "default_management_host")]
    pub host: String,
    #[serde(default = "default_management_port")]
    pub port: u16,
}

impl Default for ManagementSettings {
    fn default() -> Self {
        Self {
            host: default_management_host(),
            port: default_management_port(),
        }
    }
}

fn default_environment_name() -> String {
    "development".to_string()
}

const fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

const fn default_validation_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_queue_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_sweep_interval() -> Duration {
    Duration::from_secs(1)
}

const fn default_health_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_management_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_management_port() -> u16 {
    8081
}

fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}

impl GatekeeperConfig {
    /// Layers `config/gatekeeper.*` (optional) under `GATEKEEPER__`-prefixed environment variables.
    pub fn load() -> crate::Result<Self> {
        Self::deserialize_from(
            Config::builder()
                .add_source(File::with_name("config/gatekeeper").required(false))
                .add_source(
                    Environment::with_prefix("GATEKEEPER")
                        .separator("__")
                        .try_parsing(true),
                ),
        )
        .context("failed to load gatekeeper configuration")
    }

    pub fn from_yaml_str(raw: &str) -> crate::Result<Self> {
        Ok(Self::deserialize_from(
            Config::builder().add_source(File::from_str(raw, FileFormat::Yaml)),
        )?)
    }

    fn deserialize_from(
        builder: ConfigBuilder<DefaultState>,
    ) -> std::result::Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }
}
