//! Configuration management for Pricerelay
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files with support for environment variable
//! overrides of the credentials.

use crate::error::{RelayError, Result};
use crate::pricing::{StaticTariff, TariffSet};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream pricing API configuration
    pub amber: AmberConfig,

    /// Outbound MQTT configuration
    pub mqtt: MqttConfig,

    /// Static import/export tariff parameters
    pub tariffs: TariffsConfig,

    /// Cadence and polling configuration
    pub schedule: ScheduleConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Timezone used to align wake times to the hour grid
    pub timezone: String,
}

/// Upstream pricing API parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmberConfig {
    /// Bearer token for the pricing API
    pub api_token: String,

    /// API base URL without trailing slash
    pub base_url: String,

    /// Optional site id; the first active site is used when empty
    pub site_id: String,

    /// How many past intervals to request per granularity
    pub previous_intervals: u32,

    /// HTTP request timeout in seconds
    pub request_timeout_seconds: u64,
}

/// MQTT broker connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker hostname
    pub host: String,

    /// Broker TCP port (typically 1883)
    pub port: u16,

    /// Client id; a random suffix is appended when empty
    pub client_id: String,

    /// Optional username
    pub username: String,

    /// Optional password
    pub password: String,

    /// Prefix for every published topic
    pub topic_prefix: String,

    /// Keep-alive interval in seconds
    pub keep_alive_seconds: u64,

    /// Publish with the MQTT retain flag
    pub retain: bool,
}

/// Import and export tariffs, both in dollars per kWh
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TariffsConfig {
    pub import: StaticTariff,
    pub export: StaticTariff,
}

/// Cadence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Length of the fine-grained bid cadence in minutes
    pub bid_cadence_minutes: u32,

    /// Length of the settled tariff cadence in minutes
    pub settled_cadence_minutes: u32,

    /// Seconds past each boundary before polling
    pub lag_allowance_seconds: u32,

    /// Minimum seconds between two real upstream fetches
    pub min_poll_interval_seconds: u64,

    /// Longest single sleep while waiting for a wake time
    pub wait_granularity_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rolling files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl TariffsConfig {
    pub fn tariff_set(&self) -> TariffSet {
        TariffSet {
            import: self.import,
            export: self.export,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists,
    /// then apply environment overrides
    pub fn load() -> Result<Self> {
        let default_paths = [
            "pricerelay.yaml",
            "/data/pricerelay.yaml",
            "/etc/pricerelay/config.yaml",
        ];

        let mut config = default_paths
            .iter()
            .find(|p| Path::new(p).exists())
            .map(Self::from_file)
            .transpose()?
            .unwrap_or_default();

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay secrets and endpoints from the environment.
    ///
    /// The lookup is injected so tests don't have to mutate process state.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("AMBER_API_TOKEN") {
            self.amber.api_token = v;
        }
        if let Some(v) = non_empty("AMBER_SITE_ID") {
            self.amber.site_id = v;
        }
        if let Some(v) = non_empty("MQTT_HOST") {
            self.mqtt.host = v;
        }
        if let Some(v) = non_empty("MQTT_USERNAME") {
            self.mqtt.username = v;
        }
        if let Some(v) = non_empty("MQTT_PASSWORD") {
            self.mqtt.password = v;
        }
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parsed timezone used for schedule alignment
    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| RelayError::validation("timezone".to_string(), e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.amber.api_token.trim().is_empty() {
            return Err(RelayError::validation(
                "amber.api_token",
                "API token cannot be empty",
            ));
        }

        if self.amber.base_url.trim().is_empty() {
            return Err(RelayError::validation(
                "amber.base_url",
                "Base URL cannot be empty",
            ));
        }

        if self.mqtt.host.is_empty() {
            return Err(RelayError::validation(
                "mqtt.host",
                "Host cannot be empty",
            ));
        }

        if self.mqtt.port == 0 {
            return Err(RelayError::validation(
                "mqtt.port",
                "Port must be greater than 0",
            ));
        }

        if self.mqtt.topic_prefix.trim_matches('/').is_empty() {
            return Err(RelayError::validation(
                "mqtt.topic_prefix",
                "Topic prefix cannot be empty",
            ));
        }

        for (field, minutes) in [
            ("schedule.bid_cadence_minutes", self.schedule.bid_cadence_minutes),
            (
                "schedule.settled_cadence_minutes",
                self.schedule.settled_cadence_minutes,
            ),
        ] {
            if !(1..=60).contains(&minutes) {
                return Err(RelayError::validation(field, "Must be between 1 and 60"));
            }
        }

        if self.schedule.lag_allowance_seconds >= 60 {
            return Err(RelayError::validation(
                "schedule.lag_allowance_seconds",
                "Must be less than 60",
            ));
        }

        if self.schedule.wait_granularity_seconds == 0 {
            return Err(RelayError::validation(
                "schedule.wait_granularity_seconds",
                "Must be greater than 0",
            ));
        }

        for (field, tariff) in [
            ("tariffs.import", &self.tariffs.import),
            ("tariffs.export", &self.tariffs.export),
        ] {
            if !tariff.fixed_charge.is_finite() || !tariff.loss_factor.is_finite() {
                return Err(RelayError::validation(field, "Values must be finite"));
            }
        }

        self.timezone()?;
        Ok(())
    }
}
