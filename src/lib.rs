//! # Pricerelay - wholesale electricity price relay
//!
//! Polls an Amber Electric style pricing API on cadences aligned to the
//! market's five and thirty minute intervals, derives retail import/export
//! prices from fixed tariff parameters, and republishes them over MQTT for
//! home-automation dashboards.
//!
//! ## Units
//!
//! All prices inside the crate are dollars per kWh. The upstream's cents are
//! converted when a payload is parsed. Export prices are published as a
//! positive number when the consumer is paid for exporting.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration with environment overrides and validation
//! - `logging`: Structured logging and tracing
//! - `schedule`: Wake-time alignment to the cadence grid
//! - `source`: Upstream client with snapshot caching and poll debouncing
//! - `pricing`: Tariff arithmetic
//! - `publish`: MQTT publisher with automatic reconnect
//! - `relay`: Cadence orchestration, fallback and topic mapping
//! - `shutdown`: Signal-driven shutdown

pub mod config;
pub mod error;
pub mod logging;
pub mod pricing;
pub mod publish;
pub mod relay;
pub mod schedule;
pub mod shutdown;
pub mod source;

// Re-export commonly used types
pub use config::Config;
pub use error::{RelayError, Result};
pub use relay::{CadenceKind, Relay};

/// Version string embedded at build time
pub const APP_VERSION: &str = env!("APP_VERSION");
