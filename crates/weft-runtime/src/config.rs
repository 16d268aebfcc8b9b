//! Runtime configuration
//!
//! Durations are written as humantime strings (`"3s"`, `"250ms"`).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use weft_core::{WeftError, WeftResult};

use crate::keepalive::KeepaliveConfig;

/// Context configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub keepalive: KeepaliveConfig,
    /// Wait for the first acknowledgment before reporting `ack_timeout`
    #[serde(with = "duration_str")]
    pub load_timeout: Duration,
    /// Log every bus trigger and channel send
    pub log_events: bool,
    /// Identity stamped on log entries; entries carrying it are not re-emitted
    pub logger_id: String,
    /// Sent upstream as the `configure` payload
    pub configure: Option<Value>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            keepalive: KeepaliveConfig::default(),
            load_timeout: Duration::from_secs(3),
            log_events: false,
            logger_id: new_logger_id(),
            configure: None,
        }
    }
}

impl CoreConfig {
    /// Parse and validate a JSON document; missing fields take defaults
    pub fn from_json(json: &str) -> WeftResult<Self> {
        let config: CoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WeftResult<()> {
        if self.load_timeout.is_zero() {
            return Err(WeftError::InvalidConfig("load_timeout must be non-zero".into()));
        }
        if self.logger_id.trim().is_empty() {
            return Err(WeftError::InvalidConfig("logger_id must not be empty".into()));
        }
        self.keepalive.validate()
    }
}

/// Tracing subscriber configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            json: false,
            ansi: true,
        }
    }
}

/// Random 64-bit hex identifier
pub fn new_logger_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// Serde adapter for humantime durations
pub mod duration_str {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(de::Error::custom)
    }
}
