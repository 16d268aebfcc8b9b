//! Log entries exchanged between contexts
//!
//! Each context stamps its entries with its own logger id. Entries arriving
//! from upstream are re-emitted through `tracing` unless they carry our id,
//! which would mean they are our own entries echoed back.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

/// Severity of a forwarded log entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Log,
    Warn,
    Error,
    Critical,
}

/// One log line as carried in a `log` envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub logger_id: String,
    pub level: LogLevel,
    pub text: String,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl LogEntry {
    pub fn new(logger_id: &str, level: LogLevel, text: impl Into<String>) -> Self {
        LogEntry {
            logger_id: logger_id.to_string(),
            level,
            text: text.into(),
            component: None,
            time: None,
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Decode an envelope payload; anything that is not a log entry yields `None`
    pub fn from_payload(payload: &Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }
}

/// Re-emit entries from other loggers locally
#[derive(Clone, Debug)]
pub struct LogForwarder {
    own_id: String,
}

impl LogForwarder {
    pub fn new(own_id: impl Into<String>) -> Self {
        LogForwarder {
            own_id: own_id.into(),
        }
    }

    /// Returns true when the entry was emitted
    pub fn forward(&self, entry: &LogEntry) -> bool {
        if entry.logger_id == self.own_id {
            return false;
        }
        let source = entry.logger_id.as_str();
        let component = entry.component.as_deref().unwrap_or("");
        match entry.level {
            LogLevel::Trace => trace!(target: "weft::remote", source, component, "{}", entry.text),
            LogLevel::Debug => debug!(target: "weft::remote", source, component, "{}", entry.text),
            LogLevel::Info | LogLevel::Log => {
                info!(target: "weft::remote", source, component, "{}", entry.text)
            }
            LogLevel::Warn => warn!(target: "weft::remote", source, component, "{}", entry.text),
            LogLevel::Error | LogLevel::Critical => {
                error!(target: "weft::remote", source, component, "{}", entry.text)
            }
        }
        true
    }

    /// Decode and forward a raw `log` payload
    pub fn forward_payload(&self, payload: &Value) -> bool {
        match LogEntry::from_payload(payload) {
            Some(entry) => self.forward(&entry),
            None => {
                debug!("Ignoring malformed log entry");
                false
            }
        }
    }
}
