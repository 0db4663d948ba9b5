//! Trace events and time ranges.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One timestamped trace event.
///
/// The payload is kept as a JSON object so that graph providers for any
/// analysis domain can read the fields they care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Timestamp in nanoseconds.
    pub timestamp: i64,
    /// Event name, e.g. `sched_switch`.
    pub name: String,
    /// CPU the event was recorded on, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl TraceEvent {
    pub fn new(timestamp: i64, name: impl Into<String>) -> Self {
        TraceEvent {
            timestamp,
            name: name.into(),
            cpu: None,
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn with_cpu(mut self, cpu: u32) -> Self {
        self.cpu = Some(cpu);
        self
    }

    /// Integer field, if present and integral.
    pub fn field_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Inclusive range of timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    /// The range covering every possible timestamp.
    pub const ETERNITY: TimeRange = TimeRange {
        start: i64::MIN,
        end: i64::MAX,
    };

    pub fn new(start: i64, end: i64) -> Self {
        TimeRange { start, end }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}
