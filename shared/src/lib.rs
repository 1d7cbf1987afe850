//! Nereid Shared Data Model
//!
//! This crate provides the data model shared between the edge runtime, the
//! transport bindings and tooling: tasks, task results, status snapshots,
//! raw commands and submit results.

pub mod command;
pub mod error;
pub mod status;
pub mod task;

use std::time::{SystemTime, UNIX_EPOCH};

pub use command::{RawCommand, SubmitCode, SubmitResult};
pub use error::DataError;
pub use status::{DeviceConnState, DeviceStatus, DeviceWorkState, EdgeRunState, EdgeStatus};
pub use task::{ErrorCode, Task, TaskResult, TaskState};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Generate a prefixed unique id, e.g. `task-9f8c...`
pub fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

/// Timing parameters for the runtime
pub mod timing {
    /// Worker poll timeout while waiting on its queue; bounds worst-case
    /// shutdown latency for an idle device
    pub const WORKER_POLL_INTERVAL_MS: u64 = 200;

    /// Re-check interval while the E-Stop flag is held
    pub const ESTOP_POLL_INTERVAL_MS: u64 = 100;

    /// Default status snapshot persistence interval
    pub const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 5000;
}

/// Helpers for reading fields out of loosely typed JSON payloads
pub mod json {
    use serde_json::Value;

    /// Get a string field from a JSON object, or the default if absent
    pub fn str_or<'a>(value: &'a Value, key: &str, default: &'a str) -> &'a str {
        value.get(key).and_then(Value::as_str).unwrap_or(default)
    }

    /// Get an object-valued field, or an empty object if absent or mistyped
    pub fn object_or_empty(value: &Value, key: &str) -> Value {
        match value.get(key) {
            Some(v) if v.is_object() => v.clone(),
            _ => Value::Object(Default::default()),
        }
    }
}
