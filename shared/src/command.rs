//! Raw command input and submit result types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw control command as delivered by the transport layer
///
/// `payload` is an untyped JSON document; `received_at_ms` is stamped by the
/// receiving layer. The idempotency fields are reserved and not consulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCommand {
    #[serde(default)]
    pub command_id: String,
    #[serde(default)]
    pub source: String,
    #[serde(default = "empty_object")]
    pub payload: Value,
    #[serde(default)]
    pub received_at_ms: i64,

    #[serde(default)]
    pub idempotency_key: String,
    #[serde(default)]
    pub dedup_window_ms: i64,
}

impl Default for RawCommand {
    fn default() -> Self {
        Self {
            command_id: String::new(),
            source: String::new(),
            payload: empty_object(),
            received_at_ms: 0,
            idempotency_key: String::new(),
            dedup_window_ms: 0,
        }
    }
}

/// Outcome code of one submit call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitCode {
    Ok,
    NotRunning,
    EStop,
    InvalidCommand,
    UnknownDevice,
    InternalError,
    QueueShutdown,
}

impl SubmitCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitCode::Ok => "Ok",
            SubmitCode::NotRunning => "NotRunning",
            SubmitCode::EStop => "EStop",
            SubmitCode::InvalidCommand => "InvalidCommand",
            SubmitCode::UnknownDevice => "UnknownDevice",
            SubmitCode::InternalError => "InternalError",
            SubmitCode::QueueShutdown => "QueueShutdown",
        }
    }
}

impl std::fmt::Display for SubmitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronous answer to a submit call, success or rejection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub code: SubmitCode,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub edge_id: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub command_id: String,
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub queue_size_after: i64,
}

impl SubmitResult {
    pub fn is_ok(&self) -> bool {
        self.code == SubmitCode::Ok
    }
}

impl std::fmt::Display for SubmitResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "code={}, message={}, edge_id={}, device_id={}, command_id={}, task_id={}, queue_size_after={}",
            self.code,
            self.message,
            self.edge_id,
            self.device_id,
            self.command_id,
            self.task_id,
            self.queue_size_after
        )
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_command_roundtrip() {
        let cmd = RawCommand {
            command_id: "cmd-1".into(),
            source: "mqtt".into(),
            payload: serde_json::json!({"device_id": "uuv-1", "capability": "navigate"}),
            received_at_ms: 42,
            idempotency_key: "cmd-1".into(),
            dedup_window_ms: 0,
        };

        let encoded = serde_json::to_string(&cmd).unwrap();
        let decoded: RawCommand = serde_json::from_str(&encoded).unwrap();
        assert_eq!(cmd, decoded);
    }

    #[test]
    fn test_submit_result_roundtrip() {
        let r = SubmitResult {
            code: SubmitCode::QueueShutdown,
            message: "queue already shutdown".into(),
            edge_id: "edge-1".into(),
            device_id: "uuv-1".into(),
            command_id: "cmd-1".into(),
            task_id: "task-1".into(),
            queue_size_after: 0,
        };

        let encoded = serde_json::to_string(&r).unwrap();
        let decoded: SubmitResult = serde_json::from_str(&encoded).unwrap();
        assert_eq!(r, decoded);
        assert!(!decoded.is_ok());
    }

    #[test]
    fn test_submit_result_display_mentions_code() {
        let r = SubmitResult {
            code: SubmitCode::UnknownDevice,
            message: "unknown device_id=x".into(),
            edge_id: "edge-1".into(),
            device_id: "x".into(),
            command_id: String::new(),
            task_id: String::new(),
            queue_size_after: 0,
        };
        assert!(r.to_string().contains("UnknownDevice"));
    }
}
