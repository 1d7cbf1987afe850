//! Task, task state and task result types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unified error codes for task execution results
///
/// `Ok`: operation succeeded; everything else is a terminal failure for the
/// task it is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Ok,
    InvalidCommand,
    UnknownDevice,
    DeviceOffline,
    Timeout,
    DriverError,
    EStop,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Ok => "Ok",
            ErrorCode::InvalidCommand => "InvalidCommand",
            ErrorCode::UnknownDevice => "UnknownDevice",
            ErrorCode::DeviceOffline => "DeviceOffline",
            ErrorCode::Timeout => "Timeout",
            ErrorCode::DriverError => "DriverError",
            ErrorCode::EStop => "EStop",
            ErrorCode::InternalError => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle state
///
/// `Pending -> Running -> {Succeeded, Failed, Cancelled}`; terminal states
/// are sticky. `Cancelled` is reserved — nothing in the core sets it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "Pending",
            TaskState::Running => "Running",
            TaskState::Succeeded => "Succeeded",
            TaskState::Failed => "Failed",
            TaskState::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of executing one task, produced exactly once by the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub code: ErrorCode,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub started_at_ms: i64,
    #[serde(default)]
    pub finished_at_ms: i64,
    #[serde(default = "empty_object")]
    pub output: Value,
}

impl Default for TaskResult {
    fn default() -> Self {
        Self {
            code: ErrorCode::Ok,
            message: String::new(),
            started_at_ms: 0,
            finished_at_ms: 0,
            output: empty_object(),
        }
    }
}

impl TaskResult {
    pub fn is_ok(&self) -> bool {
        self.code == ErrorCode::Ok
    }
}

/// A normalized unit of work derived from a raw command
///
/// Created by a normalizer; immutable once queued except for the
/// `state`/`result` updates applied by the worker. The idempotency and
/// priority fields are carried but not consulted by the dispatch logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub command_id: String,

    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,

    pub edge_id: String,
    pub device_id: String,

    pub capability: String,
    pub action: String,
    #[serde(default = "empty_object")]
    pub params: Value,

    #[serde(default)]
    pub idempotency_key: String,
    #[serde(default)]
    pub dedup_window_ms: i64,

    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub created_at_ms: i64,
    #[serde(default)]
    pub deadline_at_ms: i64,
    #[serde(default = "empty_object")]
    pub policy: Value,

    #[serde(default)]
    pub state: TaskState,
    #[serde(default)]
    pub result: TaskResult,
}

impl Default for Task {
    fn default() -> Self {
        Self {
            task_id: String::new(),
            command_id: String::new(),
            trace_id: String::new(),
            span_id: String::new(),
            edge_id: String::new(),
            device_id: String::new(),
            capability: String::new(),
            action: String::new(),
            params: empty_object(),
            idempotency_key: String::new(),
            dedup_window_ms: 0,
            priority: 0,
            created_at_ms: 0,
            deadline_at_ms: 0,
            policy: empty_object(),
            state: TaskState::Pending,
            result: TaskResult::default(),
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}
