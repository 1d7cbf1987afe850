//! UUV device type: navigation and water sampling.

use anyhow::Result;
use async_trait::async_trait;
use nereid_shared::{
    json, new_id, now_ms, DataError, ErrorCode, RawCommand, Task, TaskResult, TaskState,
};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use crate::control::{Executor, Normalizer};

/// Normalizes raw UUV commands; requires `device_id`, `capability` and
/// `action` at the payload top level.
pub struct UuvNormalizer;

impl Normalizer for UuvNormalizer {
    fn normalize(&self, cmd: &RawCommand, edge_id: &str) -> Result<Task> {
        if !cmd.payload.is_object() {
            return Err(DataError::PayloadNotObject.into());
        }

        let device_id = json::str_or(&cmd.payload, "device_id", "");
        let capability = json::str_or(&cmd.payload, "capability", "");
        let action = json::str_or(&cmd.payload, "action", "");

        if device_id.is_empty() {
            return Err(DataError::MissingField("device_id").into());
        }
        if capability.is_empty() {
            return Err(DataError::MissingField("capability").into());
        }
        if action.is_empty() {
            return Err(DataError::MissingField("action").into());
        }

        let command_id = if cmd.command_id.is_empty() {
            new_id("cmd")
        } else {
            cmd.command_id.clone()
        };

        let task = Task {
            task_id: new_id("task"),
            idempotency_key: if cmd.idempotency_key.is_empty() {
                command_id.clone()
            } else {
                cmd.idempotency_key.clone()
            },
            command_id,
            edge_id: edge_id.to_string(),
            device_id: device_id.to_string(),
            capability: capability.to_string(),
            action: action.to_string(),
            params: json::object_or_empty(&cmd.payload, "params"),
            dedup_window_ms: cmd.dedup_window_ms,
            created_at_ms: now_ms(),
            state: TaskState::Pending,
            ..Task::default()
        };

        info!(
            "[Normalizer:{}] normalized: task_id={}, device_id={}, capability={}, action={}",
            self.name(),
            task.task_id,
            task.device_id,
            task.capability,
            task.action
        );
        Ok(task)
    }

    fn name(&self) -> &str {
        "UuvNormalizer"
    }
}

/// Simulated UUV driver; latency and name come from the control config.
pub struct UuvExecutor {
    device_name: String,
    simulate_latency_ms: u64,
}

impl Default for UuvExecutor {
    fn default() -> Self {
        Self {
            device_name: "uuv-demo".into(),
            simulate_latency_ms: 50,
        }
    }
}

#[async_trait]
impl Executor for UuvExecutor {
    async fn init(&mut self, cfg: &Value) -> Result<()> {
        if let Some(name) = cfg.get("device_name").and_then(Value::as_str) {
            self.device_name = name.to_string();
        }
        if let Some(latency) = cfg.get("simulate_latency_ms").and_then(Value::as_u64) {
            self.simulate_latency_ms = latency;
        }

        info!(
            "[Executor:{}] init ok: device_name={}, simulate_latency_ms={}",
            self.name(),
            self.device_name,
            self.simulate_latency_ms
        );
        Ok(())
    }

    async fn do_task(&self, task: &Task) -> Result<TaskResult> {
        let mut result = TaskResult {
            started_at_ms: now_ms(),
            ..TaskResult::default()
        };

        if task.capability.is_empty() || task.action.is_empty() {
            result.code = ErrorCode::InvalidCommand;
            result.message = "capability/action is empty".into();
            result.finished_at_ms = now_ms();
            return Ok(result);
        }

        tokio::time::sleep(Duration::from_millis(self.simulate_latency_ms)).await;

        match (task.capability.as_str(), task.action.as_str()) {
            ("navigate", "set") => {
                result.message = "navigate set ok".into();
                result.output = serde_json::json!({"accepted": true});
            }
            ("navigate", "stop") => {
                result.message = "navigate stop ok".into();
                result.output = serde_json::json!({"stopped": true});
            }
            ("navigate", _) => {
                result.code = ErrorCode::InvalidCommand;
                result.message = "unknown action for navigate".into();
            }
            ("sample_water", "start") => {
                result.message = "sample start ok".into();
                result.output = serde_json::json!({"sample_id": new_id("sample")});
            }
            ("sample_water", _) => {
                result.code = ErrorCode::InvalidCommand;
                result.message = "unknown action for sample_water".into();
            }
            // device-level estop request; the edge-wide flag does not route here
            ("estop", _) => {
                result.code = ErrorCode::EStop;
                result.message = "estop requested".into();
            }
            _ => {
                result.code = ErrorCode::InvalidCommand;
                result.message = "unknown capability".into();
            }
        }

        result.finished_at_ms = now_ms();

        if result.is_ok() {
            info!(
                "[Executor:{}] task done: task_id={}, message={}",
                self.name(),
                task.task_id,
                result.message
            );
        } else {
            warn!(
                "[Executor:{}] task failed: task_id={}, code={}, message={}",
                self.name(),
                task.task_id,
                result.code,
                result.message
            );
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "UuvExecutor"
    }
}
