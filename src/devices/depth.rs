//! Depth sensor device type: reads depth below surface.

use anyhow::Result;
use async_trait::async_trait;
use nereid_shared::{
    json, new_id, now_ms, DataError, ErrorCode, RawCommand, Task, TaskResult, TaskState,
};
use serde_json::Value;
use std::time::Duration;
use tracing::info;

use crate::control::{Executor, Normalizer};

/// Normalizes depth sensor commands; only `device_id` is required, capability
/// is fixed to `depth` and the action defaults to `read`.
pub struct DepthSensorNormalizer;

impl Normalizer for DepthSensorNormalizer {
    fn normalize(&self, cmd: &RawCommand, edge_id: &str) -> Result<Task> {
        if !cmd.payload.is_object() {
            return Err(DataError::PayloadNotObject.into());
        }

        let device_id = json::str_or(&cmd.payload, "device_id", "");
        if device_id.is_empty() {
            return Err(DataError::MissingField("device_id").into());
        }

        let action = json::str_or(&cmd.payload, "action", "read");

        let command_id = if cmd.command_id.is_empty() {
            new_id("cmd")
        } else {
            cmd.command_id.clone()
        };

        Ok(Task {
            task_id: new_id("task"),
            idempotency_key: if cmd.idempotency_key.is_empty() {
                command_id.clone()
            } else {
                cmd.idempotency_key.clone()
            },
            command_id,
            edge_id: edge_id.to_string(),
            device_id: device_id.to_string(),
            capability: "depth".to_string(),
            action: action.to_string(),
            params: json::object_or_empty(&cmd.payload, "params"),
            dedup_window_ms: cmd.dedup_window_ms,
            created_at_ms: now_ms(),
            state: TaskState::Pending,
            ..Task::default()
        })
    }

    fn name(&self) -> &str {
        "DepthSensorNormalizer"
    }
}

/// Simulated depth sounder reporting around a configured base depth.
pub struct DepthSensorExecutor {
    device_name: String,
    simulate_latency_ms: u64,
    base_depth_m: f64,
    drift_m: f64,
}

impl Default for DepthSensorExecutor {
    fn default() -> Self {
        Self {
            device_name: "depth-sensor-demo".into(),
            simulate_latency_ms: 50,
            base_depth_m: 10.0,
            drift_m: 0.2,
        }
    }
}

#[async_trait]
impl Executor for DepthSensorExecutor {
    async fn init(&mut self, cfg: &Value) -> Result<()> {
        if let Some(name) = cfg.get("device_name").and_then(Value::as_str) {
            self.device_name = name.to_string();
        }
        if let Some(latency) = cfg.get("simulate_latency_ms").and_then(Value::as_u64) {
            self.simulate_latency_ms = latency;
        }
        if let Some(v) = cfg.get("base_depth_m").and_then(Value::as_f64) {
            self.base_depth_m = v;
        }
        if let Some(v) = cfg.get("drift_m").and_then(Value::as_f64) {
            self.drift_m = v;
        }

        info!(
            "[Executor:{}] init ok: device_name={}, base_depth_m={}",
            self.name(),
            self.device_name,
            self.base_depth_m
        );
        Ok(())
    }

    async fn do_task(&self, task: &Task) -> Result<TaskResult> {
        let mut result = TaskResult {
            started_at_ms: now_ms(),
            ..TaskResult::default()
        };

        tokio::time::sleep(Duration::from_millis(self.simulate_latency_ms)).await;

        if task.capability != "depth" || task.action != "read" {
            result.code = ErrorCode::InvalidCommand;
            result.message = format!(
                "unsupported capability/action: {}/{}",
                task.capability, task.action
            );
            result.finished_at_ms = now_ms();
            return Ok(result);
        }

        let drift = ((now_ms() % 41) as f64 / 20.0 - 1.0) * self.drift_m;
        result.message = "depth read ok".into();
        result.output = serde_json::json!({
            "depth_m": self.base_depth_m + drift,
            "unit": "m",
        });
        result.finished_at_ms = now_ms();
        Ok(result)
    }

    fn name(&self) -> &str {
        "DepthSensorExecutor"
    }
}
