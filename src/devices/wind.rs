//! Wind sensor device type: reads velocity components.

use anyhow::Result;
use async_trait::async_trait;
use nereid_shared::{
    json, new_id, now_ms, DataError, ErrorCode, RawCommand, Task, TaskResult, TaskState,
};
use serde_json::Value;
use std::time::Duration;
use tracing::info;

use crate::control::{Executor, Normalizer};

/// Normalizes wind sensor commands; only `device_id` is required, capability
/// is fixed to `wind` and the action defaults to `read`.
pub struct WindSensorNormalizer;

impl Normalizer for WindSensorNormalizer {
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
            capability: "wind".to_string(),
            action: action.to_string(),
            params: json::object_or_empty(&cmd.payload, "params"),
            dedup_window_ms: cmd.dedup_window_ms,
            created_at_ms: now_ms(),
            state: TaskState::Pending,
            ..Task::default()
        })
    }

    fn name(&self) -> &str {
        "WindSensorNormalizer"
    }
}

/// Simulated wind sensor reading velocity components (vx, vy, vz) around
/// configured base values.
pub struct WindSensorExecutor {
    device_name: String,
    simulate_latency_ms: u64,
    vx_base: f64,
    vy_base: f64,
    vz_base: f64,
    noise: f64,
}

impl Default for WindSensorExecutor {
    fn default() -> Self {
        Self {
            device_name: "wind-sensor-demo".into(),
            simulate_latency_ms: 50,
            vx_base: 0.2,
            vy_base: 0.1,
            vz_base: 0.0,
            noise: 0.05,
        }
    }
}

impl WindSensorExecutor {
    // deterministic jitter in [-noise, +noise], seeded from the clock
    fn jitter(&self, salt: i64) -> f64 {
        let bucket = (now_ms().wrapping_add(salt)) % 101;
        (bucket as f64 / 50.0 - 1.0) * self.noise
    }
}

#[async_trait]
impl Executor for WindSensorExecutor {
    async fn init(&mut self, cfg: &Value) -> Result<()> {
        if let Some(name) = cfg.get("device_name").and_then(Value::as_str) {
            self.device_name = name.to_string();
        }
        if let Some(latency) = cfg.get("simulate_latency_ms").and_then(Value::as_u64) {
            self.simulate_latency_ms = latency;
        }
        if let Some(v) = cfg.get("vx_base").and_then(Value::as_f64) {
            self.vx_base = v;
        }
        if let Some(v) = cfg.get("vy_base").and_then(Value::as_f64) {
            self.vy_base = v;
        }
        if let Some(v) = cfg.get("vz_base").and_then(Value::as_f64) {
            self.vz_base = v;
        }
        if let Some(v) = cfg.get("noise").and_then(Value::as_f64) {
            self.noise = v;
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

        tokio::time::sleep(Duration::from_millis(self.simulate_latency_ms)).await;

        if task.capability != "wind" || task.action != "read" {
            result.code = ErrorCode::InvalidCommand;
            result.message = format!(
                "unsupported capability/action: {}/{}",
                task.capability, task.action
            );
            result.finished_at_ms = now_ms();
            return Ok(result);
        }

        result.message = "wind read ok".into();
        result.output = serde_json::json!({
            "vx": self.vx_base + self.jitter(1),
            "vy": self.vy_base + self.jitter(2),
            "vz": self.vz_base + self.jitter(3),
            "unit": "m/s",
        });
        result.finished_at_ms = now_ms();
        Ok(result)
    }

    fn name(&self) -> &str {
        "WindSensorExecutor"
    }
}
