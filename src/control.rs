//! Capability contracts for device executors and command normalizers.

use anyhow::Result;
use async_trait::async_trait;
use nereid_shared::{RawCommand, Task, TaskResult};
use serde_json::Value;

/// Executes tasks for one device.
///
/// Does not queue, schedule or aggregate status; each device holds exactly
/// one executor instance. An `Err` escaping `do_task` is caught at the worker
/// boundary and turned into an internal-error result — it never kills the
/// dispatch loop.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Load driver configuration.
    async fn init(&mut self, cfg: &Value) -> Result<()>;

    /// Execute one task to completion and report the outcome.
    async fn do_task(&self, task: &Task) -> Result<TaskResult>;

    /// Optional health probe.
    fn health_check(&self) -> bool {
        true
    }

    /// Name for log attribution.
    fn name(&self) -> &str;
}

/// Converts raw external commands into validated tasks.
///
/// Parses the payload, checks required fields and fills in defaults
/// (`task_id`, `command_id`, `created_at_ms`). Must not block and must not
/// touch shared state.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, cmd: &RawCommand, edge_id: &str) -> Result<Task>;

    fn name(&self) -> &str;
}
