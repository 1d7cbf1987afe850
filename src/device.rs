//! Device execution unit: one executor, one worker, one status cell.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use nereid_shared::{now_ms, DeviceConnState, DeviceStatus, DeviceWorkState, Task, TaskResult};
use tracing::{info, warn};

use crate::config::DeviceConfig;
use crate::queue::TaskQueue;
use crate::registry::Registry;
use crate::worker::{Worker, WorkerHooks};

/// One controllable endpoint with its own dispatch loop.
///
/// The device owns its executor and status cell; the queue and the E-Stop
/// flag are shared handles owned by the edge, held only between `start` and
/// `join`. `queue_depth` in the status snapshot is left for the edge to fill.
pub struct Device {
    device_id: String,
    device_type: String,
    device_name: String,
    control_cfg: serde_json::Value,

    executor: Option<Arc<dyn crate::control::Executor>>,
    status: Arc<Mutex<DeviceStatus>>,
    worker: Option<Worker>,
}

impl Device {
    pub fn new(cfg: &DeviceConfig) -> Self {
        let status = DeviceStatus {
            device_id: cfg.device_id.clone(),
            conn_state: DeviceConnState::Unknown,
            work_state: DeviceWorkState::Idle,
            last_seen_at_ms: now_ms(),
            ..DeviceStatus::default()
        };

        Self {
            device_id: cfg.device_id.clone(),
            device_type: cfg.device_type.clone(),
            device_name: cfg.device_name.clone(),
            control_cfg: cfg.control.clone(),
            executor: None,
            status: Arc::new(Mutex::new(status)),
            worker: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.device_id
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    /// Create and initialize the executor for this device's type.
    pub async fn init(&mut self, registry: &Registry) -> Result<()> {
        info!(
            "[Device:{}] init: type={}, name={}",
            self.device_id, self.device_type, self.device_name
        );

        let mut executor = registry
            .create_executor(&self.device_type)
            .with_context(|| format!("no executor registered for type={}", self.device_type))?;

        executor
            .init(&self.control_cfg)
            .await
            .with_context(|| format!("executor init failed for device={}", self.device_id))?;

        {
            let mut status = self.status.lock().unwrap();
            status.device_id = self.device_id.clone();
            status.conn_state = DeviceConnState::Online;
            status.work_state = DeviceWorkState::Idle;
            status.last_seen_at_ms = now_ms();
        }

        info!(
            "[Device:{}] init ok: executor={}",
            self.device_id,
            executor.name()
        );
        self.executor = Some(Arc::from(executor));
        Ok(())
    }

    /// Wire the worker to the given queue and E-Stop flag and start it.
    ///
    /// Requires a prior successful `init`; takes no ownership of the queue
    /// or the flag.
    pub fn start(&mut self, queue: Arc<TaskQueue>, estop: Arc<AtomicBool>) -> Result<()> {
        let Some(executor) = self.executor.clone() else {
            bail!("device {} not initialized: executor missing", self.device_id);
        };

        if let Some(worker) = &self.worker {
            if worker.is_running() {
                bail!("device {} already started", self.device_id);
            }
        }

        let hooks: Arc<dyn WorkerHooks> = Arc::new(StatusHooks {
            device_id: self.device_id.clone(),
            status: self.status.clone(),
        });

        let worker_name = format!("wf-{}", self.device_id);
        info!(
            "[Device:{}] start: worker={}, queue={}",
            self.device_id,
            worker_name,
            queue.name()
        );

        self.worker = Some(Worker::spawn(worker_name, queue, executor, estop, hooks));
        Ok(())
    }

    /// Request worker stop; never touches the queue.
    pub fn stop(&self) {
        warn!("[Device:{}] stop requested", self.device_id);
        if let Some(worker) = &self.worker {
            worker.stop();
        }
        let mut status = self.status.lock().unwrap();
        status.last_seen_at_ms = now_ms();
    }

    /// Wait for the worker to exit. No-op if never started.
    pub async fn join(&mut self) {
        if let Some(worker) = &mut self.worker {
            worker.join().await;
            info!("[Device:{}] worker exited", self.device_id);
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(Worker::is_running)
    }

    pub fn health_check(&self) -> bool {
        self.executor.as_ref().map_or(false, |e| e.health_check())
    }

    /// Lock-protected copy of the status cell; `queue_depth` is not set here.
    pub fn status_snapshot(&self) -> DeviceStatus {
        self.status.lock().unwrap().clone()
    }
}

/// Updates the device status cell on task boundaries.
struct StatusHooks {
    device_id: String,
    status: Arc<Mutex<DeviceStatus>>,
}

impl WorkerHooks for StatusHooks {
    fn on_task_start(&self, task: &Task) {
        let mut status = self.status.lock().unwrap();
        status.work_state = DeviceWorkState::Busy;
        status.running_task_id = task.task_id.clone();
        status.last_seen_at_ms = now_ms();

        info!(
            "[Device:{}] busy: task_id={}, capability={}, action={}",
            self.device_id, task.task_id, task.capability, task.action
        );
    }

    fn on_task_finish(&self, task: &Task, result: &TaskResult) {
        let mut status = self.status.lock().unwrap();

        let now = now_ms();
        status.last_task_at_ms = now;
        status.last_seen_at_ms = now;

        if result.is_ok() {
            status.last_error.clear();
            status.work_state = DeviceWorkState::Idle;
        } else {
            status.last_error = if result.message.is_empty() {
                result.code.as_str().to_string()
            } else {
                result.message.clone()
            };
            status.work_state = DeviceWorkState::Faulted;
        }
        status.running_task_id.clear();

        info!(
            "[Device:{}] task finished: task_id={}, code={}, work_state={}",
            self.device_id,
            task.task_id,
            result.code,
            status.work_state.as_str()
        );
    }
}
