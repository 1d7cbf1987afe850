//! Edge runtime: lifecycle state machine, submit routing and status
//! aggregation.
//!
//! The edge owns every device and its task queue for the edge's lifetime.
//! One reader-writer lock guards the device/queue/normalizer maps and the
//! static config fields: `submit` and `status_snapshot` take the read side,
//! `init`/`start`/`set_estop`/`shutdown` take the write side. The E-Stop flag
//! is a separate atomic so worker loops can poll it without contending on
//! the edge lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use nereid_shared::{
    json, now_ms, DeviceWorkState, EdgeRunState, EdgeStatus, RawCommand, SubmitCode, SubmitResult,
};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{EdgeConfig, PersistenceConfig};
use crate::control::Normalizer;
use crate::device::Device;
use crate::queue::TaskQueue;
use crate::registry::Registry;
use crate::snapshot::{SnapshotLoop, StatusStore};

/// Internal lifecycle state.
///
/// `Initializing -> Ready -> Running -> Stopping -> Stopped`, one-directional
/// except that a failed start attempt reverts to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initializing,
    Ready,
    Running,
    Stopping,
    Stopped,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Initializing => "Initializing",
            RunState::Ready => "Ready",
            RunState::Running => "Running",
            RunState::Stopping => "Stopping",
            RunState::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-local runtime owning all devices for one site.
pub struct Edge {
    registry: Registry,
    status_store: Option<Arc<dyn StatusStore>>,

    estop: Arc<AtomicBool>,
    estop_reason: Mutex<String>,

    inner: RwLock<EdgeInner>,
}

struct EdgeInner {
    run_state: RunState,

    edge_id: String,
    version: String,
    boot_at_ms: i64,
    allow_queue_when_estop: bool,
    persistence: Option<PersistenceConfig>,

    device_type_by_id: HashMap<String, String>,
    normalizers_by_type: HashMap<String, Arc<dyn Normalizer>>,
    queues: HashMap<String, Arc<TaskQueue>>,
    devices: HashMap<String, Device>,

    snapshot_loop: Option<SnapshotLoop>,
}

#[derive(Default)]
struct BuiltRuntime {
    device_type_by_id: HashMap<String, String>,
    normalizers_by_type: HashMap<String, Arc<dyn Normalizer>>,
    queues: HashMap<String, Arc<TaskQueue>>,
    devices: HashMap<String, Device>,
}

impl Edge {
    pub fn new(registry: Registry) -> Arc<Self> {
        Self::build(registry, None)
    }

    pub fn with_status_store(registry: Registry, store: Arc<dyn StatusStore>) -> Arc<Self> {
        Self::build(registry, Some(store))
    }

    fn build(registry: Registry, status_store: Option<Arc<dyn StatusStore>>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            status_store,
            estop: Arc::new(AtomicBool::new(false)),
            estop_reason: Mutex::new(String::new()),
            inner: RwLock::new(EdgeInner {
                run_state: RunState::Initializing,
                edge_id: "edge-unknown".into(),
                version: "0.1.0".into(),
                boot_at_ms: 0,
                allow_queue_when_estop: false,
                persistence: None,
                device_type_by_id: HashMap::new(),
                normalizers_by_type: HashMap::new(),
                queues: HashMap::new(),
                devices: HashMap::new(),
                snapshot_loop: None,
            }),
        })
    }

    pub async fn id(&self) -> String {
        self.inner.read().await.edge_id.clone()
    }

    pub async fn run_state(&self) -> RunState {
        self.inner.read().await.run_state
    }

    pub fn estop_active(&self) -> bool {
        self.estop.load(Ordering::SeqCst)
    }

    /// Initialize (or re-initialize) the edge from configuration.
    ///
    /// Any resources from a previous init are torn down first. Devices,
    /// queues and normalizers are built into a staging set and committed only
    /// on success, so a failed init leaves the edge empty in `Initializing`.
    pub async fn init(&self, cfg: &EdgeConfig) -> Result<()> {
        let mut inner = self.inner.write().await;

        if let Some(snapshot_loop) = inner.snapshot_loop.take() {
            snapshot_loop.stop().await;
        }
        Self::teardown_locked(&mut inner).await;

        inner.run_state = RunState::Initializing;
        inner.edge_id = cfg.edge_id.clone();
        inner.version = cfg.version.clone();
        inner.allow_queue_when_estop = cfg.allow_queue_when_estop;
        inner.persistence = cfg.persistence.clone();
        inner.boot_at_ms = now_ms();

        info!(
            "[Edge:{}] init: version={}, devices={}, allow_queue_when_estop={}",
            inner.edge_id,
            inner.version,
            cfg.devices.len(),
            inner.allow_queue_when_estop
        );

        let built = match self.build_runtime(cfg).await {
            Ok(built) => built,
            Err(e) => {
                error!("[Edge:{}] init failed: {:#}", inner.edge_id, e);
                return Err(e);
            }
        };

        inner.device_type_by_id = built.device_type_by_id;
        inner.normalizers_by_type = built.normalizers_by_type;
        inner.queues = built.queues;
        inner.devices = built.devices;
        inner.run_state = RunState::Ready;

        info!(
            "[Edge:{}] init ok: devices={}, run_state={}",
            inner.edge_id,
            inner.devices.len(),
            inner.run_state
        );
        Ok(())
    }

    async fn build_runtime(&self, cfg: &EdgeConfig) -> Result<BuiltRuntime> {
        let mut built = BuiltRuntime::default();

        for device_cfg in &cfg.devices {
            let device_id = &device_cfg.device_id;
            let device_type = &device_cfg.device_type;

            if device_id.is_empty() || device_type.is_empty() {
                bail!("device entry missing device_id/type");
            }
            if built.devices.contains_key(device_id) {
                bail!("duplicate device_id={}", device_id);
            }

            built
                .device_type_by_id
                .insert(device_id.clone(), device_type.clone());

            // one normalizer per distinct type, shared across its devices
            let type_key = device_type.to_ascii_lowercase();
            if !built.normalizers_by_type.contains_key(&type_key) {
                let normalizer = self
                    .registry
                    .create_normalizer(device_type)
                    .with_context(|| format!("no normalizer registered for type={device_type}"))?;
                built.normalizers_by_type.insert(type_key, normalizer);
            }

            built.queues.insert(
                device_id.clone(),
                Arc::new(TaskQueue::new(format!("queue-{device_id}"))),
            );

            let mut device = Device::new(device_cfg);
            device
                .init(&self.registry)
                .await
                .with_context(|| format!("device init failed: device_id={device_id}"))?;
            built.devices.insert(device_id.clone(), device);
        }

        Ok(built)
    }

    /// Start every device; legal only from `Ready`.
    ///
    /// If any device fails to start, the remaining starts are aborted, the
    /// state reverts to `Ready` and the error is returned; devices already
    /// started in the attempt are left running (documented limitation).
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let edge_id = inner.edge_id.clone();

        if inner.run_state != RunState::Ready {
            let message = format!("start rejected: run_state={}", inner.run_state);
            warn!("[Edge:{}] {}", edge_id, message);
            bail!(message);
        }

        info!("[Edge:{}] start: devices={}", edge_id, inner.devices.len());

        let device_ids: Vec<String> = inner.devices.keys().cloned().collect();
        for device_id in &device_ids {
            let Some(queue) = inner.queues.get(device_id).cloned() else {
                inner.run_state = RunState::Ready;
                bail!("queue missing for device_id={device_id}");
            };
            let Some(device) = inner.devices.get_mut(device_id) else {
                inner.run_state = RunState::Ready;
                bail!("device missing for device_id={device_id}");
            };

            if let Err(e) = device.start(queue, self.estop.clone()) {
                inner.run_state = RunState::Ready;
                error!(
                    "[Edge:{}] start failed: device_id={}, err={:#}",
                    edge_id, device_id, e
                );
                return Err(e.context(format!("device start failed: device_id={device_id}")));
            }
            info!("[Edge:{}] device started: device_id={}", edge_id, device_id);
        }

        inner.run_state = RunState::Running;

        if let Some(store) = &self.status_store {
            let snapshot_cfg = inner
                .persistence
                .clone()
                .filter(|p| p.enable && p.status_snapshot_enable);
            if let Some(persistence) = snapshot_cfg {
                let interval = Duration::from_millis(persistence.status_snapshot_interval_ms.max(1));
                inner.snapshot_loop = Some(SnapshotLoop::spawn(
                    Arc::downgrade(self),
                    store.clone(),
                    interval,
                ));
                info!(
                    "[Edge:{}] status snapshot loop started: interval={}ms",
                    edge_id, persistence.status_snapshot_interval_ms
                );
            }
        }

        info!("[Edge:{}] start ok: run_state={}", edge_id, inner.run_state);
        Ok(())
    }

    /// Route a raw command to its device queue.
    ///
    /// Evaluated in fixed order, short-circuiting at the first failure; every
    /// outcome is returned synchronously with a specific code and message.
    pub async fn submit(&self, cmd: &RawCommand) -> SubmitResult {
        let inner = self.inner.read().await;

        debug!(
            "[Edge:{}] submit: command_id={}, source={}",
            inner.edge_id, cmd.command_id, cmd.source
        );

        if inner.run_state != RunState::Running {
            let result = make_result(
                &inner,
                SubmitCode::NotRunning,
                format!("edge is not running, run_state={}", inner.run_state),
                cmd,
                "",
                "",
                0,
            );
            warn!("[Edge:{}] submit rejected: {}", inner.edge_id, result);
            return result;
        }

        if self.estop.load(Ordering::SeqCst) && !inner.allow_queue_when_estop {
            let reason = self.estop_reason.lock().unwrap().clone();
            let message = if reason.is_empty() {
                "estop active".to_string()
            } else {
                format!("estop active: {reason}")
            };
            let result = make_result(&inner, SubmitCode::EStop, message, cmd, "", "", 0);
            warn!("[Edge:{}] submit rejected: {}", inner.edge_id, result);
            return result;
        }

        if !cmd.payload.is_object() {
            let result = make_result(
                &inner,
                SubmitCode::InvalidCommand,
                "payload must be object",
                cmd,
                "",
                "",
                0,
            );
            error!("[Edge:{}] submit failed: {}", inner.edge_id, result);
            return result;
        }

        let device_id = json::str_or(&cmd.payload, "device_id", "").to_string();
        if device_id.is_empty() {
            let result = make_result(
                &inner,
                SubmitCode::InvalidCommand,
                "missing payload.device_id",
                cmd,
                "",
                "",
                0,
            );
            error!("[Edge:{}] submit failed: {}", inner.edge_id, result);
            return result;
        }

        let Some(device_type) = inner.device_type_by_id.get(&device_id) else {
            let result = make_result(
                &inner,
                SubmitCode::UnknownDevice,
                format!("unknown device_id={device_id}"),
                cmd,
                &device_id,
                "",
                0,
            );
            error!("[Edge:{}] submit failed: {}", inner.edge_id, result);
            return result;
        };

        let Some(normalizer) = inner
            .normalizers_by_type
            .get(&device_type.to_ascii_lowercase())
        else {
            let result = make_result(
                &inner,
                SubmitCode::InternalError,
                format!("normalizer missing for type={device_type}"),
                cmd,
                &device_id,
                "",
                0,
            );
            error!("[Edge:{}] submit failed: {}", inner.edge_id, result);
            return result;
        };

        let task = match normalizer.normalize(cmd, &inner.edge_id) {
            Ok(task) => task,
            Err(e) => {
                let result = make_result(
                    &inner,
                    SubmitCode::InvalidCommand,
                    format!("normalize failed: {e:#}"),
                    cmd,
                    &device_id,
                    "",
                    0,
                );
                error!("[Edge:{}] submit failed: {}", inner.edge_id, result);
                return result;
            }
        };

        let Some(queue) = inner.queues.get(&device_id) else {
            let result = make_result(
                &inner,
                SubmitCode::InternalError,
                format!("queue missing for device_id={device_id}"),
                cmd,
                &device_id,
                &task.task_id,
                0,
            );
            error!("[Edge:{}] submit failed: {}", inner.edge_id, result);
            return result;
        };

        if queue.is_shutdown() {
            let result = make_result(
                &inner,
                SubmitCode::QueueShutdown,
                "queue already shutdown",
                cmd,
                &device_id,
                &task.task_id,
                0,
            );
            warn!("[Edge:{}] submit rejected: {}", inner.edge_id, result);
            return result;
        }

        let task_id = task.task_id.clone();
        queue.push(task);
        let queue_size_after = queue.size() as i64;

        let result = make_result(
            &inner,
            SubmitCode::Ok,
            "queued",
            cmd,
            &device_id,
            &task_id,
            queue_size_after,
        );
        info!("[Edge:{}] submit ok: {}", inner.edge_id, result);
        result
    }

    /// Aggregate the live status of all devices into one snapshot.
    pub async fn status_snapshot(&self) -> EdgeStatus {
        let inner = self.inner.read().await;

        let estop_active = self.estop.load(Ordering::SeqCst);
        let run_state = match inner.run_state {
            RunState::Initializing | RunState::Ready => EdgeRunState::Initializing,
            RunState::Running => {
                if estop_active {
                    EdgeRunState::EStop
                } else {
                    EdgeRunState::Running
                }
            }
            RunState::Stopping | RunState::Stopped => EdgeRunState::Degraded,
        };

        let mut status = EdgeStatus {
            edge_id: inner.edge_id.clone(),
            run_state,
            boot_at_ms: inner.boot_at_ms,
            estop_active,
            estop_reason: self.estop_reason.lock().unwrap().clone(),
            version: inner.version.clone(),
            ..EdgeStatus::default()
        };

        let mut pending_total = 0_i64;
        let mut running_total = 0_i64;

        for (device_id, device) in &inner.devices {
            let mut device_status = device.status_snapshot();

            // queue_depth is aggregated here, not by the device
            if let Some(queue) = inner.queues.get(device_id) {
                device_status.queue_depth = queue.size() as i64;
                pending_total += device_status.queue_depth;
            }
            if device_status.work_state == DeviceWorkState::Busy {
                running_total += 1;
            }

            status.devices.insert(device_id.clone(), device_status);
        }

        status.tasks_pending_total = pending_total;
        status.tasks_running_total = running_total;

        debug!(
            "[Edge:{}] status snapshot: devices={}, pending_total={}, running_total={}, estop={}",
            status.edge_id,
            status.devices.len(),
            status.tasks_pending_total,
            status.tasks_running_total,
            status.estop_active
        );
        status
    }

    /// Set or clear the edge-wide E-Stop flag.
    ///
    /// Takes effect for new submits and for worker loops; workers poll the
    /// flag directly and stop picking up tasks while it is set.
    pub async fn set_estop(&self, active: bool, reason: &str) {
        let edge_id = {
            let inner = self.inner.write().await;
            self.estop.store(active, Ordering::SeqCst);
            *self.estop_reason.lock().unwrap() = reason.to_string();
            inner.edge_id.clone()
        };
        warn!(
            "[Edge:{}] estop set: active={}, reason={}",
            edge_id, active, reason
        );
    }

    /// Stop everything and release per-device resources. Idempotent.
    ///
    /// Strictly ordered: snapshot loop, then device stop signals, then queue
    /// shutdowns (waking blocked workers), then device joins. No worker task
    /// survives this call returning.
    pub async fn shutdown(&self) {
        let snapshot_loop = {
            let mut inner = self.inner.write().await;
            if matches!(inner.run_state, RunState::Stopping | RunState::Stopped) {
                return;
            }
            warn!(
                "[Edge:{}] shutdown: run_state={}",
                inner.edge_id, inner.run_state
            );
            inner.run_state = RunState::Stopping;
            inner.snapshot_loop.take()
        };

        // stopped outside the lock; the loop may be mid-snapshot
        if let Some(snapshot_loop) = snapshot_loop {
            snapshot_loop.stop().await;
        }

        let mut inner = self.inner.write().await;
        let edge_id = inner.edge_id.clone();

        for (device_id, device) in &inner.devices {
            debug!("[Edge:{}] shutdown: stopping device_id={}", edge_id, device_id);
            device.stop();
        }
        for (device_id, queue) in &inner.queues {
            debug!(
                "[Edge:{}] shutdown: closing queue for device_id={}",
                edge_id, device_id
            );
            queue.shutdown();
        }
        for device in inner.devices.values_mut() {
            device.join().await;
        }

        inner.devices.clear();
        inner.queues.clear();
        inner.device_type_by_id.clear();
        inner.normalizers_by_type.clear();
        inner.run_state = RunState::Stopped;

        warn!("[Edge:{}] shutdown complete", edge_id);
    }

    async fn teardown_locked(inner: &mut EdgeInner) {
        if inner.devices.is_empty() && inner.queues.is_empty() {
            return;
        }
        let edge_id = inner.edge_id.clone();
        warn!(
            "[Edge:{}] tearing down {} devices from previous init",
            edge_id,
            inner.devices.len()
        );

        for device in inner.devices.values() {
            device.stop();
        }
        for queue in inner.queues.values() {
            queue.shutdown();
        }
        for device in inner.devices.values_mut() {
            device.join().await;
        }

        inner.devices.clear();
        inner.queues.clear();
        inner.device_type_by_id.clear();
        inner.normalizers_by_type.clear();
    }
}

fn make_result(
    inner: &EdgeInner,
    code: SubmitCode,
    message: impl Into<String>,
    cmd: &RawCommand,
    device_id: &str,
    task_id: &str,
    queue_size_after: i64,
) -> SubmitResult {
    SubmitResult {
        code,
        message: message.into(),
        edge_id: inner.edge_id.clone(),
        device_id: device_id.to_string(),
        command_id: cmd.command_id.clone(),
        task_id: task_id.to_string(),
        queue_size_after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::MemoryStatusStore;

    fn edge_cfg(allow_queue_when_estop: bool) -> EdgeConfig {
        serde_json::from_value(serde_json::json!({
            "edge_id": "edge-1",
            "version": "0.1.0",
            "allow_queue_when_estop": allow_queue_when_estop,
            "devices": [
                {
                    "device_id": "uuv-1",
                    "type": "uuv",
                    "device_name": "UUV-ONE",
                    "control": {"simulate_latency_ms": 10}
                }
            ]
        }))
        .unwrap()
    }

    fn nav_cmd(device_id: &str) -> RawCommand {
        RawCommand {
            command_id: "cmd-1".into(),
            source: "test".into(),
            payload: serde_json::json!({
                "device_id": device_id,
                "capability": "navigate",
                "action": "set",
                "params": {"lat": 1.0, "lon": 2.0}
            }),
            received_at_ms: 1,
            ..RawCommand::default()
        }
    }

    async fn wait_until<F, Fut>(cond: F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if cond().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_init_then_submit_not_running() {
        let edge = Edge::new(Registry::builtin());
        edge.init(&edge_cfg(false)).await.unwrap();

        let result = edge.submit(&nav_cmd("uuv-1")).await;
        assert_eq!(result.code, SubmitCode::NotRunning);
        assert_eq!(result.edge_id, "edge-1");
        assert_eq!(result.queue_size_after, 0);

        // rejected before any queue was touched
        let status = edge.status_snapshot().await;
        assert_eq!(status.tasks_pending_total, 0);

        edge.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_then_submit_ok() {
        let edge = Edge::new(Registry::builtin());
        edge.init(&edge_cfg(false)).await.unwrap();
        edge.start().await.unwrap();

        let result = edge.submit(&nav_cmd("uuv-1")).await;
        assert_eq!(result.code, SubmitCode::Ok);
        assert_eq!(result.device_id, "uuv-1");
        assert!(!result.task_id.is_empty());

        wait_until(|| async {
            let status = edge.status_snapshot().await;
            status.devices["uuv-1"].last_task_at_ms > 0
                && status.devices["uuv-1"].running_task_id.is_empty()
        })
        .await;

        let status = edge.status_snapshot().await;
        assert_eq!(status.run_state, EdgeRunState::Running);
        assert_eq!(status.devices["uuv-1"].work_state, DeviceWorkState::Idle);

        edge.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_unknown_device() {
        let edge = Edge::new(Registry::builtin());
        edge.init(&edge_cfg(false)).await.unwrap();
        edge.start().await.unwrap();

        let result = edge.submit(&nav_cmd("not-exist")).await;
        assert_eq!(result.code, SubmitCode::UnknownDevice);
        assert_eq!(result.device_id, "not-exist");

        edge.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_missing_device_id() {
        let edge = Edge::new(Registry::builtin());
        edge.init(&edge_cfg(false)).await.unwrap();
        edge.start().await.unwrap();

        let cmd = RawCommand {
            command_id: "cmd-1".into(),
            payload: serde_json::json!({"capability": "navigate", "action": "set"}),
            ..RawCommand::default()
        };
        let result = edge.submit(&cmd).await;
        assert_eq!(result.code, SubmitCode::InvalidCommand);

        edge.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_payload_not_object() {
        let edge = Edge::new(Registry::builtin());
        edge.init(&edge_cfg(false)).await.unwrap();
        edge.start().await.unwrap();

        let cmd = RawCommand {
            payload: serde_json::json!("just a string"),
            ..RawCommand::default()
        };
        let result = edge.submit(&cmd).await;
        assert_eq!(result.code, SubmitCode::InvalidCommand);

        edge.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_normalize_failure() {
        let edge = Edge::new(Registry::builtin());
        edge.init(&edge_cfg(false)).await.unwrap();
        edge.start().await.unwrap();

        // device exists but the uuv normalizer requires capability/action
        let cmd = RawCommand {
            payload: serde_json::json!({"device_id": "uuv-1"}),
            ..RawCommand::default()
        };
        let result = edge.submit(&cmd).await;
        assert_eq!(result.code, SubmitCode::InvalidCommand);
        assert!(result.message.contains("normalize failed"));

        edge.shutdown().await;
    }

    #[tokio::test]
    async fn test_estop_rejects_submit_by_default() {
        let edge = Edge::new(Registry::builtin());
        edge.init(&edge_cfg(false)).await.unwrap();
        edge.start().await.unwrap();

        edge.set_estop(true, "test estop").await;

        let result = edge.submit(&nav_cmd("uuv-1")).await;
        assert_eq!(result.code, SubmitCode::EStop);
        assert!(result.message.contains("test estop"));

        let status = edge.status_snapshot().await;
        assert_eq!(status.run_state, EdgeRunState::EStop);
        assert!(status.estop_active);
        assert_eq!(status.estop_reason, "test estop");

        edge.shutdown().await;
    }

    #[tokio::test]
    async fn test_estop_allow_queue_then_resume() {
        let edge = Edge::new(Registry::builtin());
        edge.init(&edge_cfg(true)).await.unwrap();
        edge.start().await.unwrap();

        edge.set_estop(true, "hold").await;
        // let the worker observe the flag before queueing
        tokio::time::sleep(Duration::from_millis(300)).await;

        let result = edge.submit(&nav_cmd("uuv-1")).await;
        assert_eq!(result.code, SubmitCode::Ok);
        assert_eq!(result.queue_size_after, 1);

        // worker must not pick the task up while the flag is set
        tokio::time::sleep(Duration::from_millis(300)).await;
        let status = edge.status_snapshot().await;
        assert_eq!(status.devices["uuv-1"].last_task_at_ms, 0);
        assert_eq!(status.tasks_pending_total, 1);

        edge.set_estop(false, "").await;
        wait_until(|| async {
            edge.status_snapshot().await.devices["uuv-1"].last_task_at_ms > 0
        })
        .await;

        edge.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_rejected_when_not_ready() {
        let edge = Edge::new(Registry::builtin());
        assert!(edge.start().await.is_err());

        edge.init(&edge_cfg(false)).await.unwrap();
        edge.start().await.unwrap();
        // second start while Running is rejected with no side effects
        assert!(edge.start().await.is_err());
        assert_eq!(edge.run_state().await, RunState::Running);

        edge.shutdown().await;
    }

    #[tokio::test]
    async fn test_init_failure_rolls_back() {
        let edge = Edge::new(Registry::builtin());

        let bad_cfg: EdgeConfig = serde_json::from_value(serde_json::json!({
            "edge_id": "edge-1",
            "devices": [{"device_id": "x-1", "type": "glider"}]
        }))
        .unwrap();
        assert!(edge.init(&bad_cfg).await.is_err());
        assert_eq!(edge.run_state().await, RunState::Initializing);
        assert!(edge.status_snapshot().await.devices.is_empty());

        // a clean re-init succeeds
        edge.init(&edge_cfg(false)).await.unwrap();
        assert_eq!(edge.run_state().await, RunState::Ready);

        edge.shutdown().await;
    }

    #[tokio::test]
    async fn test_init_rejects_missing_device_fields() {
        let edge = Edge::new(Registry::builtin());
        let bad_cfg: EdgeConfig = serde_json::from_value(serde_json::json!({
            "edge_id": "edge-1",
            "devices": [{"type": "uuv"}]
        }))
        .unwrap();
        let err = edge.init(&bad_cfg).await.unwrap_err();
        assert!(err.to_string().contains("device_id"));
    }

    #[tokio::test]
    async fn test_reinit_replaces_running_devices() {
        let edge = Edge::new(Registry::builtin());
        edge.init(&edge_cfg(false)).await.unwrap();
        edge.start().await.unwrap();

        // re-init tears down the running devices and lands in Ready
        let cfg2: EdgeConfig = serde_json::from_value(serde_json::json!({
            "edge_id": "edge-2",
            "devices": [{"device_id": "wind-1", "type": "wind_sensor"}]
        }))
        .unwrap();
        edge.init(&cfg2).await.unwrap();
        assert_eq!(edge.run_state().await, RunState::Ready);
        assert_eq!(edge.id().await, "edge-2");

        let status = edge.status_snapshot().await;
        assert!(status.devices.contains_key("wind-1"));
        assert!(!status.devices.contains_key("uuv-1"));

        edge.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_inflight_task() {
        let cfg: EdgeConfig = serde_json::from_value(serde_json::json!({
            "edge_id": "edge-1",
            "devices": [{
                "device_id": "uuv-1",
                "type": "uuv",
                "control": {"simulate_latency_ms": 200}
            }]
        }))
        .unwrap();

        let edge = Edge::new(Registry::builtin());
        edge.init(&cfg).await.unwrap();
        edge.start().await.unwrap();

        let result = edge.submit(&nav_cmd("uuv-1")).await;
        assert_eq!(result.code, SubmitCode::Ok);

        // let the worker pick the task up, then shut down mid-execution
        wait_until(|| async {
            !edge.status_snapshot().await.devices["uuv-1"]
                .running_task_id
                .is_empty()
        })
        .await;

        edge.shutdown().await;

        let result = edge.submit(&nav_cmd("uuv-1")).await;
        assert_eq!(result.code, SubmitCode::NotRunning);
        assert_eq!(edge.run_state().await, RunState::Stopped);

        // shutdown is idempotent
        edge.shutdown().await;
        assert_eq!(edge.run_state().await, RunState::Stopped);
    }

    #[tokio::test]
    async fn test_status_snapshot_degraded_after_shutdown() {
        let edge = Edge::new(Registry::builtin());
        edge.init(&edge_cfg(false)).await.unwrap();
        edge.start().await.unwrap();
        edge.shutdown().await;

        let status = edge.status_snapshot().await;
        assert_eq!(status.run_state, EdgeRunState::Degraded);
        assert!(status.devices.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_loop_writes_to_store() {
        let store = MemoryStatusStore::new();
        let cfg: EdgeConfig = serde_json::from_value(serde_json::json!({
            "edge_id": "edge-ss-1",
            "devices": [{
                "device_id": "uuv-1",
                "type": "uuv",
                "control": {"simulate_latency_ms": 1}
            }],
            "persistence": {
                "enable": true,
                "status_snapshot_enable": true,
                "status_snapshot_interval_ms": 50
            }
        }))
        .unwrap();

        let edge = Edge::with_status_store(Registry::builtin(), store.clone());
        edge.init(&cfg).await.unwrap();
        edge.start().await.unwrap();

        wait_until(|| async {
            store.edge_snapshot_count("edge-ss-1") > 0
                && store.device_snapshot_count("edge-ss-1", "uuv-1") > 0
        })
        .await;

        edge.shutdown().await;

        // the loop is stopped: counts no longer grow
        let count_after_shutdown = store.edge_snapshot_count("edge-ss-1");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.edge_snapshot_count("edge-ss-1"), count_after_shutdown);
    }

    #[tokio::test]
    async fn test_mixed_device_types() {
        let cfg: EdgeConfig = serde_json::from_value(serde_json::json!({
            "edge_id": "edge-mixed",
            "devices": [
                {"device_id": "uuv-1", "type": "uuv", "control": {"simulate_latency_ms": 1}},
                {"device_id": "wind-1", "type": "wind_sensor", "control": {"simulate_latency_ms": 1}},
                {"device_id": "depth-1", "type": "depth_sensor", "control": {"simulate_latency_ms": 1}}
            ]
        }))
        .unwrap();

        let edge = Edge::new(Registry::builtin());
        edge.init(&cfg).await.unwrap();
        edge.start().await.unwrap();

        let r1 = edge.submit(&nav_cmd("uuv-1")).await;
        assert_eq!(r1.code, SubmitCode::Ok);

        let wind_cmd = RawCommand {
            payload: serde_json::json!({"device_id": "wind-1"}),
            ..RawCommand::default()
        };
        let r2 = edge.submit(&wind_cmd).await;
        assert_eq!(r2.code, SubmitCode::Ok);

        let depth_cmd = RawCommand {
            payload: serde_json::json!({"device_id": "depth-1", "action": "read"}),
            ..RawCommand::default()
        };
        let r3 = edge.submit(&depth_cmd).await;
        assert_eq!(r3.code, SubmitCode::Ok);

        wait_until(|| async {
            let status = edge.status_snapshot().await;
            status.devices.values().all(|d| d.last_task_at_ms > 0)
        })
        .await;

        edge.shutdown().await;
    }
}
