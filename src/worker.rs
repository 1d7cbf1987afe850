//! Per-device dispatch loop: pop, execute, report.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nereid_shared::{now_ms, timing, ErrorCode, Task, TaskResult, TaskState};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::control::Executor;
use crate::queue::TaskQueue;

/// Observer for task transitions inside the dispatch loop.
///
/// `on_task_start` fires after a successful pop, strictly before execution;
/// `on_task_finish` fires strictly after the executor returns. Both are
/// invoked synchronously from the loop.
pub trait WorkerHooks: Send + Sync {
    fn on_task_start(&self, task: &Task);
    fn on_task_finish(&self, task: &Task, result: &TaskResult);
}

/// Handle to one device's dispatch loop.
///
/// The loop runs as a dedicated tokio task. `stop` signals the loop to exit
/// after its current iteration; a task already popped always runs to
/// completion. While the E-Stop flag is set the loop pauses pickup and
/// resumes once the flag clears.
pub struct Worker {
    name: String,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(
        name: impl Into<String>,
        queue: Arc<TaskQueue>,
        executor: Arc<dyn Executor>,
        estop: Arc<AtomicBool>,
        hooks: Arc<dyn WorkerHooks>,
    ) -> Self {
        let name = name.into();
        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));

        let handle = tokio::spawn(run_loop(
            name.clone(),
            queue,
            executor,
            estop,
            hooks,
            stop.clone(),
            running.clone(),
        ));

        Self {
            name,
            stop,
            running,
            handle: Some(handle),
        }
    }

    /// Signal the loop to exit; never aborts in-flight execution.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait until the loop task has exited. No-op when already joined.
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("[Worker:{}] join failed: {}", self.name, e);
            }
        }
    }
}

async fn run_loop(
    name: String,
    queue: Arc<TaskQueue>,
    executor: Arc<dyn Executor>,
    estop: Arc<AtomicBool>,
    hooks: Arc<dyn WorkerHooks>,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
) {
    info!("[Worker:{}] loop started", name);

    loop {
        if stop.load(Ordering::SeqCst) {
            info!("[Worker:{}] stop requested, exiting", name);
            break;
        }

        // E-Stop pauses pickup; queued tasks stay put until the flag clears.
        if estop.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(timing::ESTOP_POLL_INTERVAL_MS)).await;
            continue;
        }

        let Some(mut task) = queue
            .pop_blocking(timing::WORKER_POLL_INTERVAL_MS as i64)
            .await
        else {
            if queue.is_shutdown() && queue.size() == 0 {
                info!("[Worker:{}] queue drained after shutdown, exiting", name);
                break;
            }
            continue;
        };

        task.state = TaskState::Running;
        hooks.on_task_start(&task);

        let result = match executor.do_task(&task).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    "[Worker:{}] executor failed: task_id={}, err={:#}",
                    name, task.task_id, e
                );
                let now = now_ms();
                TaskResult {
                    code: ErrorCode::InternalError,
                    message: format!("executor failure: {e:#}"),
                    started_at_ms: now,
                    finished_at_ms: now,
                    ..TaskResult::default()
                }
            }
        };

        task.state = if result.is_ok() {
            TaskState::Succeeded
        } else {
            TaskState::Failed
        };
        task.result = result.clone();

        hooks.on_task_finish(&task, &result);
    }

    running.store(false, Ordering::SeqCst);
    info!("[Worker:{}] loop exited", name);
}
