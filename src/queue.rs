//! Per-device task queue with blocking pop and explicit shutdown semantics.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use nereid_shared::Task;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Thread-safe FIFO of tasks feeding one device worker.
///
/// Shutdown is idempotent and wakes every blocked popper; items queued
/// before shutdown remain poppable until drained. Push after shutdown is a
/// silent (logged) drop. The internal state sits behind a plain mutex, so
/// `shutdown` can be called from any context, including drop paths.
pub struct TaskQueue {
    name: String,
    inner: Mutex<Inner>,
    notify: Notify,
}

struct Inner {
    queue: VecDeque<Task>,
    shutdown: bool,
}

impl TaskQueue {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        debug!("[TaskQueue:{}] created", name);
        Self {
            name,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                shutdown: false,
            }),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a task. No-op (with a warning) once the queue is shut down.
    pub fn push(&self, task: Task) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.shutdown {
                warn!(
                    "[TaskQueue:{}] push rejected, queue is shut down: task_id={}",
                    self.name, task.task_id
                );
                return;
            }
            inner.queue.push_back(task);
            debug!(
                "[TaskQueue:{}] push ok: size={}",
                self.name,
                inner.queue.len()
            );
        }
        self.notify.notify_one();
    }

    /// Pop the oldest task, waiting up to `timeout_ms` for one to arrive.
    ///
    /// A negative timeout waits indefinitely until an item is available or
    /// the queue is shut down. Remaining items are still handed out after
    /// shutdown; `None` means timeout-with-empty-queue or empty-and-shutdown.
    pub async fn pop_blocking(&self, timeout_ms: i64) -> Option<Task> {
        if timeout_ms < 0 {
            return self.pop_wait().await;
        }
        match tokio::time::timeout(Duration::from_millis(timeout_ms as u64), self.pop_wait()).await
        {
            Ok(task) => task,
            Err(_) => {
                debug!(
                    "[TaskQueue:{}] pop timed out after {}ms",
                    self.name, timeout_ms
                );
                None
            }
        }
    }

    async fn pop_wait(&self) -> Option<Task> {
        loop {
            // Register interest before checking state so a notify between the
            // check and the await is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(task) = inner.queue.pop_front() {
                    debug!(
                        "[TaskQueue:{}] pop ok: task_id={}, size={}",
                        self.name,
                        task.task_id,
                        inner.queue.len()
                    );
                    return Some(task);
                }
                if inner.shutdown {
                    info!(
                        "[TaskQueue:{}] pop returning none: queue shut down and empty",
                        self.name
                    );
                    return None;
                }
            }

            notified.await;
        }
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    /// Drop all pending tasks.
    pub fn clear(&self) {
        let dropped = {
            let mut inner = self.inner.lock().unwrap();
            let n = inner.queue.len();
            inner.queue.clear();
            n
        };
        warn!("[TaskQueue:{}] cleared {} pending tasks", self.name, dropped);
    }

    /// Close the queue and wake every waiter. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.shutdown {
                return;
            }
            inner.shutdown = true;
            warn!(
                "[TaskQueue:{}] shutting down, waking waiters: size={}",
                self.name,
                inner.queue.len()
            );
        }
        self.notify.notify_waiters();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().unwrap().shutdown
    }
}
