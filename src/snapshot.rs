//! Periodic persistence of edge and device status snapshots.
//!
//! The loop is a background tokio task owned by the edge. Store failures are
//! logged and never reach the dispatch path.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use nereid_shared::{now_ms, DeviceStatus, EdgeStatus};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::edge::Edge;

/// Persistence collaborator for status snapshots. Fire-and-forget from the
/// snapshot loop's perspective.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn insert_edge_snapshot(&self, status: &EdgeStatus) -> Result<()>;

    async fn insert_device_snapshot(&self, edge_id: &str, status: &DeviceStatus) -> Result<()>;
}

/// Handle to the running snapshot loop.
///
/// `stop` is safe to call while holding the edge's write lock: the loop races
/// every edge-touching await against cancellation, so a pending status read
/// is dropped rather than waited on.
pub(crate) struct SnapshotLoop {
    stop_flag: Arc<AtomicBool>,
    stop_notify: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl SnapshotLoop {
    pub(crate) fn spawn(
        edge: Weak<Edge>,
        store: Arc<dyn StatusStore>,
        interval: Duration,
    ) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_notify = Arc::new(Notify::new());

        let handle = tokio::spawn(run_loop(
            edge,
            store,
            interval,
            stop_flag.clone(),
            stop_notify.clone(),
        ));

        Self {
            stop_flag,
            stop_notify,
            handle,
        }
    }

    pub(crate) async fn stop(self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();
        if let Err(e) = self.handle.await {
            error!("[Snapshot] loop join failed: {}", e);
        }
    }
}

async fn run_loop(
    edge: Weak<Edge>,
    store: Arc<dyn StatusStore>,
    interval: Duration,
    stop_flag: Arc<AtomicBool>,
    stop_notify: Arc<Notify>,
) {
    info!("[Snapshot] loop started: interval={}ms", interval.as_millis());
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // consume the immediate first tick so the first snapshot lands one
    // interval after start
    ticker.tick().await;

    loop {
        let cancelled = stop_notify.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();
        if stop_flag.load(Ordering::SeqCst) {
            break;
        }

        tokio::select! {
            _ = cancelled.as_mut() => break,
            _ = ticker.tick() => {}
        }

        let Some(edge) = edge.upgrade() else {
            info!("[Snapshot] edge dropped, exiting");
            break;
        };

        let cancelled = stop_notify.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        let status = tokio::select! {
            _ = cancelled.as_mut() => break,
            status = edge.status_snapshot() => status,
        };

        if let Err(e) = store.insert_edge_snapshot(&status).await {
            warn!(
                "[Snapshot] edge snapshot write failed: edge_id={}, err={:#}",
                status.edge_id, e
            );
        }
        for device_status in status.devices.values() {
            if let Err(e) = store
                .insert_device_snapshot(&status.edge_id, device_status)
                .await
            {
                warn!(
                    "[Snapshot] device snapshot write failed: device_id={}, err={:#}",
                    device_status.device_id, e
                );
            }
        }
        debug!(
            "[Snapshot] wrote snapshots: edge_id={}, devices={}",
            status.edge_id,
            status.devices.len()
        );
    }

    info!("[Snapshot] loop exited");
}

/// In-memory store for tests and local observability endpoints.
#[derive(Default)]
pub struct MemoryStatusStore {
    edges: Mutex<Vec<EdgeStatus>>,
    devices: Mutex<Vec<(String, DeviceStatus)>>,
}

impl MemoryStatusStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn edge_snapshot_count(&self, edge_id: &str) -> usize {
        self.edges
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.edge_id == edge_id)
            .count()
    }

    pub fn device_snapshot_count(&self, edge_id: &str, device_id: &str) -> usize {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .filter(|(eid, s)| eid == edge_id && s.device_id == device_id)
            .count()
    }

    pub fn last_edge_snapshot(&self, edge_id: &str) -> Option<EdgeStatus> {
        self.edges
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.edge_id == edge_id)
            .cloned()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn insert_edge_snapshot(&self, status: &EdgeStatus) -> Result<()> {
        self.edges.lock().unwrap().push(status.clone());
        Ok(())
    }

    async fn insert_device_snapshot(&self, edge_id: &str, status: &DeviceStatus) -> Result<()> {
        self.devices
            .lock()
            .unwrap()
            .push((edge_id.to_string(), status.clone()));
        Ok(())
    }
}

/// Append-only JSON-lines store: one record per snapshot row.
pub struct JsonlStatusStore {
    file: tokio::sync::Mutex<tokio::fs::File>,
}

#[derive(Serialize)]
struct SnapshotRecord<'a, T: Serialize> {
    kind: &'static str,
    ts_ms: i64,
    edge_id: &'a str,
    status: &'a T,
}

impl JsonlStatusStore {
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("failed to open snapshot file {}", path.display()))?;

        Ok(Self {
            file: tokio::sync::Mutex::new(file),
        })
    }

    async fn append<T: Serialize>(&self, record: &SnapshotRecord<'_, T>) -> Result<()> {
        let mut line = serde_json::to_string(record).context("failed to encode snapshot")?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .context("failed to append snapshot record")?;
        Ok(())
    }
}

#[async_trait]
impl StatusStore for JsonlStatusStore {
    async fn insert_edge_snapshot(&self, status: &EdgeStatus) -> Result<()> {
        self.append(&SnapshotRecord {
            kind: "edge",
            ts_ms: now_ms(),
            edge_id: &status.edge_id,
            status,
        })
        .await
    }

    async fn insert_device_snapshot(&self, edge_id: &str, status: &DeviceStatus) -> Result<()> {
        self.append(&SnapshotRecord {
            kind: "device",
            ts_ms: now_ms(),
            edge_id,
            status,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_counts() {
        let store = MemoryStatusStore::new();

        let edge_status = EdgeStatus {
            edge_id: "edge-1".into(),
            ..EdgeStatus::default()
        };
        store.insert_edge_snapshot(&edge_status).await.unwrap();
        store.insert_edge_snapshot(&edge_status).await.unwrap();

        let device_status = DeviceStatus {
            device_id: "uuv-1".into(),
            ..DeviceStatus::default()
        };
        store
            .insert_device_snapshot("edge-1", &device_status)
            .await
            .unwrap();

        assert_eq!(store.edge_snapshot_count("edge-1"), 2);
        assert_eq!(store.edge_snapshot_count("edge-2"), 0);
        assert_eq!(store.device_snapshot_count("edge-1", "uuv-1"), 1);
        assert!(store.last_edge_snapshot("edge-1").is_some());
    }

    #[tokio::test]
    async fn test_jsonl_store_appends_records() {
        let path = std::env::temp_dir().join(format!(
            "nereid-snap-test-{}.jsonl",
            nereid_shared::new_id("f")
        ));
        let store = JsonlStatusStore::create(&path).await.unwrap();

        let edge_status = EdgeStatus {
            edge_id: "edge-1".into(),
            ..EdgeStatus::default()
        };
        store.insert_edge_snapshot(&edge_status).await.unwrap();

        let device_status = DeviceStatus {
            device_id: "uuv-1".into(),
            ..DeviceStatus::default()
        };
        store
            .insert_device_snapshot("edge-1", &device_status)
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["kind"], "edge");
        assert_eq!(first["edge_id"], "edge-1");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["kind"], "device");
        assert_eq!(second["status"]["device_id"], "uuv-1");

        tokio::fs::remove_file(&path).await.ok();
    }
}
