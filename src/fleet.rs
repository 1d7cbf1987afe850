//! Fleet: manages several edges in one process and summarizes their health.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use nereid_shared::now_ms;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::edge::Edge;

/// Thread-safe set of edges keyed by edge id.
pub struct Fleet {
    edges: RwLock<HashMap<String, Arc<Edge>>>,
}

impl Fleet {
    pub fn new() -> Self {
        Self {
            edges: RwLock::new(HashMap::new()),
        }
    }

    /// Add an edge; rejects a duplicate id.
    pub async fn append(&self, edge: Arc<Edge>) -> Result<()> {
        let edge_id = edge.id().await;
        if edge_id.is_empty() {
            bail!("edge id is empty");
        }

        let mut edges = self.edges.write().await;
        if edges.contains_key(&edge_id) {
            bail!("edge already exists: edge_id={edge_id}");
        }
        info!("[Fleet] edge added: edge_id={}", edge_id);
        edges.insert(edge_id, edge);
        Ok(())
    }

    pub async fn get(&self, edge_id: &str) -> Option<Arc<Edge>> {
        self.edges.read().await.get(edge_id).cloned()
    }

    pub async fn remove(&self, edge_id: &str) -> bool {
        let removed = self.edges.write().await.remove(edge_id).is_some();
        if removed {
            info!("[Fleet] edge removed: edge_id={}", edge_id);
        }
        removed
    }

    pub async fn ids(&self) -> Vec<String> {
        self.edges.read().await.keys().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.edges.read().await.len()
    }

    /// Start every edge; collects failures instead of stopping at the first.
    pub async fn start_all(&self) -> Result<()> {
        let edges: Vec<Arc<Edge>> = self.edges.read().await.values().cloned().collect();

        let mut failures = Vec::new();
        for edge in edges {
            let edge_id = edge.id().await;
            if let Err(e) = edge.start().await {
                warn!("[Fleet] edge start failed: edge_id={}, err={:#}", edge_id, e);
                failures.push(format!("{edge_id}: {e:#}"));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            bail!("some edges failed to start: {}", failures.join("; "));
        }
    }

    pub async fn shutdown_all(&self) {
        let edges: Vec<Arc<Edge>> = self.edges.read().await.values().cloned().collect();
        for edge in edges {
            edge.shutdown().await;
        }
    }

    /// Heartbeat summary for the transport layer.
    pub async fn heartbeat_info(&self) -> serde_json::Value {
        let edges: Vec<Arc<Edge>> = self.edges.read().await.values().cloned().collect();

        let mut entries = Vec::with_capacity(edges.len());
        for edge in &edges {
            let status = edge.status_snapshot().await;
            entries.push(serde_json::json!({
                "edge_id": status.edge_id,
                "run_state": status.run_state,
                "estop_active": status.estop_active,
                "devices": status.devices.len(),
                "tasks_pending_total": status.tasks_pending_total,
                "tasks_running_total": status.tasks_running_total,
            }));
        }

        serde_json::json!({
            "ts_ms": now_ms(),
            "edge_count": edges.len(),
            "edges": entries,
        })
    }
}

impl Default for Fleet {
    fn default() -> Self {
        Self::new()
    }
}
