use std::sync::Arc;
use std::time::Duration;

use nereid_edge::{DeviceConfig, Edge, EdgeConfig, JsonlStatusStore, Registry, StatusStore};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cfg = match std::env::args().nth(1) {
        Some(path) => EdgeConfig::from_file(&path)?,
        None => demo_config(),
    };

    info!("Edge runtime starting: {}", cfg.edge_id);
    info!("  devices: {}", cfg.devices.len());

    let store: Option<Arc<dyn StatusStore>> = match cfg.persistence.as_ref() {
        Some(p) if p.enable => match &p.path {
            Some(path) => {
                let store = JsonlStatusStore::create(path).await?;
                info!("  snapshot store: {}", path.display());
                Some(Arc::new(store))
            }
            None => None,
        },
        _ => None,
    };

    let edge = match store {
        Some(store) => Edge::with_status_store(Registry::builtin(), store),
        None => Edge::new(Registry::builtin()),
    };

    edge.init(&cfg).await?;
    edge.start().await?;
    info!("Edge runtime started: {}", edge.id().await);

    // Periodic status log
    let edge_clone = edge.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let status = edge_clone.status_snapshot().await;
            info!(
                "status: run_state={}, devices={}, pending={}, running={}",
                status.run_state.as_str(),
                status.devices.len(),
                status.tasks_pending_total,
                status.tasks_running_total
            );
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
    }
    warn!("shutdown signal received");

    edge.shutdown().await;
    info!("Edge runtime stopped");
    Ok(())
}

fn demo_config() -> EdgeConfig {
    EdgeConfig {
        edge_id: "edge-001".into(),
        devices: vec![
            DeviceConfig {
                device_id: "uuv-1".into(),
                device_type: "uuv".into(),
                device_name: "UUV-ONE".into(),
                control: serde_json::json!({"simulate_latency_ms": 100}),
            },
            DeviceConfig {
                device_id: "wind-1".into(),
                device_type: "wind_sensor".into(),
                device_name: String::new(),
                control: serde_json::json!({"simulate_latency_ms": 20}),
            },
            DeviceConfig {
                device_id: "depth-1".into(),
                device_type: "depth_sensor".into(),
                device_name: String::new(),
                control: serde_json::json!({"simulate_latency_ms": 20, "base_depth_m": 15.0}),
            },
        ],
        ..EdgeConfig::default()
    }
}
