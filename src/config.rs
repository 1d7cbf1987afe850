//! Configuration surface consumed by edge init.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nereid_shared::timing;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level edge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    #[serde(default = "default_edge_id")]
    pub edge_id: String,

    #[serde(default = "default_version")]
    pub version: String,

    /// Allow submits to enqueue while the E-Stop flag is active.
    #[serde(default)]
    pub allow_queue_when_estop: bool,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    #[serde(default)]
    pub persistence: Option<PersistenceConfig>,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            edge_id: default_edge_id(),
            version: default_version(),
            allow_queue_when_estop: false,
            devices: Vec::new(),
            persistence: None,
        }
    }
}

impl EdgeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

/// Per-device entry in the edge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub device_id: String,

    #[serde(rename = "type", default)]
    pub device_type: String,

    #[serde(default)]
    pub device_name: String,

    /// Driver options, handed verbatim to the executor's init.
    #[serde(default = "empty_object")]
    pub control: Value,
}

/// Status snapshot persistence options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_true")]
    pub enable: bool,

    #[serde(default = "default_true")]
    pub status_snapshot_enable: bool,

    #[serde(default = "default_snapshot_interval_ms")]
    pub status_snapshot_interval_ms: u64,

    /// Target file for the JSON-lines store, when used.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enable: true,
            status_snapshot_enable: true,
            status_snapshot_interval_ms: default_snapshot_interval_ms(),
            path: None,
        }
    }
}

fn default_edge_id() -> String {
    "edge-unknown".to_string()
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_snapshot_interval_ms() -> u64 {
    timing::DEFAULT_SNAPSHOT_INTERVAL_MS
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let cfg: EdgeConfig = serde_json::from_value(serde_json::json!({
            "edge_id": "edge-1",
            "version": "0.2.0",
            "allow_queue_when_estop": true,
            "devices": [
                {
                    "device_id": "uuv-1",
                    "type": "uuv",
                    "device_name": "UUV-ONE",
                    "control": {"simulate_latency_ms": 10}
                },
                {
                    "device_id": "wind-1",
                    "type": "wind_sensor"
                }
            ],
            "persistence": {
                "enable": true,
                "status_snapshot_enable": true,
                "status_snapshot_interval_ms": 200
            }
        }))
        .unwrap();

        assert_eq!(cfg.edge_id, "edge-1");
        assert!(cfg.allow_queue_when_estop);
        assert_eq!(cfg.devices.len(), 2);
        assert_eq!(cfg.devices[0].device_type, "uuv");
        assert_eq!(cfg.devices[1].device_name, "");
        assert!(cfg.devices[1].control.is_object());

        let persistence = cfg.persistence.unwrap();
        assert!(persistence.status_snapshot_enable);
        assert_eq!(persistence.status_snapshot_interval_ms, 200);
    }

    #[test]
    fn test_defaults() {
        let cfg: EdgeConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(cfg.edge_id, "edge-unknown");
        assert_eq!(cfg.version, "0.1.0");
        assert!(!cfg.allow_queue_when_estop);
        assert!(cfg.devices.is_empty());
        assert!(cfg.persistence.is_none());

        let persistence = PersistenceConfig::default();
        assert_eq!(
            persistence.status_snapshot_interval_ms,
            timing::DEFAULT_SNAPSHOT_INTERVAL_MS
        );
    }

    #[test]
    fn test_config_roundtrip() {
        let cfg = EdgeConfig {
            edge_id: "edge-rt".into(),
            devices: vec![DeviceConfig {
                device_id: "depth-1".into(),
                device_type: "depth_sensor".into(),
                device_name: "sounder".into(),
                control: serde_json::json!({"base_depth_m": 12.5}),
            }],
            ..EdgeConfig::default()
        };

        let encoded = serde_json::to_string(&cfg).unwrap();
        let decoded: EdgeConfig = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.devices[0].device_type, "depth_sensor");
        assert_eq!(decoded.devices[0].control["base_depth_m"], 12.5);
    }
}
