//! Device and edge status snapshot types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Device connection state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceConnState {
    #[default]
    Unknown,
    Online,
    Offline,
}

/// Device work state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceWorkState {
    #[default]
    Idle,
    Busy,
    Faulted,
}

/// Edge run state as observed from the outside
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeRunState {
    #[default]
    Initializing,
    Running,
    EStop,
    Degraded,
}

impl DeviceWorkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceWorkState::Idle => "Idle",
            DeviceWorkState::Busy => "Busy",
            DeviceWorkState::Faulted => "Faulted",
        }
    }
}

impl EdgeRunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeRunState::Initializing => "Initializing",
            EdgeRunState::Running => "Running",
            EdgeRunState::EStop => "EStop",
            EdgeRunState::Degraded => "Degraded",
        }
    }
}

impl std::fmt::Display for EdgeRunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status snapshot of one device
///
/// Owned by its device and mutated only on task-start and task-finish
/// boundaries; `queue_depth` is populated by the edge when aggregating.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub device_id: String,
    #[serde(default)]
    pub conn_state: DeviceConnState,
    #[serde(default)]
    pub work_state: DeviceWorkState,

    #[serde(default)]
    pub running_task_id: String,
    #[serde(default)]
    pub last_task_at_ms: i64,
    #[serde(default)]
    pub last_seen_at_ms: i64,
    #[serde(default)]
    pub last_error: String,

    #[serde(default)]
    pub queue_depth: i64,
}

/// Status snapshot of one edge, computed on demand from live device state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeStatus {
    pub edge_id: String,
    #[serde(default)]
    pub run_state: EdgeRunState,

    #[serde(default)]
    pub boot_at_ms: i64,
    #[serde(default)]
    pub last_heartbeat_at_ms: i64,

    #[serde(default)]
    pub estop_active: bool,
    #[serde(default)]
    pub estop_reason: String,

    #[serde(default)]
    pub devices: HashMap<String, DeviceStatus>,

    #[serde(default)]
    pub tasks_pending_total: i64,
    #[serde(default)]
    pub tasks_running_total: i64,

    #[serde(default)]
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_status_roundtrip() {
        let status = DeviceStatus {
            device_id: "uuv-1".into(),
            conn_state: DeviceConnState::Online,
            work_state: DeviceWorkState::Busy,
            running_task_id: "task-7".into(),
            last_task_at_ms: 123,
            last_seen_at_ms: 456,
            last_error: "".into(),
            queue_depth: 3,
        };

        let encoded = serde_json::to_string(&status).unwrap();
        let decoded: DeviceStatus = serde_json::from_str(&encoded).unwrap();
        assert_eq!(status, decoded);
    }

    #[test]
    fn test_edge_status_roundtrip() {
        let mut devices = HashMap::new();
        devices.insert(
            "uuv-1".to_string(),
            DeviceStatus {
                device_id: "uuv-1".into(),
                work_state: DeviceWorkState::Faulted,
                last_error: "driver fault".into(),
                ..DeviceStatus::default()
            },
        );

        let status = EdgeStatus {
            edge_id: "edge-1".into(),
            run_state: EdgeRunState::EStop,
            boot_at_ms: 1000,
            estop_active: true,
            estop_reason: "operator stop".into(),
            devices,
            tasks_pending_total: 4,
            tasks_running_total: 1,
            version: "0.1.0".into(),
            ..EdgeStatus::default()
        };

        let encoded = serde_json::to_string(&status).unwrap();
        let decoded: EdgeStatus = serde_json::from_str(&encoded).unwrap();
        assert_eq!(status, decoded);
    }

    #[test]
    fn test_default_states() {
        assert_eq!(DeviceConnState::default(), DeviceConnState::Unknown);
        assert_eq!(DeviceWorkState::default(), DeviceWorkState::Idle);
        assert_eq!(EdgeRunState::default(), EdgeRunState::Initializing);
    }
}
