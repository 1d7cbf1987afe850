//! Nereid edge runtime: command dispatch for heterogeneous controllable
//! devices (submersibles, sensors).
//!
//! Raw external commands are normalized into typed tasks, routed to a
//! per-device queue, executed by a per-device worker, and device status is
//! aggregated into an edge-wide snapshot. Submission, E-Stop and shutdown
//! are safely serialized against in-flight execution.

pub mod config;
pub mod control;
pub mod device;
pub mod devices;
pub mod edge;
pub mod fleet;
pub mod queue;
pub mod registry;
pub mod snapshot;
pub mod worker;

pub use config::{DeviceConfig, EdgeConfig, PersistenceConfig};
pub use control::{Executor, Normalizer};
pub use device::Device;
pub use edge::{Edge, RunState};
pub use fleet::Fleet;
pub use queue::TaskQueue;
pub use registry::Registry;
pub use snapshot::{JsonlStatusStore, MemoryStatusStore, StatusStore};
pub use worker::{Worker, WorkerHooks};
