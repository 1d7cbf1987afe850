//! Device-type registry: maps type tags to normalizer and executor factories.
//!
//! An explicit registry instance is handed to each edge at construction time;
//! there is no process-wide factory state, so tests and multi-edge setups
//! stay isolated.

use std::collections::HashMap;
use std::sync::Arc;

use crate::control::{Executor, Normalizer};
use crate::devices;

type NormalizerFactory = Box<dyn Fn() -> Arc<dyn Normalizer> + Send + Sync>;
type ExecutorFactory = Box<dyn Fn() -> Box<dyn Executor> + Send + Sync>;

/// Factory table keyed by device type tag (case-insensitive).
pub struct Registry {
    normalizers: HashMap<String, NormalizerFactory>,
    executors: HashMap<String, ExecutorFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            normalizers: HashMap::new(),
            executors: HashMap::new(),
        }
    }

    /// Registry pre-loaded with the built-in device types.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            "uuv",
            || Arc::new(devices::uuv::UuvNormalizer),
            || Box::new(devices::uuv::UuvExecutor::default()),
        );
        registry.register(
            "wind_sensor",
            || Arc::new(devices::wind::WindSensorNormalizer),
            || Box::new(devices::wind::WindSensorExecutor::default()),
        );
        registry.register(
            "depth_sensor",
            || Arc::new(devices::depth::DepthSensorNormalizer),
            || Box::new(devices::depth::DepthSensorExecutor::default()),
        );
        registry
    }

    /// Register (or replace) the factories for a device type.
    pub fn register<N, E>(&mut self, device_type: &str, normalizer: N, executor: E)
    where
        N: Fn() -> Arc<dyn Normalizer> + Send + Sync + 'static,
        E: Fn() -> Box<dyn Executor> + Send + Sync + 'static,
    {
        let key = device_type.to_ascii_lowercase();
        self.normalizers.insert(key.clone(), Box::new(normalizer));
        self.executors.insert(key, Box::new(executor));
    }

    pub fn has_type(&self, device_type: &str) -> bool {
        self.executors
            .contains_key(&device_type.to_ascii_lowercase())
    }

    pub fn create_normalizer(&self, device_type: &str) -> Option<Arc<dyn Normalizer>> {
        self.normalizers
            .get(&device_type.to_ascii_lowercase())
            .map(|factory| factory())
    }

    pub fn create_executor(&self, device_type: &str) -> Option<Box<dyn Executor>> {
        self.executors
            .get(&device_type.to_ascii_lowercase())
            .map(|factory| factory())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
