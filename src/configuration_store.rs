//! A thread-safe in-memory storage for the currently active configuration. [`ConfigurationStore`]
//! provides concurrent access for readers (assignment) and a writer (the poller thread).
use std::sync::{Arc, PoisonError, RwLock};

use crate::{
    configuration_source::ConfigurationSource, Configuration, Experiment, ExperimentKey,
};

/// `ConfigurationStore` holds exactly one current [`Configuration`] snapshot.
///
/// `Configuration` itself is always immutable and can only be replaced completely, together with
/// its version token. The lock is held only to clone or swap the `Arc`, never while parsing.
pub struct ConfigurationStore {
    configuration: RwLock<Arc<Configuration>>,
}

impl ConfigurationStore {
    /// Create a store holding an empty configuration.
    pub fn new() -> Self {
        ConfigurationStore::with_configuration(Configuration::empty())
    }

    pub fn with_configuration(configuration: Configuration) -> Self {
        ConfigurationStore {
            configuration: RwLock::new(Arc::new(configuration)),
        }
    }

    /// Load configuration once from `source`, keeping it for the lifetime of the store.
    ///
    /// A failed load is logged and leaves the store empty rather than failing startup.
    pub fn load_once(source: &impl ConfigurationSource) -> Self {
        let loaded = source
            .change_marker()
            .and_then(|marker| source.load(marker));
        match loaded {
            Ok(configuration) => {
                log::info!(target: "abassign",
                           version = configuration.version(),
                           experiments = configuration.len();
                           "loaded configuration");
                ConfigurationStore::with_configuration(configuration)
            }
            Err(err) => {
                log::warn!(target: "abassign", "initial configuration load failed: {err}");
                ConfigurationStore::new()
            }
        }
    }

    /// Get the current snapshot. Use the same snapshot for the whole operation.
    pub fn current(&self) -> Arc<Configuration> {
        // A poisoned lock still holds a complete snapshot: the writer only swaps an Arc.
        let configuration = self
            .configuration
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&configuration)
    }

    pub fn find(&self, key: &ExperimentKey) -> Option<Arc<Experiment>> {
        self.current().get(key.as_str()).cloned()
    }

    pub fn version(&self) -> String {
        self.current().version().to_owned()
    }

    /// All experiments of the current snapshot, in no particular order.
    pub fn all(&self) -> Vec<Arc<Experiment>> {
        self.current().experiments().cloned().collect()
    }

    /// Replace the current configuration, returning the previous one.
    pub fn set_configuration(&self, configuration: Arc<Configuration>) -> Arc<Configuration> {
        let mut configuration_slot = self
            .configuration
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut configuration_slot, configuration)
    }
}

impl Default for ConfigurationStore {
    fn default() -> Self {
        ConfigurationStore::new()
    }
}
