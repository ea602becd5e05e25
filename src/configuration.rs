use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{Error, Experiment, ExperimentKey, Result, ValidationError};

/// Version token of a configuration that has never been loaded.
pub const EMPTY_VERSION: &str = "0";

/// Immutable snapshot of every experiment definition.
///
/// A snapshot is never modified; [`ConfigurationStore`](crate::ConfigurationStore) replaces it
/// wholesale. Readers that hold on to an `Arc<Configuration>` keep a consistent view for the whole
/// operation, even if a reload happens in between.
#[derive(Debug)]
pub struct Configuration {
    experiments: HashMap<ExperimentKey, Arc<Experiment>>,
    version: String,
    /// When this snapshot was built.
    pub loaded_at: DateTime<Utc>,
}

impl Configuration {
    /// Configuration with no experiments. Every lookup against it falls back to control.
    pub fn empty() -> Configuration {
        Configuration {
            experiments: HashMap::new(),
            version: EMPTY_VERSION.to_owned(),
            loaded_at: Utc::now(),
        }
    }

    /// Build a snapshot from already validated experiments.
    ///
    /// Fails if two experiments share a key.
    pub fn from_experiments(
        experiments: impl IntoIterator<Item = Experiment>,
        version: impl Into<String>,
    ) -> Result<Configuration> {
        let mut by_key = HashMap::new();
        for experiment in experiments {
            let key = experiment.key().clone();
            if by_key.insert(key.clone(), Arc::new(experiment)).is_some() {
                return Err(ValidationError::DuplicateExperimentKey(key.to_string()).into());
            }
        }

        Ok(Configuration {
            experiments: by_key,
            version: version.into(),
            loaded_at: Utc::now(),
        })
    }

    /// Parse a configuration document: a JSON array of experiments.
    ///
    /// Every record is validated; a single malformed record fails the whole document.
    pub fn from_json(json: &[u8], version: impl Into<String>) -> Result<Configuration> {
        let experiments: Vec<Experiment> = serde_json::from_slice(json)
            .map_err(|err| Error::ConfigurationParse(Arc::new(err)))?;
        Configuration::from_experiments(experiments, version)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn get(&self, key: &str) -> Option<&Arc<Experiment>> {
        self.experiments.get(key)
    }

    pub fn experiments(&self) -> impl Iterator<Item = &Arc<Experiment>> {
        self.experiments.values()
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }
}

impl Default for Configuration {
    fn default() -> Configuration {
        Configuration::empty()
    }
}
