//! Where experiment definitions come from.
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::{Configuration, Result};

/// A source of configuration documents.
///
/// The change marker must be retrievable without reading the content, so that pollers can skip
/// unchanged sources cheaply.
pub trait ConfigurationSource {
    /// Marker that changes whenever the content changes (e.g., last modification time).
    fn change_marker(&self) -> Result<DateTime<Utc>>;

    /// Read the full document.
    fn read(&self) -> Result<Vec<u8>>;

    /// Load a validated configuration, versioned by `marker`.
    fn load(&self, marker: DateTime<Utc>) -> Result<Configuration> {
        let bytes = self.read()?;
        Configuration::from_json(&bytes, version_from_marker(marker))
    }
}

/// Version token for a change marker: milliseconds since the Unix epoch.
pub fn version_from_marker(marker: DateTime<Utc>) -> String {
    marker.timestamp_millis().to_string()
}

/// A JSON file on the local filesystem, versioned by its modification time.
#[derive(Debug, Clone)]
pub struct FileConfigurationSource {
    path: PathBuf,
}

impl FileConfigurationSource {
    pub fn new(path: impl Into<PathBuf>) -> FileConfigurationSource {
        FileConfigurationSource { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigurationSource for FileConfigurationSource {
    fn change_marker(&self) -> Result<DateTime<Utc>> {
        let modified = std::fs::metadata(&self.path)?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }

    fn read(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }
}
