//! Process-level settings read from the environment.
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::{poller_thread::PollerThreadConfig, wal::WalConfig, Error, Result};

pub const CONFIG_PATH: &str = "ABASSIGN_CONFIG_PATH";
pub const POLL_INTERVAL_MS: &str = "ABASSIGN_POLL_INTERVAL_MS";
pub const WAL_DIR: &str = "ABASSIGN_WAL_DIR";
pub const WAL_MAX_SEGMENT_BYTES: &str = "ABASSIGN_WAL_MAX_SEGMENT_BYTES";
pub const WAL_FSYNC: &str = "ABASSIGN_WAL_FSYNC";
pub const PORT: &str = "ABASSIGN_PORT";

/// Recognized settings with their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Location of the experiments document.
    pub config_path: PathBuf,
    /// Polling period of the configuration source. `None` loads the configuration once.
    pub poll_interval: Option<Duration>,
    pub wal_dir: PathBuf,
    pub max_segment_bytes: u64,
    pub sync_on_write: bool,
    /// Listening port for the transport layer. Not used by this crate.
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            config_path: PathBuf::from("config.json"),
            poll_interval: Some(PollerThreadConfig::DEFAULT_POLL_INTERVAL),
            wal_dir: PathBuf::from("wal"),
            max_segment_bytes: WalConfig::DEFAULT_MAX_SEGMENT_BYTES,
            sync_on_write: false,
            port: 8080,
        }
    }
}

impl Settings {
    /// Read settings from environment variables, falling back to defaults for unset ones.
    pub fn from_env() -> Result<Settings> {
        Settings::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Settings> {
        let mut settings = Settings::default();

        if let Some(path) = lookup(CONFIG_PATH) {
            settings.config_path = PathBuf::from(path);
        }
        if let Some(ms) = parse(&lookup, POLL_INTERVAL_MS)? {
            settings.poll_interval = match ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            };
        }
        if let Some(dir) = lookup(WAL_DIR) {
            settings.wal_dir = PathBuf::from(dir);
        }
        if let Some(bytes) = parse(&lookup, WAL_MAX_SEGMENT_BYTES)? {
            if bytes == 0 {
                return Err(Error::InvalidSetting {
                    name: WAL_MAX_SEGMENT_BYTES,
                    value: "0".to_owned(),
                });
            }
            settings.max_segment_bytes = bytes;
        }
        if let Some(value) = lookup(WAL_FSYNC) {
            settings.sync_on_write = parse_bool(&value).ok_or(Error::InvalidSetting {
                name: WAL_FSYNC,
                value,
            })?;
        }
        if let Some(port) = parse(&lookup, PORT)? {
            settings.port = port;
        }

        Ok(settings)
    }

    pub fn wal_config(&self) -> WalConfig {
        WalConfig::new(&self.wal_dir)
            .with_max_segment_bytes(self.max_segment_bytes)
            .with_sync_on_write(self.sync_on_write)
    }

    /// Poller configuration, or `None` in load-once mode.
    pub fn poller_config(&self) -> Option<PollerThreadConfig> {
        self.poll_interval
            .map(|interval| PollerThreadConfig::new().with_interval(interval))
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>> {
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| Error::InvalidSetting { name, value })
        })
        .transpose()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
