//! A background poller thread that periodically checks the configuration source for changes and
//! swaps new snapshots into the configuration store.
use std::{
    sync::{mpsc::RecvTimeoutError, Arc, Condvar, Mutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};

use crate::{
    configuration_source::ConfigurationSource, configuration_store::ConfigurationStore, Error,
    Result,
};

/// Configuration for [`PollerThread`].
#[derive(Debug, Clone)]
pub struct PollerThreadConfig {
    /// Interval to wait between checks of the source's change marker.
    ///
    /// Defaults to [`PollerThreadConfig::DEFAULT_POLL_INTERVAL`].
    pub interval: Duration,
}

impl PollerThreadConfig {
    /// Default value for [`PollerThreadConfig::interval`].
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

    /// Create a new `PollerThreadConfig` using default configuration.
    pub fn new() -> PollerThreadConfig {
        PollerThreadConfig::default()
    }

    /// Update poll interval with `interval`.
    pub fn with_interval(mut self, interval: Duration) -> PollerThreadConfig {
        self.interval = interval;
        self
    }
}

impl Default for PollerThreadConfig {
    fn default() -> PollerThreadConfig {
        PollerThreadConfig {
            interval: PollerThreadConfig::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Tracks the last loaded change marker and reloads only when it moves.
pub(crate) struct Reloader<S> {
    source: S,
    last_marker: Option<DateTime<Utc>>,
}

impl<S: ConfigurationSource> Reloader<S> {
    pub(crate) fn new(source: S) -> Reloader<S> {
        Reloader {
            source,
            last_marker: None,
        }
    }

    /// Check the source and reload if it changed. Returns `Ok(true)` if a new snapshot was stored.
    ///
    /// On failure the store keeps its current snapshot and the marker is not advanced, so the next
    /// call retries.
    pub(crate) fn poll(&mut self, store: &ConfigurationStore) -> Result<bool> {
        // Marker is read before content: a write racing the read moves the marker again and gets
        // picked up on the next poll.
        let marker = self.source.change_marker()?;
        if self.last_marker == Some(marker) {
            log::debug!(target: "abassign", "configuration unchanged");
            return Ok(false);
        }

        let configuration = self.source.load(marker)?;
        log::info!(target: "abassign",
                   version = configuration.version(),
                   experiments = configuration.len();
                   "configuration reloaded");
        store.set_configuration(Arc::new(configuration));
        self.last_marker = Some(marker);
        Ok(true)
    }
}

/// A configuration poller thread.
///
/// The poller thread is the only writer of the store's snapshot. It performs a load immediately
/// on start and then checks the source every [`PollerThreadConfig::interval`]. Reload failures
/// (I/O, parse or validation errors) are logged and the last good snapshot stays in force.
pub struct PollerThread {
    join_handle: std::thread::JoinHandle<()>,

    /// Used to send a stop command to the poller thread.
    stop_sender: std::sync::mpsc::SyncSender<()>,

    /// Holds `None` until the first load attempt finishes, then its outcome.
    result: Arc<(Mutex<Option<Result<()>>>, Condvar)>,
}

impl PollerThread {
    /// Starts the configuration poller thread with default configuration.
    ///
    /// # Errors
    ///
    /// - IO Error if poller thread failed to start.
    pub fn start(
        source: impl ConfigurationSource + Send + 'static,
        store: Arc<ConfigurationStore>,
    ) -> std::io::Result<PollerThread> {
        PollerThread::start_with_config(source, store, PollerThreadConfig::default())
    }

    /// Starts the configuration poller thread with the provided configuration.
    ///
    /// # Errors
    ///
    /// - IO Error if poller thread failed to start.
    pub fn start_with_config(
        source: impl ConfigurationSource + Send + 'static,
        store: Arc<ConfigurationStore>,
        config: PollerThreadConfig,
    ) -> std::io::Result<PollerThread> {
        // Buffer size of 1 is enough: a second stop command can be dropped with `try_send()`.
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);

        let result: Arc<(Mutex<Option<Result<()>>>, Condvar)> =
            Arc::new((Mutex::new(None), Condvar::new()));

        let join_handle = {
            let result = Arc::clone(&result);
            let update_result = move |value: Result<()>| {
                let mut slot = result.0.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.is_none() {
                    *slot = Some(value);
                    result.1.notify_all();
                }
            };

            std::thread::Builder::new()
                .name("abassign-config-poller".to_owned())
                .spawn(move || {
                    let mut reloader = Reloader::new(source);
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| loop {
                        match reloader.poll(&store) {
                            Ok(_) => update_result(Ok(())),
                            Err(err) => {
                                log::warn!(target: "abassign", "configuration reload failed: {err}");
                                update_result(Err(err));
                            }
                        }

                        match stop_receiver.recv_timeout(config.interval) {
                            Err(RecvTimeoutError::Timeout) => {
                                // Timed out. Loop back to check the source.
                            }
                            Ok(()) => {
                                log::debug!(target: "abassign", "poller thread received stop command");
                                return;
                            }
                            Err(RecvTimeoutError::Disconnected) => {
                                log::debug!(target: "abassign", "poller thread received disconnected");
                                return;
                            }
                        }
                    }));

                    if outcome.is_err() {
                        update_result(Err(Error::PollerThreadPanicked));
                    }
                })?
        };

        Ok(PollerThread {
            join_handle,
            stop_sender,
            result,
        })
    }

    /// Block until the first load attempt finishes and return its outcome.
    ///
    /// An error here does not stop the poller: it keeps checking the source and the store serves
    /// an empty configuration until a load succeeds.
    pub fn wait_for_configuration(&self) -> Result<()> {
        let mut lock = self
            .result
            .0
            .lock()
            .map_err(|_| Error::PollerThreadPanicked)?;
        loop {
            match &*lock {
                Some(result) => return result.clone(),
                None => {
                    lock = self
                        .result
                        .1
                        .wait(lock)
                        .map_err(|_| Error::PollerThreadPanicked)?;
                }
            }
        }
    }

    /// Stop the poller thread.
    ///
    /// This function does not wait for the thread to actually stop.
    pub fn stop(&self) {
        // Either the thread already exited or another stop command is queued. Both are fine.
        let _ = self.stop_sender.try_send(());
    }

    /// Stop the poller thread and block waiting for it to exit.
    ///
    /// # Errors
    ///
    /// - [`Error::PollerThreadPanicked`] if the thread has panicked.
    pub fn shutdown(self) -> Result<()> {
        self.stop();

        self.join_handle
            .join()
            .map_err(|_| Error::PollerThreadPanicked)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use chrono::{DateTime, TimeZone, Utc};

    use super::{PollerThread, PollerThreadConfig, Reloader};
    use crate::{
        configuration_source::{ConfigurationSource, FileConfigurationSource},
        configuration_store::ConfigurationStore,
        Error, ExperimentKey, Result,
    };

    const ONE_EXPERIMENT: &str = r#"[{
        "key": "exp1",
        "status": "running",
        "salt": "s1",
        "traffic": 1.0,
        "variants": [{"name": "A", "weight": 1.0}],
        "start": "2024-01-01T00:00:00Z",
        "end": "2099-01-01T00:00:00Z"
    }]"#;

    const TWO_EXPERIMENTS: &str = r#"[{
        "key": "exp1",
        "status": "running",
        "salt": "s1",
        "traffic": 1.0,
        "variants": [{"name": "B", "weight": 1.0}],
        "start": "2024-01-01T00:00:00Z",
        "end": "2099-01-01T00:00:00Z"
    }, {
        "key": "exp2",
        "status": "draft",
        "salt": "s2",
        "traffic": 0.1,
        "variants": [{"name": "A", "weight": 0.5}, {"name": "B", "weight": 0.5}],
        "start": "2024-01-01T00:00:00Z",
        "end": "2099-01-01T00:00:00Z"
    }]"#;

    /// In-memory source with a manually advanced marker.
    #[derive(Clone)]
    struct MemorySource(Arc<Mutex<(i64, String)>>);

    impl MemorySource {
        fn new(marker: i64, content: &str) -> MemorySource {
            MemorySource(Arc::new(Mutex::new((marker, content.to_owned()))))
        }

        fn update(&self, marker: i64, content: &str) {
            *self.0.lock().unwrap() = (marker, content.to_owned());
        }
    }

    impl ConfigurationSource for MemorySource {
        fn change_marker(&self) -> Result<DateTime<Utc>> {
            Ok(Utc.timestamp_millis_opt(self.0.lock().unwrap().0).unwrap())
        }

        fn read(&self) -> Result<Vec<u8>> {
            Ok(self.0.lock().unwrap().1.as_bytes().to_vec())
        }
    }

    fn key(key: &str) -> ExperimentKey {
        ExperimentKey::new(key).unwrap()
    }

    #[test]
    fn reloads_only_when_marker_changes() {
        let source = MemorySource::new(1_000, ONE_EXPERIMENT);
        let store = ConfigurationStore::new();
        let mut reloader = Reloader::new(source.clone());

        assert!(reloader.poll(&store).unwrap());
        assert_eq!(store.version(), "1000");
        let first = store.current();

        // Same marker, different content: not picked up.
        source.update(1_000, TWO_EXPERIMENTS);
        assert!(!reloader.poll(&store).unwrap());
        assert!(Arc::ptr_eq(&first, &store.current()));

        source.update(2_000, TWO_EXPERIMENTS);
        assert!(reloader.poll(&store).unwrap());
        assert_eq!(store.version(), "2000");
        assert_eq!(store.all().len(), 2);
        assert_eq!(store.find(&key("exp1")).unwrap().variants()[0].name(), "B");
    }

    #[test]
    fn invalid_reload_keeps_previous_snapshot() {
        let source = MemorySource::new(1_000, ONE_EXPERIMENT);
        let store = ConfigurationStore::new();
        let mut reloader = Reloader::new(source.clone());
        reloader.poll(&store).unwrap();

        let invalid = ONE_EXPERIMENT.replace("\"weight\": 1.0", "\"weight\": 0.5");
        source.update(2_000, &invalid);
        assert!(matches!(
            reloader.poll(&store),
            Err(Error::ConfigurationParse(_))
        ));
        assert_eq!(store.version(), "1000");
        assert_eq!(store.find(&key("exp1")).unwrap().variants()[0].name(), "A");

        source.update(2_000, "not json");
        assert!(reloader.poll(&store).is_err());
        assert_eq!(store.version(), "1000");

        // Failed marker is retried once the content is fixed.
        source.update(2_000, TWO_EXPERIMENTS);
        assert!(reloader.poll(&store).unwrap());
        assert_eq!(store.version(), "2000");
    }

    #[test]
    fn poller_thread_picks_up_file_changes() {
        let _ = env_logger::builder().is_test(true).try_init();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiments.json");
        std::fs::write(&path, ONE_EXPERIMENT).unwrap();

        let store = Arc::new(ConfigurationStore::new());
        let poller = PollerThread::start_with_config(
            FileConfigurationSource::new(&path),
            store.clone(),
            PollerThreadConfig::new().with_interval(Duration::from_millis(20)),
        )
        .unwrap();

        poller.wait_for_configuration().unwrap();
        assert!(store.find(&key("exp1")).is_some());
        assert!(store.find(&key("exp2")).is_none());
        let first_version = store.version();

        // Make sure the modification time moves even on filesystems with coarse timestamps.
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        std::fs::write(&path, TWO_EXPERIMENTS).unwrap();
        file.set_modified(std::time::SystemTime::now() + Duration::from_secs(10))
            .unwrap();
        drop(file);

        let mut reloaded = false;
        for _ in 0..250 {
            if store.find(&key("exp2")).is_some() {
                reloaded = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(reloaded, "poller did not reload the configuration");
        assert!(store.version() > first_version);

        poller.shutdown().unwrap();
    }

    #[test]
    fn poller_reports_initial_failure_and_keeps_store_empty() {
        let store = Arc::new(ConfigurationStore::new());
        let poller = PollerThread::start_with_config(
            FileConfigurationSource::new("tests/data/missing.json"),
            store.clone(),
            PollerThreadConfig::new().with_interval(Duration::from_millis(10)),
        )
        .unwrap();

        assert!(matches!(poller.wait_for_configuration(), Err(Error::Io(_))));
        assert!(store.all().is_empty());
        poller.shutdown().unwrap();
    }

    #[test]
    fn poller_recovers_after_initial_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiments.json");

        let store = Arc::new(ConfigurationStore::new());
        let poller = PollerThread::start_with_config(
            FileConfigurationSource::new(&path),
            store.clone(),
            PollerThreadConfig::new().with_interval(Duration::from_millis(10)),
        )
        .unwrap();

        assert!(poller.wait_for_configuration().is_err());
        assert_eq!(store.version(), "0");

        std::fs::write(&path, ONE_EXPERIMENT).unwrap();

        let mut loaded = false;
        for _ in 0..250 {
            if store.find(&key("exp1")).is_some() {
                loaded = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(loaded, "poller did not load the configuration after it appeared");
        // The first outcome is kept.
        assert!(poller.wait_for_configuration().is_err());

        poller.shutdown().unwrap();
    }
}
