use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    configuration_source::ConfigurationSource,
    configuration_store::ConfigurationStore,
    poller_thread::{PollerThread, PollerThreadConfig},
    AssignmentDecision, ClientConfig, Context, ExperimentKey, Subject,
};

/// Assigns subjects to experiment treatments and records exposures and goals.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// # Examples
/// ```
/// # use abassign::{Client, ClientConfig};
/// Client::new(ClientConfig::new());
/// ```
pub struct Client<'a> {
    configuration_store: Arc<ConfigurationStore>,
    config: ClientConfig<'a>,
}

impl<'a> Client<'a> {
    /// Create a new `Client` with an empty configuration store.
    ///
    /// ```
    /// # use abassign::{ClientConfig, Client};
    /// let client = Client::new(ClientConfig::new());
    /// ```
    pub fn new(config: ClientConfig<'a>) -> Self {
        Client::new_with_configuration_store(config, Arc::new(ConfigurationStore::new()))
    }

    /// Create a new `Client` reading experiments from an existing store.
    pub fn new_with_configuration_store(
        config: ClientConfig<'a>,
        configuration_store: Arc<ConfigurationStore>,
    ) -> Self {
        Client {
            configuration_store,
            config,
        }
    }

    pub fn configuration_store(&self) -> &Arc<ConfigurationStore> {
        &self.configuration_store
    }

    /// Decide the treatment of `subject` in experiment `key` against the current configuration.
    ///
    /// Assignment never fails: an unknown experiment, a subject outside targeting or a malformed
    /// experiment all yield the control treatment with a decision explaining why.
    pub fn assign(
        &self,
        key: &ExperimentKey,
        subject: &Subject,
        context: &Context,
    ) -> AssignmentDecision {
        let configuration = self.configuration_store.current();
        let decision = configuration.assign(
            key,
            subject,
            context,
            &*self.config.sharder,
            Utc::now(),
        );

        log::trace!(target: "abassign",
                    experiment = key,
                    treatment = decision.treatment.as_str(),
                    decision:serde = decision.decision,
                    version = decision.config_version.as_str();
                    "assigned treatment");

        decision
    }

    /// Record that `subject_key` was exposed to `treatment` of experiment `key`.
    pub fn log_exposure(
        &self,
        key: &ExperimentKey,
        treatment: &str,
        subject_key: &str,
        ts: DateTime<Utc>,
        context: &Context,
    ) {
        self.config
            .event_sink
            .append_exposure(key.as_str(), treatment, subject_key, ts, context);
    }

    /// Record that `subject_key` reached `goal` in experiment `key`.
    #[allow(clippy::too_many_arguments)]
    pub fn log_goal(
        &self,
        key: &ExperimentKey,
        treatment: &str,
        subject_key: &str,
        goal: &str,
        value: Option<f64>,
        ts: DateTime<Utc>,
        context: &Context,
    ) {
        self.config.event_sink.append_goal(
            key.as_str(),
            treatment,
            subject_key,
            goal,
            value,
            ts,
            context,
        );
    }

    /// Assign `subject` and record the exposure to the resulting treatment.
    ///
    /// The exposure is recorded for every decision, including control fallbacks.
    pub fn assign_and_log(
        &self,
        key: &ExperimentKey,
        subject: &Subject,
        context: &Context,
    ) -> AssignmentDecision {
        let decision = self.assign(key, subject, context);
        self.log_exposure(
            key,
            &decision.treatment,
            &subject.stable_key(),
            Utc::now(),
            context,
        );
        decision
    }

    /// Start a poller thread reloading the configuration from `source` into this client's store.
    ///
    /// # Errors
    ///
    /// - IO Error if poller thread failed to start.
    pub fn start_poller_thread(
        &self,
        source: impl ConfigurationSource + Send + 'static,
        config: PollerThreadConfig,
    ) -> std::io::Result<PollerThread> {
        PollerThread::start_with_config(source, Arc::clone(&self.configuration_store), config)
    }
}
