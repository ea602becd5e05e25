use crate::{events::NoopEventSink, sharder::Sha256Sharder, Client, EventSink, Sharder};

/// Configuration for [`Client`].
pub struct ClientConfig<'a> {
    pub(crate) event_sink: Box<dyn EventSink + Send + Sync + 'a>,
    pub(crate) sharder: Box<dyn Sharder + Send + Sync>,
}

impl<'a> ClientConfig<'a> {
    /// Create a default configuration: SHA-256 bucketing and events written to the debug log only.
    ///
    /// ```
    /// # use abassign::ClientConfig;
    /// ClientConfig::new();
    /// ```
    pub fn new() -> Self {
        ClientConfig {
            event_sink: Box::new(NoopEventSink),
            sharder: Box::new(Sha256Sharder),
        }
    }

    /// Set the sink receiving exposure and goal events.
    ///
    /// ```
    /// # use abassign::ClientConfig;
    /// let config = ClientConfig::new().event_sink(|event| {
    ///   println!("{:?}", event);
    /// });
    /// ```
    pub fn event_sink(mut self, event_sink: impl EventSink + Send + Sync + 'a) -> Self {
        self.event_sink = Box::new(event_sink);
        self
    }

    /// Override the bucketing hash. All instances serving the same experiments must agree on it.
    ///
    /// ```
    /// # use abassign::{ClientConfig, Md5Sharder};
    /// let config = ClientConfig::new().sharder(Md5Sharder);
    /// ```
    pub fn sharder(mut self, sharder: impl Sharder + Send + Sync + 'static) -> Self {
        self.sharder = Box::new(sharder);
        self
    }

    /// Create a new [`Client`] using the specified configuration.
    ///
    /// ```
    /// # use abassign::{ClientConfig, Client};
    /// let client: Client = ClientConfig::new().to_client();
    /// ```
    pub fn to_client(self) -> Client<'a> {
        Client::new(self)
    }
}

impl<'a> Default for ClientConfig<'a> {
    fn default() -> Self {
        ClientConfig::new()
    }
}
