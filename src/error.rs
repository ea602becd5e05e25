use std::sync::Arc;

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by configuration loading, settings parsing and the poller thread.
///
/// None of these ever reach the assignment path: evaluation always produces a decision, and event
/// logging swallows its own failures.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A domain value failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Configuration document is not valid JSON or does not match the expected shape. Validation
    /// failures of individual records are reported through this variant too, as they are raised
    /// while deserializing.
    #[error("error parsing configuration: {0}")]
    ConfigurationParse(Arc<serde_json::Error>),

    /// A value could not be serialized to JSON.
    #[error("serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),

    /// A setting has a value that cannot be parsed.
    #[error("invalid value {value:?} for setting {name}")]
    InvalidSetting {
        /// Name of the setting (environment variable).
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Indicates that the poller thread panicked. This should normally never happen.
    #[error("poller thread panicked")]
    PollerThreadPanicked,
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

/// Violation of a domain invariant, raised when constructing a value.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("experiment key cannot be blank")]
    BlankExperimentKey,
    #[error("unknown experiment status {0:?}")]
    UnknownStatus(String),
    #[error("experiment salt cannot be blank")]
    BlankSalt,
    #[error("traffic must be within [0, 1], got {0}")]
    TrafficOutOfRange(f64),
    #[error("holdout must be within [0, 1), got {0}")]
    HoldoutOutOfRange(f64),
    #[error("experiment must have at least one variant")]
    NoVariants,
    #[error("variant name cannot be blank")]
    BlankVariantName,
    #[error("variant weight must be within (0, 1], got {0}")]
    WeightOutOfRange(f64),
    #[error("variant weights must sum to 1.0, got {0}")]
    WeightsDoNotSumToOne(f64),
    #[error("experiment start must not be after its end")]
    StartAfterEnd,
    #[error("duplicate experiment key {0:?}")]
    DuplicateExperimentKey(String),
    #[error("{0} cannot be blank")]
    BlankIdentifier(&'static str),
    #[error("subject requires at least one of user id, device id or request id")]
    MissingIdentifier,
}
