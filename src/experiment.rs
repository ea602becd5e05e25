//! Experiment definitions.
//!
//! Every type here is immutable and validated on construction. Deserialization goes through the
//! same constructors (via `*Wire` structs), so a configuration document can never produce a value
//! that violates an invariant.
use std::{borrow::Borrow, collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{sharder::TOTAL_BUCKETS, ValidationError};

/// Maximum allowed distance between the sum of variant weights and `1.0`.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Opaque, non-blank experiment identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExperimentKey(Arc<str>);

impl ExperimentKey {
    pub fn new(value: impl Into<String>) -> Result<ExperimentKey, ValidationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValidationError::BlankExperimentKey);
        }
        Ok(ExperimentKey(value.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ExperimentKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ExperimentKey::new(value)
    }
}

impl From<ExperimentKey> for String {
    fn from(value: ExperimentKey) -> String {
        value.0.as_ref().to_owned()
    }
}

impl AsRef<str> for ExperimentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ExperimentKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl log::kv::ToValue for ExperimentKey {
    fn to_value(&self) -> log::kv::Value {
        log::kv::Value::from_display(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(try_from = "String", rename_all = "lowercase")]
pub enum Status {
    #[display(fmt = "running")]
    Running,
    #[display(fmt = "paused")]
    Paused,
    #[display(fmt = "draft")]
    Draft,
}

impl TryFrom<String> for Status {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "running" => Ok(Status::Running),
            "paused" => Ok(Status::Paused),
            "draft" => Ok(Status::Draft),
            _ => Err(ValidationError::UnknownStatus(value)),
        }
    }
}

/// One treatment branch with its share of traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VariantWire")]
pub struct Variant {
    name: String,
    weight: f64,
}

#[derive(Deserialize)]
struct VariantWire {
    name: String,
    weight: f64,
}

impl TryFrom<VariantWire> for Variant {
    type Error = ValidationError;

    fn try_from(wire: VariantWire) -> Result<Self, Self::Error> {
        Variant::new(wire.name, wire.weight)
    }
}

impl Variant {
    pub fn new(name: impl Into<String>, weight: f64) -> Result<Variant, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::BlankVariantName);
        }
        // Written so that NaN is rejected too.
        if !(weight > 0.0 && weight <= 1.0) {
            return Err(ValidationError::WeightOutOfRange(weight));
        }
        Ok(Variant { name, weight })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }
}

/// Optional eligibility narrowing. The default value does not restrict anyone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "TargetsWire")]
pub struct Targets {
    /// Allowed countries. Empty means unrestricted.
    pub countries: HashSet<String>,
    pub min_app_version: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetsWire {
    #[serde(default)]
    countries: Option<HashSet<String>>,
    #[serde(default)]
    min_app_version: Option<i64>,
}

impl From<TargetsWire> for Targets {
    fn from(wire: TargetsWire) -> Targets {
        Targets {
            countries: wire.countries.unwrap_or_default(),
            min_app_version: wire.min_app_version,
        }
    }
}

impl Targets {
    pub fn none() -> Targets {
        Targets::default()
    }
}

/// Aggregate root of the configuration.
///
/// `salt` must not change for a running experiment unless a full re-randomization is intended:
/// changing it reshuffles every subject.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ExperimentWire")]
pub struct Experiment {
    key: ExperimentKey,
    status: Status,
    salt: String,
    traffic: f64,
    holdout: f64,
    variants: Box<[Variant]>,
    targets: Targets,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    /// Cumulative `round(weight * 10000)` per variant, in declared order.
    thresholds: Box<[u32]>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExperimentWire {
    key: ExperimentKey,
    status: Status,
    salt: String,
    traffic: f64,
    #[serde(default)]
    holdout: f64,
    variants: Vec<Variant>,
    #[serde(default)]
    targets: Option<Targets>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<ExperimentWire> for Experiment {
    type Error = ValidationError;

    fn try_from(wire: ExperimentWire) -> Result<Self, Self::Error> {
        Experiment::new(
            wire.key,
            wire.status,
            wire.salt,
            wire.traffic,
            wire.holdout,
            wire.variants,
            wire.targets.unwrap_or_default(),
            wire.start,
            wire.end,
        )
    }
}

impl Experiment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: ExperimentKey,
        status: Status,
        salt: impl Into<String>,
        traffic: f64,
        holdout: f64,
        variants: Vec<Variant>,
        targets: Targets,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Experiment, ValidationError> {
        let salt = salt.into();
        if salt.trim().is_empty() {
            return Err(ValidationError::BlankSalt);
        }
        if !(0.0..=1.0).contains(&traffic) {
            return Err(ValidationError::TrafficOutOfRange(traffic));
        }
        if !(0.0..1.0).contains(&holdout) {
            return Err(ValidationError::HoldoutOutOfRange(holdout));
        }
        if variants.is_empty() {
            return Err(ValidationError::NoVariants);
        }
        let sum: f64 = variants.iter().map(Variant::weight).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ValidationError::WeightsDoNotSumToOne(sum));
        }
        if start > end {
            return Err(ValidationError::StartAfterEnd);
        }

        let thresholds = variants
            .iter()
            .scan(0u32, |acc, variant| {
                *acc += (variant.weight * TOTAL_BUCKETS as f64).round() as u32;
                Some(*acc)
            })
            .collect();

        Ok(Experiment {
            key,
            status,
            salt,
            traffic,
            holdout,
            variants: variants.into_boxed_slice(),
            targets,
            start,
            end,
            thresholds,
        })
    }

    pub fn key(&self) -> &ExperimentKey {
        &self.key
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == Status::Running
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Fraction of eligible subjects admitted past the traffic gate.
    pub fn traffic(&self) -> f64 {
        self.traffic
    }

    /// Validated on construction but not consulted during assignment.
    pub fn holdout(&self) -> f64 {
        self.holdout
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub(crate) fn thresholds(&self) -> &[u32] {
        &self.thresholds
    }
}
