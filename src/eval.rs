//! Assignment evaluation.
//!
//! Evaluation is a pure function of a [`Configuration`] snapshot, the subject, the request context
//! and the current time. It never fails: every input produces an [`AssignmentDecision`].
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{
    decision::{AssignmentDecision, Decision, Reason},
    sharder::{Sharder, TOTAL_BUCKETS},
    Configuration, Experiment, ExperimentKey, Subject, Variant,
};

/// Request context: flat string attributes such as `country` and `app_ver`. Unknown keys are
/// ignored.
pub type Context = HashMap<String, String>;

/// Prefix of the key hashed for the traffic gate, so the gate is independent of variant buckets.
const GATE_PREFIX: &str = "gate:";

impl Configuration {
    /// Assign `subject` to a treatment of experiment `key`.
    ///
    /// Rules are applied in order and the first one that matches decides:
    /// 1. missing or not running experiment: [`Decision::Fallback`];
    /// 2. `now` outside `[start, end]`: [`Decision::Ineligible`];
    /// 3. country not targeted: [`Decision::Ineligible`];
    /// 4. app version below the minimum: [`Decision::Ineligible`];
    /// 5. gate bucket above traffic: [`Decision::TrafficGate`];
    /// 6. first variant whose cumulative threshold exceeds the bucket: [`Decision::Assigned`];
    /// 7. otherwise [`Decision::WeightsError`].
    pub fn assign(
        &self,
        key: &ExperimentKey,
        subject: &Subject,
        context: &Context,
        sharder: &dyn Sharder,
        now: DateTime<Utc>,
    ) -> AssignmentDecision {
        let version = self.version();

        let Some(experiment) = self.get(key.as_str()).filter(|e| e.is_running()) else {
            return AssignmentDecision::control(
                key,
                Decision::Fallback,
                Some(Reason::NotRunningOrMissing),
                version,
            );
        };

        if let Some(reason) = experiment.ineligibility(context, now) {
            return AssignmentDecision::control(key, Decision::Ineligible, Some(reason), version);
        }

        // Computed once: anonymous subjects get a new key on every call.
        let stable_key = subject.stable_key();

        let gate_bucket = sharder.bucket(experiment.salt(), &format!("{GATE_PREFIX}{stable_key}"));
        if !experiment.admits(gate_bucket) {
            return AssignmentDecision::control(key, Decision::TrafficGate, None, version);
        }

        let bucket = sharder.bucket(experiment.salt(), &stable_key);
        match experiment.variant_for_bucket(bucket) {
            Some(variant) => AssignmentDecision::assigned(key, variant.name(), version),
            None => {
                log::warn!(target: "abassign",
                           experiment_key = key,
                           bucket;
                           "variant weights do not cover bucket");
                AssignmentDecision::control(key, Decision::WeightsError, None, version)
            }
        }
    }
}

impl Experiment {
    /// Returns the reason `context` is not eligible at `now`, or `None` if it is.
    fn ineligibility(&self, context: &Context, now: DateTime<Utc>) -> Option<Reason> {
        if now < self.start() || now > self.end() {
            return Some(Reason::OutOfWindow);
        }

        let targets = self.targets();
        if !targets.countries.is_empty() {
            let country = context.get("country").map(String::as_str).unwrap_or("");
            if !targets.countries.contains(country) {
                return Some(Reason::CountryTargeting);
            }
        }

        if let Some(min_app_version) = targets.min_app_version {
            let app_version = context
                .get("app_ver")
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0);
            if app_version < min_app_version {
                return Some(Reason::MinAppVersion);
            }
        }

        None
    }

    /// Returns `true` if a subject with `gate_bucket` passes the traffic gate.
    ///
    /// With zero traffic, bucket 0 still passes (`0 / 10000 > 0` is false).
    pub fn admits(&self, gate_bucket: u32) -> bool {
        gate_bucket as f64 / TOTAL_BUCKETS as f64 <= self.traffic()
    }

    /// Variant owning `bucket`, walking variants in declared order.
    ///
    /// Returns `None` only when rounded weights leave the top of the bucket range uncovered.
    pub fn variant_for_bucket(&self, bucket: u32) -> Option<&Variant> {
        self.thresholds()
            .iter()
            .position(|&threshold| bucket < threshold)
            .map(|i| &self.variants()[i])
    }
}
