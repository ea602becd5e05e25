use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::ExperimentKey;

/// Treatment returned whenever a subject is not assigned to a variant.
pub const CONTROL_TREATMENT: &str = "control";

/// Outcome category of an assignment. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    #[display(fmt = "ASSIGNED")]
    Assigned,
    #[display(fmt = "INELIGIBLE")]
    Ineligible,
    #[display(fmt = "TRAFFIC_GATE")]
    TrafficGate,
    #[display(fmt = "FALLBACK")]
    Fallback,
    #[display(fmt = "WEIGHTS_ERROR")]
    WeightsError,
}

/// Tag explaining why a subject did not get a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    #[display(fmt = "not_running_or_missing")]
    NotRunningOrMissing,
    #[display(fmt = "out_of_window")]
    OutOfWindow,
    #[display(fmt = "country_targeting")]
    CountryTargeting,
    #[display(fmt = "min_app_version")]
    MinAppVersion,
}

/// Result of assigning a subject to an experiment.
///
/// Produced fresh per call and never stored. `config_version` identifies the configuration
/// snapshot the decision was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentDecision {
    pub experiment: ExperimentKey,
    pub treatment: String,
    pub decision: Decision,
    pub reasons: Vec<Reason>,
    pub config_version: String,
}

impl AssignmentDecision {
    pub(crate) fn assigned(
        experiment: &ExperimentKey,
        treatment: &str,
        config_version: &str,
    ) -> AssignmentDecision {
        AssignmentDecision {
            experiment: experiment.clone(),
            treatment: treatment.to_owned(),
            decision: Decision::Assigned,
            reasons: Vec::new(),
            config_version: config_version.to_owned(),
        }
    }

    /// Decision that falls back to [`CONTROL_TREATMENT`].
    pub(crate) fn control(
        experiment: &ExperimentKey,
        decision: Decision,
        reason: Option<Reason>,
        config_version: &str,
    ) -> AssignmentDecision {
        AssignmentDecision {
            experiment: experiment.clone(),
            treatment: CONTROL_TREATMENT.to_owned(),
            decision,
            reasons: reason.into_iter().collect(),
            config_version: config_version.to_owned(),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.decision == Decision::Assigned
    }
}

#[cfg(test)]
mod tests {
    use super::{AssignmentDecision, Decision, Reason};
    use crate::ExperimentKey;

    #[test]
    fn serializes_wire_names() {
        let decision = AssignmentDecision::control(
            &ExperimentKey::new("exp1").unwrap(),
            Decision::Ineligible,
            Some(Reason::OutOfWindow),
            "1700000000000",
        );
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "experiment": "exp1",
                "treatment": "control",
                "decision": "INELIGIBLE",
                "reasons": ["out_of_window"],
                "configVersion": "1700000000000",
            })
        );
        assert!(!decision.is_assigned());
    }

    #[test]
    fn display_matches_wire_names() {
        assert_eq!(Decision::TrafficGate.to_string(), "TRAFFIC_GATE");
        assert_eq!(Reason::MinAppVersion.to_string(), "min_app_version");
        assert_eq!(Reason::CountryTargeting.to_string(), "country_targeting");
        assert_eq!(
            serde_json::to_string(&Reason::NotRunningOrMissing).unwrap(),
            "\"not_running_or_missing\""
        );
    }
}
