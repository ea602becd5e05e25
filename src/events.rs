//! Exposure and goal events, and the [`EventSink`] abstraction they are recorded through.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Context;

/// A subject was shown a treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureEvent {
    pub ts: DateTime<Utc>,
    pub experiment: String,
    pub treatment: String,
    /// Stable key of the subject (see [`Subject::stable_key`](crate::Subject::stable_key)).
    pub subject: String,
    #[serde(default)]
    pub ctx: Context,
}

/// A subject achieved a named outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalEvent {
    pub ts: DateTime<Utc>,
    pub experiment: String,
    pub treatment: String,
    pub subject: String,
    pub goal: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub ctx: Context,
}

/// One self-contained record of the event log, serialized as a single JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Exposure(ExposureEvent),
    Goal(GoalEvent),
}

impl Event {
    pub fn experiment(&self) -> &str {
        match self {
            Event::Exposure(e) => &e.experiment,
            Event::Goal(e) => &e.experiment,
        }
    }

    pub fn ts(&self) -> DateTime<Utc> {
        match self {
            Event::Exposure(e) => e.ts,
            Event::Goal(e) => e.ts,
        }
    }
}

/// Destination of exposure and goal events.
///
/// Recording is fire-and-forget: implementations must not panic and must not report failures to
/// the caller. Errors are handled (logged, event dropped) inside the implementation.
pub trait EventSink {
    /// Record `event`.
    fn append(&self, event: Event);

    /// Record that `subject_key` was exposed to `treatment`.
    fn append_exposure(
        &self,
        experiment: &str,
        treatment: &str,
        subject_key: &str,
        ts: DateTime<Utc>,
        ctx: &Context,
    ) {
        self.append(Event::Exposure(ExposureEvent {
            ts,
            experiment: experiment.to_owned(),
            treatment: treatment.to_owned(),
            subject: subject_key.to_owned(),
            ctx: ctx.clone(),
        }));
    }

    /// Record that `subject_key` reached `goal`, optionally with a numeric value.
    #[allow(clippy::too_many_arguments)]
    fn append_goal(
        &self,
        experiment: &str,
        treatment: &str,
        subject_key: &str,
        goal: &str,
        value: Option<f64>,
        ts: DateTime<Utc>,
        ctx: &Context,
    ) {
        self.append(Event::Goal(GoalEvent {
            ts,
            experiment: experiment.to_owned(),
            treatment: treatment.to_owned(),
            subject: subject_key.to_owned(),
            goal: goal.to_owned(),
            value,
            ctx: ctx.clone(),
        }));
    }
}

/// Sink that only writes events to the debug log. Useful for local testing.
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn append(&self, event: Event) {
        log::debug!(target: "abassign", event:serde; "dropping event");
    }
}

impl<T: Fn(Event)> EventSink for T {
    fn append(&self, event: Event) {
        self(event);
    }
}
