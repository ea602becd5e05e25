//! Deterministic assignment of subjects to A/B experiment treatments.
//!
//! # Overview
//!
//! The crate revolves around a [`Client`] that assigns `subjects` (identified by a user id, a
//! device id or a request id) to one of the variants of an [`Experiment`]. Assignment is a pure
//! function of the subject, the request [`Context`] and the current [`Configuration`] snapshot:
//! the same inputs always produce the same [`AssignmentDecision`].
//!
//! Experiments are loaded from a JSON document by a [`ConfigurationSource`] and held by a
//! [`ConfigurationStore`]. A [`PollerThread`] can keep the store up to date by watching the
//! source for changes, swapping in new snapshots atomically while assignments keep running.
//!
//! Exposures and goals are recorded through an [`EventSink`]. [`WalEventSink`] appends them as
//! JSON lines to size-rotated segment files.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Assignment itself never fails: missing experiments, targeting mismatches and malformed weights
//! all result in the [`CONTROL_TREATMENT`] together with a [`Decision`] explaining why. Failures
//! to reload configuration or to write events are logged and do not reach the caller.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate with target `abassign`.
//! Consider integrating a `log`-compatible logger implementation for visibility into reloads and
//! event log rotation.
//!
//! # Examples
//!
//! A runnable program can be found in `demos/simple`.

#![warn(rustdoc::missing_crate_level_docs)]

mod client;
mod config;
mod configuration;
mod configuration_source;
mod configuration_store;
mod decision;
mod error;
mod eval;
mod events;
mod experiment;
mod poller_thread;
mod settings;
mod sharder;
mod subject;
mod wal;

pub use client::Client;
pub use config::ClientConfig;
pub use configuration::Configuration;
pub use configuration_source::{ConfigurationSource, FileConfigurationSource};
pub use configuration_store::ConfigurationStore;
pub use decision::{AssignmentDecision, Decision, Reason, CONTROL_TREATMENT};
pub use error::{Error, Result, ValidationError};
pub use eval::Context;
pub use events::{Event, EventSink, ExposureEvent, GoalEvent, NoopEventSink};
pub use experiment::{Experiment, ExperimentKey, Status, Targets, Variant};
pub use poller_thread::{PollerThread, PollerThreadConfig};
pub use settings::Settings;
pub use sharder::{Md5Sharder, Sha256Sharder, Sharder, TOTAL_BUCKETS};
pub use subject::Subject;
pub use wal::{read_segment, WalConfig, WalEventSink};
