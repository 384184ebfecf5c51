//! facewatch-engine — Identification engine with watchlist alerting.
//!
//! Wraps a [`facewatch_core::EnrollmentStore`] behind a reader/writer lock so
//! `identify` can run concurrently with enrollment, and hands watchlist hits
//! to a background alert worker that never delays a decision.

pub mod alert;
pub mod config;
pub mod engine;

pub use alert::{
    AlertDispatcher, AlertError, AlertEvent, AlertOutcome, AlertSink, AlertStats, DeliveryReport,
    DispatcherConfig, DropReason, JsonLinesSink, LogSink,
};
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineError, EngineStats, IdentitySummary};
