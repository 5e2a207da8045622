//! Pipeline orchestration for Euclid.
//!
//! This crate sequences the remote crawl → label → score stages, runs the
//! user-triggered export, and exposes the pipeline status, dataset snapshot,
//! and notifications to whatever presentation layer drives it.

pub mod notify;
pub mod pipeline;
pub mod sink;

pub use notify::{Notification, NotificationLevel, Notifier};
pub use pipeline::Orchestrator;
pub use sink::{DirectorySink, ExportArtifact, ExportSink, MemorySink};
