//! Core types and traits for the scanpoll library.
//!
//! This module provides the fundamental building blocks used throughout
//! the library:
//!
//! - [`types`] - Job ids, resources, poll delays and job states
//! - [`traits`] - The `Connector`, `ConnectorFactory` and `JobListener` traits
//! - [`config`] - Per-connector delay tables and limits
//! - [`event`] - The event every connector round trip ends in
//! - [`error`] - Structured error types
//! - [`report`] - File and URL report structures

pub mod config;
pub mod error;
pub mod event;
pub mod report;
pub mod traits;
pub mod types;

// Re-export commonly used types at the core level
pub use config::ConnectorConfig;
pub use error::{ConnectorError, SchedulerError, SchedulerResult};
pub use event::ConnectorEvent;
pub use report::{EngineVerdict, FileReport, Infection, Report, ReportSummary, UrlReport};
pub use traits::{
    ArcConnector, ArcListener, Connector, ConnectorFactory, JobListener, SharedConnector,
    UploadProgress,
};
pub use types::{JobId, JobOutcome, JobState, PollDelay, PollReply, Resource, ResourceType};
