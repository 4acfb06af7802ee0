//! # Scanpoll
//!
//! Job scheduling and adaptive polling for rate-limited remote scanning
//! services.
//!
//! ## Overview
//!
//! Online scanning services accept a file or a URL, hand back a scan id
//! and publish the report some time later. They also throttle clients
//! hard. Scanpoll sits between an application and such a service:
//!
//! - Every resource type (files, URLs) gets its own FIFO queue
//! - Only the head of each queue polls for its report
//! - The poll interval walks a per-connector delay table: faster while
//!   reports are not ready, slower when the service reports its limit
//! - Submissions hit by the rate limit are retried on a bounded schedule
//! - Listeners get user-facing notifications for every step of a job
//! - Structured audit events record jobs entering and leaving the queues
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scanpoll::prelude::*;
//! use scanpoll::backends::{MockConnector, MockStep, RecordingListener};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Any type implementing `Connector` works here
//!     let connector = MockConnector::new().with_script(
//!         "http://example.com",
//!         vec![MockStep::scan_id("scan-1"), MockStep::Ready],
//!     );
//!
//!     let scheduler = Scheduler::new(
//!         Arc::new(SharedConnector::new(connector)),
//!         SchedulerConfig::default(),
//!     )?;
//!     let handle = scheduler.handle();
//!     tokio::spawn(scheduler.run());
//!
//!     let listener = Arc::new(RecordingListener::new());
//!     let job_id = handle
//!         .enqueue(Resource::url("http://example.com"), listener, true)
//!         .await?;
//!     println!("Enqueued job {job_id}");
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several layers:
//!
//! - **Core**: Fundamental types, traits, reports and error handling
//! - **Backends**: Connector implementations (a scripted mock for tests)
//! - **Manager**: Jobs, queues, delay levels and the scheduler event loop
//! - **Audit**: Structured logging of the job lifecycle

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod backends;
pub mod core;
pub mod manager;

// Re-export commonly used types at the crate root
pub use crate::core::{
    Connector, ConnectorConfig, ConnectorError, ConnectorEvent, ConnectorFactory, JobId,
    JobListener, JobOutcome, JobState, Report, Resource, ResourceType, SchedulerError,
    SharedConnector, UploadProgress,
};

pub use crate::manager::{Scheduler, SchedulerConfig, SchedulerHandle, SchedulerStatus};

/// Prelude module for convenient imports.
///
/// ```rust
/// use scanpoll::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        ArcConnector, ArcListener, Connector, ConnectorConfig, ConnectorError, ConnectorFactory,
        FileReport, JobId, JobListener, JobOutcome, PollReply, Report, Resource, ResourceType,
        SchedulerError, SchedulerResult, SharedConnector, UploadProgress, UrlReport,
    };
    pub use crate::manager::{Scheduler, SchedulerConfig, SchedulerHandle, SchedulerStatus};
}
