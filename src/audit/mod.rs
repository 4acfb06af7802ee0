//! Structured audit logging of the job lifecycle.
//!
//! This module provides functions for emitting structured audit events
//! using the `tracing` crate, on the `scanpoll::audit` target. Events can
//! be captured by any tracing subscriber (JSON file, OpenTelemetry, etc.).

mod events;

pub use events::{
    emit_delay_levels_reset, emit_job_enqueued, emit_job_finished, AuditEvent, JobAuditEvent,
};
