//! Audit event types and emission functions.

use crate::core::{JobId, JobOutcome, ResourceType};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Base trait for audit events.
pub trait AuditEvent: Serialize {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Returns the timestamp of the event.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Audit event for a job entering or leaving its queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAuditEvent {
    /// Unique id of this record.
    pub event_id: String,

    /// Event type.
    pub event_type: String,

    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// The job id.
    pub job_id: JobId,

    /// Queue the job belongs to.
    pub resource_type: ResourceType,

    /// Position in the queue when enqueued; zero means active.
    pub position: Option<usize>,

    /// How the job ended, for finished jobs.
    pub outcome: Option<JobOutcome>,
}

impl JobAuditEvent {
    /// Creates an event for a job that was just enqueued.
    pub fn enqueued(job_id: JobId, resource_type: ResourceType, position: usize) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type: "job_enqueued".to_string(),
            timestamp: Utc::now(),
            job_id,
            resource_type,
            position: Some(position),
            outcome: None,
        }
    }

    /// Creates an event for a job that reached its terminal state.
    pub fn finished(job_id: JobId, resource_type: ResourceType, outcome: JobOutcome) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type: "job_finished".to_string(),
            timestamp: Utc::now(),
            job_id,
            resource_type,
            position: None,
            outcome: Some(outcome),
        }
    }
}

impl AuditEvent for JobAuditEvent {
    fn event_type(&self) -> &'static str {
        if self.outcome.is_some() {
            "job_finished"
        } else {
            "job_enqueued"
        }
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Emits an audit event for a job being enqueued.
pub fn emit_job_enqueued(job_id: JobId, resource_type: ResourceType, position: usize) {
    let event = JobAuditEvent::enqueued(job_id, resource_type, position);
    tracing::info!(
        target: "scanpoll::audit",
        event_id = %event.event_id,
        event_type = event.event_type(),
        timestamp = %event.timestamp.to_rfc3339(),
        job_id = %event.job_id,
        resource_type = %event.resource_type,
        position,
        active = position == 0,
        "Job enqueued"
    );
}

/// Emits an audit event for a job reaching its terminal state.
pub fn emit_job_finished(job_id: JobId, resource_type: ResourceType, outcome: JobOutcome) {
    let event = JobAuditEvent::finished(job_id, resource_type, outcome);
    tracing::info!(
        target: "scanpoll::audit",
        event_id = %event.event_id,
        event_type = event.event_type(),
        timestamp = %event.timestamp.to_rfc3339(),
        job_id = %event.job_id,
        resource_type = %event.resource_type,
        outcome = %outcome,
        "Job finished"
    );
}

/// Emits an audit event for both delay levels returning to their defaults.
pub fn emit_delay_levels_reset(file_level: usize, url_level: usize) {
    tracing::info!(
        target: "scanpoll::audit",
        event_type = "delay_levels_reset",
        file_level,
        url_level,
        "Delay levels reset"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_event_types() {
        let enqueued = JobAuditEvent::enqueued(JobId::from(7), ResourceType::Url, 2);
        assert_eq!(enqueued.event_type(), "job_enqueued");
        assert_eq!(enqueued.position, Some(2));

        let finished =
            JobAuditEvent::finished(JobId::from(7), ResourceType::Url, JobOutcome::Aborted);
        assert_eq!(finished.event_type(), "job_finished");
        assert!(finished.timestamp() >= enqueued.timestamp());
        assert_ne!(finished.event_id, enqueued.event_id);
    }

    #[test]
    fn test_job_event_serializes() {
        let event = JobAuditEvent::finished(JobId::from(3), ResourceType::File, JobOutcome::ReportReady);
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["job_id"], 3);
        assert_eq!(json["resource_type"], "file");
        assert_eq!(json["outcome"], "report_ready");
        assert!(json["position"].is_null());
    }
}
