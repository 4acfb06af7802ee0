//! Core types used throughout the scanpoll library.
//!
//! This module defines job identifiers, the resources a job can scan and
//! the values that describe where a job is in its lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a scheduled job.
///
/// Ids are handed out in increasing order and are never reused while the
/// process lives. `0` is reserved as [`JobId::INVALID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    /// The invalid/unset job id.
    pub const INVALID: JobId = JobId(0);

    /// Allocates the next process-wide job id.
    pub(crate) fn next() -> Self {
        Self(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the numeric value of this id.
    pub fn get(self) -> u64 {
        self.0
    }

    /// Returns `true` unless this is [`JobId::INVALID`].
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of resource a job submits.
///
/// Each type has its own queue and its own delay level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// A local file, uploaded to the service.
    File,
    /// A URL, submitted by address.
    Url,
}

impl ResourceType {
    /// Returns the other resource type.
    pub fn other(self) -> Self {
        match self {
            Self::File => Self::Url,
            Self::Url => Self::File,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::File => 0,
            Self::Url => 1,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Url => write!(f, "url"),
        }
    }
}

/// A file path or URL to be scanned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    /// The file path or URL.
    pub name: String,
    /// Whether `name` is a file or a URL.
    pub resource_type: ResourceType,
}

impl Resource {
    /// Creates a new resource.
    pub fn new(name: impl Into<String>, resource_type: ResourceType) -> Self {
        Self {
            name: name.into(),
            resource_type,
        }
    }

    /// Creates a file resource.
    pub fn file(path: impl Into<String>) -> Self {
        Self::new(path, ResourceType::File)
    }

    /// Creates a URL resource.
    pub fn url(url: impl Into<String>) -> Self {
        Self::new(url, ResourceType::Url)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.name)
    }
}

/// When a job should ask the service for its report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDelay {
    /// Ask right away without a countdown.
    Now,
    /// Show the countdown, then ask after it. A zero countdown still
    /// notifies the listener before asking.
    After(Duration),
}

/// Reply to a report poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollReply {
    /// The service has not finished the analysis yet.
    NotReady,
    /// The report is available.
    Ready(crate::core::report::Report),
}

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// The report was delivered to the listener.
    ReportReady,
    /// A transport or protocol error ended the job.
    Error,
    /// The user aborted the job.
    Aborted,
    /// The service rejected the configured key.
    InvalidServiceKey,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReportReady => write!(f, "report_ready"),
            Self::Error => write!(f, "error"),
            Self::Aborted => write!(f, "aborted"),
            Self::InvalidServiceKey => write!(f, "invalid_service_key"),
        }
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "outcome", rename_all = "snake_case")]
pub enum JobState {
    /// Created, no submission issued yet.
    Created,
    /// A submission request is in flight.
    Submitting,
    /// Rate limited before getting a scan id; a resubmission is armed.
    WaitingRetry,
    /// The service assigned a scan id; no poll is in flight.
    Running,
    /// A report poll is in flight.
    Polling,
    /// Terminal state.
    Finished(JobOutcome),
}

impl JobState {
    /// Returns `true` once the job reached its terminal state.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Finished(_))
    }

    /// Returns the name of the state.
    pub fn name(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitting => "submitting",
            Self::WaitingRetry => "waiting_retry",
            Self::Running => "running",
            Self::Polling => "polling",
            Self::Finished(_) => "finished",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_ids_are_increasing_and_valid() {
        let a = JobId::next();
        let b = JobId::next();
        assert!(a.is_valid());
        assert!(b > a);
        assert!(!JobId::INVALID.is_valid());
        assert_eq!(JobId::INVALID.get(), 0);
    }

    #[test]
    fn test_resource_type_other() {
        assert_eq!(ResourceType::File.other(), ResourceType::Url);
        assert_eq!(ResourceType::Url.other(), ResourceType::File);
        assert_ne!(ResourceType::File.index(), ResourceType::Url.index());
    }

    #[test]
    fn test_resource_display() {
        assert_eq!(Resource::url("http://example.com").to_string(), "url:http://example.com");
        assert_eq!(Resource::file("/tmp/a.bin").resource_type, ResourceType::File);
    }

    #[test]
    fn test_job_state_finished() {
        assert!(JobState::Finished(JobOutcome::Aborted).is_finished());
        assert!(!JobState::Polling.is_finished());
        assert_eq!(JobState::WaitingRetry.name(), "waiting_retry");
    }
}
