//! Messages delivered to the scheduler's event loop.

use crate::core::{ArcListener, ConnectorEvent, JobId, Resource, ResourceType, SchedulerResult};
use crate::manager::queue::SchedulerStatus;

use tokio::sync::oneshot;

/// Everything the event loop reacts to.
#[derive(Debug)]
pub(crate) enum Message {
    /// A request from a [`SchedulerHandle`](crate::manager::SchedulerHandle).
    Command(Command),

    /// A connector round trip finished.
    Connector {
        job_id: JobId,
        resource_type: ResourceType,
        /// Request generation, used to drop replies that were superseded.
        seq: u64,
        event: ConnectorEvent,
    },

    /// A connector reported upload progress of a submission.
    Progress {
        job_id: JobId,
        resource_type: ResourceType,
        /// Request generation of the submission.
        seq: u64,
        sent: u64,
        total: u64,
    },

    /// A job timer fired.
    Timer {
        job_id: JobId,
        resource_type: ResourceType,
        /// Timer generation, used to drop firings that were superseded.
        seq: u64,
        timer: TimerKind,
    },
}

/// What a job timer was armed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// Ask for the report again.
    Poll,
    /// Resubmit after a rate-limit reply.
    Resubmit,
}

/// Requests sent by handles.
pub(crate) enum Command {
    Enqueue {
        resource: Resource,
        listener: ArcListener,
        reuse_last_report: bool,
        reply: oneshot::Sender<SchedulerResult<JobId>>,
    },
    Abort {
        job_id: JobId,
        reply: oneshot::Sender<bool>,
    },
    Status {
        reply: oneshot::Sender<SchedulerStatus>,
    },
    Shutdown,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enqueue {
                resource,
                reuse_last_report,
                ..
            } => f
                .debug_struct("Enqueue")
                .field("resource", resource)
                .field("reuse_last_report", reuse_last_report)
                .finish(),
            Self::Abort { job_id, .. } => f.debug_struct("Abort").field("job_id", job_id).finish(),
            Self::Status { .. } => f.write_str("Status"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}
