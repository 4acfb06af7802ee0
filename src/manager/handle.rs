//! Cloneable handle to a running scheduler.

use crate::core::{ArcListener, JobId, Resource, SchedulerError, SchedulerResult};
use crate::manager::message::{Command, Message};
use crate::manager::queue::SchedulerStatus;

use tokio::sync::{mpsc::UnboundedSender, oneshot};

/// Drives a [`Scheduler`](crate::manager::Scheduler) from other tasks.
///
/// Every call is a message to the scheduler's event loop; replies come
/// back once the loop handled it. Calls fail with
/// [`SchedulerError::Closed`] after the scheduler stopped.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: UnboundedSender<Message>,
}

impl SchedulerHandle {
    pub(crate) fn new(tx: UnboundedSender<Message>) -> Self {
        Self { tx }
    }

    /// Enqueues a scan job.
    pub async fn enqueue(
        &self,
        resource: Resource,
        listener: ArcListener,
        reuse_last_report: bool,
    ) -> SchedulerResult<JobId> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Enqueue {
            resource,
            listener,
            reuse_last_report,
            reply,
        })?;
        rx.await.map_err(|_| SchedulerError::Closed)?
    }

    /// Aborts a job. Returns `false` if the job is unknown.
    pub async fn abort(&self, job_id: JobId) -> SchedulerResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Abort { job_id, reply })?;
        rx.await.map_err(|_| SchedulerError::Closed)
    }

    /// Returns a snapshot of both queues.
    pub async fn status(&self) -> SchedulerResult<SchedulerStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply })?;
        rx.await.map_err(|_| SchedulerError::Closed)
    }

    /// Stops the scheduler. Queued jobs are dropped and their requests cancelled.
    pub fn shutdown(&self) -> SchedulerResult<()> {
        self.send(Command::Shutdown)
    }

    /// Returns `true` once the scheduler stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, command: Command) -> SchedulerResult<()> {
        self.tx
            .send(Message::Command(command))
            .map_err(|_| SchedulerError::Closed)
    }
}
