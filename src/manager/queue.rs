//! Per-type job queues and their status snapshots.

use crate::core::{JobId, JobState, Resource, ResourceType};
use crate::manager::job::Job;

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// FIFO of jobs of one resource type, in enqueue order.
///
/// The head is the active job; every other job waits behind it.
#[derive(Debug, Default)]
pub(crate) struct JobQueue {
    jobs: VecDeque<Job>,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_back(&mut self, job: Job) {
        self.jobs.push_back(job);
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub(crate) fn front_mut(&mut self) -> Option<&mut Job> {
        self.jobs.front_mut()
    }

    /// Returns `true` if the job with `id` is at the head.
    pub(crate) fn is_head(&self, id: JobId) -> bool {
        self.jobs.front().is_some_and(|job| job.id() == id)
    }

    pub(crate) fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| job.id() == id)
    }

    /// Removes the job with `id`, wherever it sits.
    pub(crate) fn remove(&mut self, id: JobId) -> Option<Job> {
        let index = self.jobs.iter().position(|job| job.id() == id)?;
        self.jobs.remove(index)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Job> {
        self.jobs.iter_mut()
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = Job> + '_ {
        self.jobs.drain(..)
    }
}

/// Point-in-time view of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    /// The job id.
    pub id: JobId,
    /// What the job scans.
    pub resource: Resource,
    /// Lifecycle state.
    pub state: JobState,
    /// Scan id assigned by the service, once running.
    pub scan_id: Option<String>,
    /// Resubmission delay after a rate limit; zero when disabled.
    pub retry_submission_delay: Duration,
    /// Whether the job is at the head of its queue.
    pub active: bool,
    /// Whether an abort is in progress.
    pub aborting: bool,
}

/// Point-in-time view of one resource type's queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaneStatus {
    /// The resource type of the queue.
    pub resource_type: ResourceType,
    /// Current delay level.
    pub delay_level: usize,
    /// Delay at the current level.
    pub delay: Duration,
    /// Jobs in queue order.
    pub jobs: Vec<JobSnapshot>,
}

impl LaneStatus {
    /// Returns the active job, if any.
    pub fn active(&self) -> Option<&JobSnapshot> {
        self.jobs.first()
    }
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    /// The file queue.
    pub file: LaneStatus,
    /// The URL queue.
    pub url: LaneStatus,
    /// Whether the service reported its limit and no accepted reply followed yet.
    pub service_limit: bool,
}

impl SchedulerStatus {
    /// Returns the status of the queue for `resource_type`.
    pub fn lane(&self, resource_type: ResourceType) -> &LaneStatus {
        match resource_type {
            ResourceType::File => &self.file,
            ResourceType::Url => &self.url,
        }
    }

    /// Returns the total number of queued jobs.
    pub fn job_count(&self) -> usize {
        self.file.jobs.len() + self.url.jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::{MockConnector, RecordingListener};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn job(name: &str) -> Job {
        let (tx, _rx) = mpsc::unbounded_channel();
        Job::new(
            Resource::file(name),
            true,
            Arc::new(MockConnector::new()),
            Arc::new(RecordingListener::new()),
            tx,
            5,
        )
    }

    #[test]
    fn test_fifo_order_and_head() {
        let mut queue = JobQueue::new();
        let a = job("a");
        let b = job("b");
        let (a_id, b_id) = (a.id(), b.id());
        queue.push_back(a);
        queue.push_back(b);

        assert_eq!(queue.len(), 2);
        assert!(queue.is_head(a_id));
        assert!(!queue.is_head(b_id));
        assert!(queue.iter().any(|job| job.id() == b_id));

        let removed = queue.remove(a_id).map(|job| job.id());
        assert_eq!(removed, Some(a_id));
        assert!(queue.is_head(b_id));
        assert!(queue.remove(a_id).is_none());
    }

    #[test]
    fn test_remove_from_middle() {
        let mut queue = JobQueue::new();
        let jobs: Vec<Job> = ["a", "b", "c"].into_iter().map(job).collect();
        let ids: Vec<JobId> = jobs.iter().map(Job::id).collect();
        for job in jobs {
            queue.push_back(job);
        }

        queue.remove(ids[1]);
        let remaining: Vec<JobId> = queue.iter().map(Job::id).collect();
        assert_eq!(remaining, vec![ids[0], ids[2]]);
    }

    #[test]
    fn test_snapshot_serializes() {
        let job = job("a");
        let snapshot = job.snapshot(true);
        let json = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(json["state"]["state"], "created");
        assert_eq!(json["active"], true);
    }
}
