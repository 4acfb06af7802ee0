//! A single scan job.
//!
//! A [`Job`] owns one submission: the resource, the connector it talks
//! through, its scan id and lifecycle state. Requests and timers run on
//! spawned tasks that post their result back to the scheduler's event
//! loop; the job only ever changes state from inside that loop.

use crate::core::{
    ArcConnector, ArcListener, ConnectorEvent, JobId, JobOutcome, JobState, PollDelay, Resource,
    ResourceType, UploadProgress,
};
use crate::manager::message::{Message, TimerKind};
use crate::manager::queue::JobSnapshot;
use crate::manager::retry::SubmissionRetry;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// What a connector event means for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobSignal {
    /// The service assigned a scan id.
    ScanIdReady,
    /// A poll came back without a report.
    ReportNotReady,
    /// The service throttled a running job, or a job without retry delay.
    ServiceLimitReached,
    /// The job reached its terminal state.
    Finished(JobOutcome),
}

/// One submission tracked through its whole lifecycle.
pub(crate) struct Job {
    id: JobId,
    resource: Resource,
    reuse_last_report: bool,
    connector: ArcConnector,
    listener: ArcListener,
    tx: UnboundedSender<Message>,
    state: JobState,
    scan_id: Option<String>,
    retry: SubmissionRetry,
    aborting: bool,
    request: Option<JoinHandle<()>>,
    request_seq: u64,
    timer: Option<JoinHandle<()>>,
    timer_seq: u64,
}

impl Job {
    pub(crate) fn new(
        resource: Resource,
        reuse_last_report: bool,
        connector: ArcConnector,
        listener: ArcListener,
        tx: UnboundedSender<Message>,
        max_submission_retries: u32,
    ) -> Self {
        Self {
            id: JobId::next(),
            resource,
            reuse_last_report,
            connector,
            listener,
            tx,
            state: JobState::Created,
            scan_id: None,
            retry: SubmissionRetry::new(max_submission_retries),
            aborting: false,
            request: None,
            request_seq: 0,
            timer: None,
            timer_seq: 0,
        }
    }

    pub(crate) fn id(&self) -> JobId {
        self.id
    }

    pub(crate) fn resource_type(&self) -> ResourceType {
        self.resource.resource_type
    }

    pub(crate) fn state(&self) -> JobState {
        self.state
    }

    /// A job is running once the service assigned it a scan id.
    pub(crate) fn is_running(&self) -> bool {
        self.scan_id.is_some()
    }

    pub(crate) fn is_aborting(&self) -> bool {
        self.aborting
    }

    pub(crate) fn is_submitting(&self) -> bool {
        self.state == JobState::Submitting
    }

    pub(crate) fn is_waiting_retry(&self) -> bool {
        self.state == JobState::WaitingRetry
    }

    /// A report poll is in flight.
    pub(crate) fn is_polling(&self) -> bool {
        self.state == JobState::Polling
    }

    /// Sets the delay used to resubmit after a rate limit; zero disables it.
    pub(crate) fn retry_submission_every(&mut self, delay: Duration) {
        self.retry.set_delay(delay);
    }

    /// Tells the listener the job waits behind the active one.
    pub(crate) fn notify_queued(&self) {
        self.listener.queued();
    }

    /// Sends the submission request.
    ///
    /// Returns `false` without doing anything while a submission is in
    /// flight, a resubmission is armed, or the job is already running,
    /// aborting or finished.
    pub(crate) fn submit(&mut self) -> bool {
        if self.state.is_finished() || self.aborting {
            tracing::debug!(job_id = %self.id, "Job is finishing, not submitting");
            return false;
        }
        match self.state {
            JobState::Submitting => {
                tracing::warn!(job_id = %self.id, "Job is already being submitted");
                false
            }
            JobState::WaitingRetry => {
                tracing::warn!(job_id = %self.id, "Job has a resubmission armed");
                false
            }
            _ if self.is_running() => {
                tracing::warn!(job_id = %self.id, "Job already has a scan id");
                false
            }
            _ => {
                self.submit_job();
                true
            }
        }
    }

    fn submit_job(&mut self) {
        self.state = JobState::Submitting;
        self.listener.scanning_started();

        let connector = Arc::clone(&self.connector);
        let resource = self.resource.clone();
        let reuse_last_report = self.reuse_last_report;
        let progress = self.upload_progress();
        tracing::debug!(job_id = %self.id, resource = %resource, "Submitting job");
        self.spawn_request(async move {
            ConnectorEvent::from(
                connector
                    .submit(&resource, reuse_last_report, &progress)
                    .await,
            )
        });
    }

    /// Builds the progress reporter for the submission about to be spawned.
    fn upload_progress(&self) -> UploadProgress {
        let job_id = self.id;
        let resource_type = self.resource_type();
        // Generation the submission gets from `spawn_request`.
        let seq = self.request_seq + 1;
        let tx = self.tx.clone();
        UploadProgress::new(move |sent, total| {
            let _ = tx.send(Message::Progress {
                job_id,
                resource_type,
                seq,
                sent,
                total,
            });
        })
    }

    /// Forwards upload progress of the current submission to the listener.
    pub(crate) fn on_progress(&mut self, seq: u64, sent: u64, total: u64) {
        if seq != self.request_seq || !self.is_submitting() || self.aborting {
            return;
        }
        self.listener.upload_progress(sent, total);
    }

    /// Schedules the next report poll.
    ///
    /// [`PollDelay::After`] notifies the listener with the countdown, then
    /// arms a one-shot timer, or polls at once for a zero delay.
    /// [`PollDelay::Now`] polls at once without notifying a countdown.
    pub(crate) fn check_report_ready(&mut self, delay: PollDelay, limit_reached: bool) {
        if self.state.is_finished() || self.aborting {
            return;
        }
        let PollDelay::After(delay) = delay else {
            self.poll();
            return;
        };

        if limit_reached {
            self.listener.service_limit_reached(delay);
        } else {
            self.listener.waiting_for_report(delay);
        }
        if delay.is_zero() {
            self.poll();
            return;
        }
        tracing::debug!(
            job_id = %self.id,
            delay_secs = delay.as_secs(),
            limit_reached,
            "Scheduling report poll"
        );
        self.arm_timer(delay, TimerKind::Poll);
    }

    fn poll(&mut self) {
        let Some(scan_id) = self.scan_id.clone() else {
            tracing::error!(job_id = %self.id, "Job has no scan id, cannot poll");
            return;
        };
        self.state = JobState::Polling;
        self.listener.retrieving_report();

        let connector = Arc::clone(&self.connector);
        let resource = self.resource.clone();
        self.spawn_request(async move {
            ConnectorEvent::from(connector.retrieve_report(&resource, &scan_id).await)
        });
    }

    /// Starts aborting the job.
    ///
    /// The in-flight request and any timer are cancelled and an
    /// [`ConnectorEvent::Aborted`] is posted to the event loop. Replies
    /// from before the abort are dropped when they arrive.
    pub(crate) fn abort(&mut self) {
        if self.aborting || self.state.is_finished() {
            tracing::debug!(job_id = %self.id, "Job is already finishing");
            return;
        }
        self.aborting = true;
        self.cancel_timer();
        if let Some(request) = self.request.take() {
            request.abort();
        }
        self.connector.abort(&self.resource, self.scan_id.as_deref());

        self.request_seq += 1;
        tracing::info!(job_id = %self.id, "Aborting job");
        let _ = self.tx.send(Message::Connector {
            job_id: self.id,
            resource_type: self.resource_type(),
            seq: self.request_seq,
            event: ConnectorEvent::Aborted,
        });
    }

    /// Applies a connector event and says what it means for the scheduler.
    ///
    /// Returns `None` when the event was handled locally or was stale.
    pub(crate) fn on_event(&mut self, seq: u64, event: ConnectorEvent) -> Option<JobSignal> {
        if seq != self.request_seq {
            tracing::debug!(job_id = %self.id, event = event.name(), "Dropping superseded reply");
            return None;
        }
        self.request = None;

        if let JobState::Finished(outcome) = self.state {
            tracing::warn!(
                job_id = %self.id,
                event = event.name(),
                outcome = %outcome,
                "Event received after the job finished"
            );
            return None;
        }

        match event {
            ConnectorEvent::ScanIdReady(scan_id) => {
                tracing::debug!(job_id = %self.id, scan_id = %scan_id, "Scan id ready");
                self.scan_id = Some(scan_id);
                self.state = JobState::Running;
                self.retry.reset();
                Some(JobSignal::ScanIdReady)
            }
            ConnectorEvent::ReportNotReady => {
                self.state = JobState::Running;
                Some(JobSignal::ReportNotReady)
            }
            ConnectorEvent::ServiceLimitReached => self.on_service_limit_reached(),
            ConnectorEvent::ReportReady(report) => {
                self.listener.report_ready(&report);
                Some(self.finish(JobOutcome::ReportReady))
            }
            ConnectorEvent::InvalidServiceKey => {
                self.listener.invalid_service_key();
                Some(self.finish(JobOutcome::InvalidServiceKey))
            }
            ConnectorEvent::Aborted => {
                self.aborting = false;
                self.listener.aborted();
                Some(self.finish(JobOutcome::Aborted))
            }
            ConnectorEvent::Error(message) => {
                tracing::warn!(job_id = %self.id, error = %message, "Job failed");
                self.listener.error_occurred(&message);
                Some(self.finish(JobOutcome::Error))
            }
        }
    }

    fn on_service_limit_reached(&mut self) -> Option<JobSignal> {
        if self.is_running() {
            self.state = JobState::Running;
            return Some(JobSignal::ServiceLimitReached);
        }

        self.state = JobState::Created;
        if !self.retry.is_enabled() {
            self.listener.queued();
            return Some(JobSignal::ServiceLimitReached);
        }

        if !self.retry.should_retry() {
            let message = format!(
                "service limit still reached after {} submission retries",
                self.retry.attempts()
            );
            tracing::warn!(job_id = %self.id, "Giving up submission");
            self.listener.error_occurred(&message);
            return Some(self.finish(JobOutcome::Error));
        }

        let delay = self.retry.delay();
        self.retry.record_attempt();
        self.state = JobState::WaitingRetry;
        tracing::debug!(
            job_id = %self.id,
            delay_secs = delay.as_secs(),
            attempt = self.retry.attempts(),
            "Service limit reached, resubmission armed"
        );
        self.listener.service_limit_reached(delay);
        self.arm_timer(delay, TimerKind::Resubmit);
        None
    }

    /// Handles a timer firing.
    pub(crate) fn on_timer(&mut self, seq: u64, timer: TimerKind) {
        if seq != self.timer_seq {
            tracing::debug!(job_id = %self.id, "Dropping superseded timer");
            return;
        }
        self.timer = None;
        if self.aborting || self.state.is_finished() {
            tracing::debug!(job_id = %self.id, "Job is finishing, ignoring timer");
            return;
        }
        match timer {
            TimerKind::Poll => self.poll(),
            TimerKind::Resubmit => {
                if self.state == JobState::WaitingRetry {
                    self.submit_job();
                }
            }
        }
    }

    pub(crate) fn snapshot(&self, active: bool) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            resource: self.resource.clone(),
            state: self.state,
            scan_id: self.scan_id.clone(),
            retry_submission_delay: self.retry.delay(),
            active,
            aborting: self.aborting,
        }
    }

    fn finish(&mut self, outcome: JobOutcome) -> JobSignal {
        self.cancel_timer();
        self.state = JobState::Finished(outcome);
        JobSignal::Finished(outcome)
    }

    fn spawn_request<F>(&mut self, request: F)
    where
        F: Future<Output = ConnectorEvent> + Send + 'static,
    {
        self.request_seq += 1;
        let seq = self.request_seq;
        let job_id = self.id;
        let resource_type = self.resource_type();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let event = request.await;
            let _ = tx.send(Message::Connector {
                job_id,
                resource_type,
                seq,
                event,
            });
        });
        if let Some(stale) = self.request.replace(handle) {
            if !stale.is_finished() {
                tracing::warn!(job_id = %self.id, "Freeing a request that was still in flight");
            }
            stale.abort();
        }
    }

    fn arm_timer(&mut self, delay: Duration, timer: TimerKind) {
        self.cancel_timer();
        self.timer_seq += 1;
        let seq = self.timer_seq;
        let job_id = self.id;
        let resource_type = self.resource_type();
        let tx = self.tx.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Message::Timer {
                job_id,
                resource_type,
                seq,
                timer,
            });
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            request.abort();
        }
        self.cancel_timer();
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("resource", &self.resource)
            .field("state", &self.state)
            .field("scan_id", &self.scan_id)
            .field("aborting", &self.aborting)
            .finish()
    }
}
