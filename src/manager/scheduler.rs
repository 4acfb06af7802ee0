//! The scan job scheduler.

use crate::core::{
    ArcListener, ConnectorConfig, ConnectorEvent, ConnectorFactory, JobId, JobOutcome, PollDelay,
    Resource, ResourceType, SchedulerError, SchedulerResult,
};
use crate::manager::delay::DelayLevel;
use crate::manager::handle::SchedulerHandle;
use crate::manager::job::{Job, JobSignal};
use crate::manager::message::{Command, Message, TimerKind};
use crate::manager::queue::{JobQueue, LaneStatus, SchedulerStatus};

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Configuration for the scheduler.
#[derive(Debug)]
pub struct SchedulerConfig {
    /// Silent resubmissions allowed after rate-limit replies, before a job
    /// without scan id gives up with an error.
    pub max_submission_retries: u32,

    /// Key handed to the connector factory for every new job.
    pub service_key: Option<SecretString>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_submission_retries: 5,
            service_key: None,
        }
    }
}

impl SchedulerConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the submission retry budget.
    pub fn with_max_submission_retries(mut self, retries: u32) -> Self {
        self.max_submission_retries = retries;
        self
    }

    /// Sets the service key.
    pub fn with_service_key(mut self, key: impl Into<String>) -> Self {
        self.service_key = Some(SecretString::new(key.into().into()));
        self
    }
}

/// Queue and delay level of one resource type.
#[derive(Debug)]
struct Lane {
    resource_type: ResourceType,
    queue: JobQueue,
    delay: DelayLevel,
}

impl Lane {
    fn new(resource_type: ResourceType, config: &ConnectorConfig) -> Self {
        Self {
            resource_type,
            queue: JobQueue::new(),
            delay: DelayLevel::new(config),
        }
    }

    fn status(&self) -> LaneStatus {
        LaneStatus {
            resource_type: self.resource_type,
            delay_level: self.delay.level(),
            delay: self.delay.delay(),
            jobs: self
                .queue
                .iter()
                .enumerate()
                .map(|(index, job)| job.snapshot(index == 0))
                .collect(),
        }
    }
}

/// Schedules file and URL scan jobs against one scanning service.
///
/// Each resource type has a FIFO queue. Every job is submitted as soon as
/// it is enqueued, but only the head of a queue polls for its report; the
/// others wait until they reach the head. The poll interval of each queue
/// adapts to the service: it shortens while reports are not ready and
/// lengthens when the service reports its rate limit.
///
/// The scheduler is single threaded. Connector replies and timer firings
/// come back as messages and are handled one at a time, either by
/// [`Scheduler::run`] or by calling [`Scheduler::step`] directly.
///
/// # Example
///
/// ```rust,ignore
/// use scanpoll::prelude::*;
///
/// let factory = Arc::new(SharedConnector::new(my_connector));
/// let scheduler = Scheduler::new(factory, SchedulerConfig::default())?;
/// let handle = scheduler.handle();
/// tokio::spawn(scheduler.run());
///
/// let job_id = handle.enqueue(Resource::url("http://example.com"), listener, true).await?;
/// ```
pub struct Scheduler {
    factory: Arc<dyn ConnectorFactory>,
    config: SchedulerConfig,
    lanes: [Lane; 2],
    /// Set while the service reports its limit and no accepted reply followed.
    service_limit: bool,
    tx: UnboundedSender<Message>,
    rx: UnboundedReceiver<Message>,
}

impl Scheduler {
    /// Creates a scheduler for the connectors built by `factory`.
    ///
    /// Fails if the factory's configuration for either resource type is
    /// invalid.
    pub fn new(
        factory: Arc<dyn ConnectorFactory>,
        config: SchedulerConfig,
    ) -> SchedulerResult<Self> {
        let file_config = factory.config(ResourceType::File);
        let url_config = factory.config(ResourceType::Url);
        file_config.validate()?;
        url_config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        tracing::debug!(
            connector = factory.name(),
            file_levels = file_config.num_levels(),
            url_levels = url_config.num_levels(),
            "Scheduler created"
        );

        Ok(Self {
            factory,
            config,
            lanes: [
                Lane::new(ResourceType::File, &file_config),
                Lane::new(ResourceType::Url, &url_config),
            ],
            service_limit: false,
            tx,
            rx,
        })
    }

    /// Returns a handle that drives this scheduler from other tasks.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(self.tx.clone())
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Enqueues a scan job and returns its id.
    ///
    /// Returns [`JobId::INVALID`] if the job could not be created; the
    /// reason is logged. Use [`Scheduler::try_enqueue_job`] to get it.
    pub fn enqueue_job(
        &mut self,
        resource: Resource,
        listener: ArcListener,
        reuse_last_report: bool,
    ) -> JobId {
        match self.try_enqueue_job(resource, listener, reuse_last_report) {
            Ok(id) => id,
            Err(error) => {
                tracing::warn!(error = %error, "Could not enqueue job");
                JobId::INVALID
            }
        }
    }

    /// Enqueues a scan job, or says why it could not be created.
    ///
    /// The job is submitted right away. If its queue was empty it becomes
    /// the active job and resubmits after rate-limit replies.
    pub fn try_enqueue_job(
        &mut self,
        resource: Resource,
        listener: ArcListener,
        reuse_last_report: bool,
    ) -> SchedulerResult<JobId> {
        let resource_type = resource.resource_type;
        let connector_config = self.factory.config(resource_type);
        self.validate(&resource, &connector_config)?;

        let connector = self.factory.create(self.config.service_key.as_ref());
        let mut job = Job::new(
            resource,
            reuse_last_report,
            connector,
            listener,
            self.tx.clone(),
            self.config.max_submission_retries,
        );
        let id = job.id();

        let lane = self.lane_mut(resource_type);
        if lane.queue.is_empty() {
            job.retry_submission_every(lane.delay.default_delay());
        }
        crate::audit::emit_job_enqueued(id, resource_type, lane.queue.len());
        tracing::info!(
            job_id = %id,
            resource_type = %resource_type,
            position = lane.queue.len(),
            "Job enqueued"
        );

        lane.queue.push_back(job);
        if let Some(job) = lane.queue.get_mut(id) {
            job.submit();
        }
        Ok(id)
    }

    fn validate(&self, resource: &Resource, config: &ConnectorConfig) -> SchedulerResult<()> {
        if resource.name.trim().is_empty() {
            return Err(SchedulerError::EmptyResource);
        }
        if config.service_key_required && self.config.service_key.is_none() {
            return Err(SchedulerError::MissingServiceKey {
                engine: self.factory.name().to_string(),
            });
        }
        if resource.resource_type == ResourceType::File {
            if let Some(max) = config.max_file_size {
                let metadata = std::fs::metadata(&resource.name).map_err(|error| {
                    if error.kind() == std::io::ErrorKind::NotFound {
                        SchedulerError::FileNotFound {
                            path: resource.name.clone(),
                        }
                    } else {
                        SchedulerError::Io(error)
                    }
                })?;
                if metadata.len() > max {
                    return Err(SchedulerError::FileTooLarge {
                        size: metadata.len(),
                        max,
                    });
                }
            }
        }
        Ok(())
    }

    /// Aborts a job.
    ///
    /// Returns `false` if no queued job has this id, which includes jobs
    /// that already finished.
    pub fn abort(&mut self, job_id: JobId) -> bool {
        for lane in &mut self.lanes {
            if let Some(job) = lane.queue.get_mut(job_id) {
                job.abort();
                return true;
            }
        }
        tracing::debug!(job_id = %job_id, "Abort requested for unknown job");
        false
    }

    /// Returns a snapshot of both queues.
    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            file: self.lane(ResourceType::File).status(),
            url: self.lane(ResourceType::Url).status(),
            service_limit: self.service_limit,
        }
    }

    /// Waits for the next message and handles it.
    ///
    /// Returns `false` once a shutdown was requested.
    pub async fn step(&mut self) -> bool {
        match self.rx.recv().await {
            Some(message) => self.handle_message(message),
            None => false,
        }
    }

    /// Handles messages until a shutdown is requested.
    pub async fn run(mut self) {
        tracing::info!(connector = self.factory.name(), "Scheduler running");
        while self.step().await {}
        tracing::info!("Scheduler stopped");
    }

    pub(crate) fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::Command(command) => return self.handle_command(command),
            Message::Connector {
                job_id,
                resource_type,
                seq,
                event,
            } => self.handle_event(job_id, resource_type, seq, event),
            Message::Timer {
                job_id,
                resource_type,
                seq,
                timer,
            } => self.handle_timer(job_id, resource_type, seq, timer),
            Message::Progress {
                job_id,
                resource_type,
                seq,
                sent,
                total,
            } => {
                if let Some(job) = self.lane_mut(resource_type).queue.get_mut(job_id) {
                    job.on_progress(seq, sent, total);
                }
            }
        }
        true
    }

    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Enqueue {
                resource,
                listener,
                reuse_last_report,
                reply,
            } => {
                let result = self.try_enqueue_job(resource, listener, reuse_last_report);
                let _ = reply.send(result);
            }
            Command::Abort { job_id, reply } => {
                let _ = reply.send(self.abort(job_id));
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    fn handle_event(
        &mut self,
        job_id: JobId,
        resource_type: ResourceType,
        seq: u64,
        event: ConnectorEvent,
    ) {
        let Some(job) = self.lane_mut(resource_type).queue.get_mut(job_id) else {
            tracing::debug!(job_id = %job_id, event = event.name(), "Event for unknown job");
            return;
        };
        let Some(signal) = job.on_event(seq, event) else {
            return;
        };

        match signal {
            JobSignal::ScanIdReady => self.on_scan_id_ready(job_id, resource_type),
            JobSignal::ReportNotReady => self.on_report_not_ready(job_id, resource_type),
            JobSignal::ServiceLimitReached => self.on_service_limit_reached(job_id, resource_type),
            JobSignal::Finished(outcome) => self.on_finished(job_id, resource_type, outcome),
        }
    }

    fn handle_timer(
        &mut self,
        job_id: JobId,
        resource_type: ResourceType,
        seq: u64,
        timer: TimerKind,
    ) {
        match self.lane_mut(resource_type).queue.get_mut(job_id) {
            Some(job) => job.on_timer(seq, timer),
            None => tracing::debug!(job_id = %job_id, "Timer for unknown job"),
        }
    }

    fn on_scan_id_ready(&mut self, job_id: JobId, resource_type: ResourceType) {
        self.service_limit = false;

        let lane = self.lane_mut(resource_type);
        let is_head = lane.queue.is_head(job_id);
        let first_delay = lane.delay.default_delay();
        let Some(job) = lane.queue.get_mut(job_id) else {
            return;
        };
        if job.is_aborting() {
            return;
        }

        if is_head {
            job.check_report_ready(PollDelay::After(first_delay), false);
        } else {
            job.check_report_ready(PollDelay::Now, false);
        }
    }

    fn on_report_not_ready(&mut self, job_id: JobId, resource_type: ResourceType) {
        self.service_limit = false;

        let floor = self.level_floor(resource_type);
        let lane = self.lane_mut(resource_type);
        if !lane.queue.is_head(job_id) {
            if let Some(job) = lane.queue.get_mut(job_id) {
                tracing::debug!(job_id = %job_id, "Job parked until it reaches the head");
                job.notify_queued();
            }
            return;
        }

        let delay = lane.delay.relax(floor);
        let level = lane.delay.level();
        if let Some(job) = lane.queue.get_mut(job_id) {
            tracing::debug!(
                job_id = %job_id,
                level,
                delay_secs = delay.as_secs(),
                "Report not ready"
            );
            job.check_report_ready(PollDelay::After(delay), false);
        }
    }

    fn on_service_limit_reached(&mut self, job_id: JobId, resource_type: ResourceType) {
        self.service_limit = true;

        let lane = self.lane_mut(resource_type);
        let is_head = lane.queue.is_head(job_id);
        let Some(job) = lane.queue.get_mut(job_id) else {
            return;
        };
        if !job.is_running() {
            // The job told its listener it is queued; it is submitted again
            // once the limit clears or it reaches the head.
            return;
        }
        if !is_head {
            job.notify_queued();
            return;
        }

        let delay = lane.delay.back_off();
        tracing::info!(
            job_id = %job_id,
            resource_type = %resource_type,
            level = lane.delay.level(),
            delay_secs = delay.as_secs(),
            "Service limit reached"
        );
        if let Some(job) = lane.queue.get_mut(job_id) {
            job.check_report_ready(PollDelay::After(delay), true);
        }
    }

    fn on_finished(&mut self, job_id: JobId, resource_type: ResourceType, outcome: JobOutcome) {
        let lane = self.lane_mut(resource_type);
        let was_head = lane.queue.is_head(job_id);
        let Some(job) = lane.queue.remove(job_id) else {
            tracing::error!(job_id = %job_id, "Finished job is not in its queue");
            return;
        };

        crate::audit::emit_job_finished(job_id, resource_type, outcome);
        tracing::info!(
            job_id = %job_id,
            resource_type = %resource_type,
            outcome = %outcome,
            "Job finished"
        );

        self.process_unsubmitted_jobs();
        if was_head {
            self.promote_head(resource_type);
        }
        drop(job);

        if self.lanes.iter().all(|lane| lane.queue.is_empty()) {
            self.reset_delay_levels();
        }
    }

    /// Submits queued jobs that have no submission in flight or armed.
    fn process_unsubmitted_jobs(&mut self) {
        if self.service_limit {
            tracing::debug!("Service limit reached, holding back submissions");
            return;
        }
        for lane in &mut self.lanes {
            for job in lane.queue.iter_mut() {
                if !job.is_running()
                    && !job.is_aborting()
                    && !job.is_submitting()
                    && !job.is_waiting_retry()
                {
                    job.submit();
                }
            }
        }
    }

    /// Activates the job now at the head of the queue.
    fn promote_head(&mut self, resource_type: ResourceType) {
        let lane = self.lane_mut(resource_type);
        let first_delay = lane.delay.default_delay();
        let Some(job) = lane.queue.front_mut() else {
            return;
        };
        if job.is_aborting() {
            return;
        }

        tracing::debug!(
            job_id = %job.id(),
            resource_type = %resource_type,
            state = job.state().name(),
            "Promoting job"
        );
        if job.is_running() {
            // A poll in flight is rescheduled by its reply, now at the head.
            if !job.is_polling() {
                job.check_report_ready(PollDelay::Now, false);
            }
        } else {
            job.retry_submission_every(first_delay);
            if !job.is_submitting() && !job.is_waiting_retry() {
                job.submit();
            }
        }
    }

    fn reset_delay_levels(&mut self) {
        for lane in &mut self.lanes {
            lane.delay = DelayLevel::new(&self.factory.config(lane.resource_type));
        }
        crate::audit::emit_delay_levels_reset(
            self.lane(ResourceType::File).delay.level(),
            self.lane(ResourceType::Url).delay.level(),
        );
    }

    /// Lowest level a not-ready poll may relax to.
    ///
    /// Polling at the fastest level is kept for when only one queue is busy.
    fn level_floor(&self, resource_type: ResourceType) -> usize {
        if self.lane(resource_type.other()).queue.is_empty() {
            0
        } else {
            1
        }
    }

    fn shutdown(&mut self) {
        let mut dropped = 0;
        for lane in &mut self.lanes {
            dropped += lane.queue.drain().count();
        }
        tracing::info!(dropped, "Scheduler shutting down");
    }

    fn lane(&self, resource_type: ResourceType) -> &Lane {
        &self.lanes[resource_type.index()]
    }

    fn lane_mut(&mut self, resource_type: ResourceType) -> &mut Lane {
        &mut self.lanes[resource_type.index()]
    }

    /// Returns the delay the next poll of the active job would wait.
    pub fn current_delay(&self, resource_type: ResourceType) -> Duration {
        self.lane(resource_type).delay.delay()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("connector", &self.factory.name())
            .field("lanes", &self.lanes)
            .field("service_limit", &self.service_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::{MockConnector, MockStep, Notification, RecordingListener};
    use crate::core::{JobState, SharedConnector};
    use std::io::Write;

    fn scheduler_with(connector: MockConnector, config: SchedulerConfig) -> (Scheduler, Arc<MockConnector>) {
        let connector = Arc::new(connector);
        let factory = Arc::new(SharedConnector::from_arc(connector.clone()));
        let scheduler = Scheduler::new(factory, config).expect("valid config");
        (scheduler, connector)
    }

    fn scheduler(connector: MockConnector) -> (Scheduler, Arc<MockConnector>) {
        scheduler_with(connector, SchedulerConfig::default())
    }

    async fn steps(scheduler: &mut Scheduler, n: usize) {
        for _ in 0..n {
            assert!(scheduler.step().await);
        }
    }

    fn waits(listener: &RecordingListener) -> Vec<u64> {
        listener
            .notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::WaitingForReport(d) if !d.is_zero() => Some(d.as_secs()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_job_submits_immediately() {
        let (mut scheduler, connector) =
            scheduler(MockConnector::new().with_script("f1", vec![MockStep::scan_id("s1")]));
        let listener = Arc::new(RecordingListener::new());

        let id = scheduler.enqueue_job(Resource::file("f1"), listener.clone(), true);
        assert!(id.is_valid());
        assert_eq!(connector.submit_count(), 1);
        assert_eq!(listener.count(&Notification::ScanningStarted), 1);

        let status = scheduler.status();
        let active = status.file.active().expect("active job");
        assert_eq!(active.id, id);
        assert_eq!(active.retry_submission_delay, Duration::from_secs(90));

        steps(&mut scheduler, 1).await;
        assert_eq!(scheduler.status().file.jobs[0].state, JobState::Running);
        assert_eq!(waits(&listener), vec![90]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_ready_relaxes_and_next_job_takes_over() {
        let (mut scheduler, connector) = scheduler(
            MockConnector::new()
                .with_script(
                    "f1",
                    vec![
                        MockStep::scan_id("s1"),
                        MockStep::NotReady,
                        MockStep::NotReady,
                        MockStep::NotReady,
                        MockStep::Ready,
                    ],
                )
                .with_script("f2", vec![MockStep::RateLimited, MockStep::scan_id("s2")]),
        );
        let first = Arc::new(RecordingListener::new());
        let second = Arc::new(RecordingListener::new());

        let f1 = scheduler.enqueue_job(Resource::file("f1"), first.clone(), true);
        let f2 = scheduler.enqueue_job(Resource::file("f2"), second.clone(), true);

        // Scan id for f1, throttled submission for f2.
        steps(&mut scheduler, 2).await;
        assert_eq!(second.count(&Notification::Queued), 1);
        let status = scheduler.status();
        assert_eq!(status.file.jobs[1].id, f2);
        assert_eq!(status.file.jobs[1].state, JobState::Created);
        assert_eq!(status.file.jobs[1].retry_submission_delay, Duration::ZERO);

        for expected in [3, 2, 1] {
            steps(&mut scheduler, 2).await;
            assert_eq!(scheduler.status().file.delay_level, expected);
        }
        assert_eq!(waits(&first), vec![90, 60, 45, 30]);

        steps(&mut scheduler, 2).await;
        assert_eq!(first.count(&Notification::ReportReady), 1);

        let status = scheduler.status();
        assert_eq!(status.file.jobs.len(), 1);
        let active = status.file.active().expect("promoted job");
        assert_eq!(active.id, f2);
        assert_eq!(active.state, JobState::Submitting);
        assert_eq!(active.retry_submission_delay, Duration::from_secs(90));
        assert_eq!(connector.submit_count_for("f2"), 2);
        assert!(!scheduler.abort(f1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_limit_backs_off() {
        let (mut scheduler, _) = scheduler(MockConnector::new().with_script(
            "f1",
            vec![
                MockStep::scan_id("s1"),
                MockStep::RateLimited,
                MockStep::NotReady,
            ],
        ));
        let listener = Arc::new(RecordingListener::new());
        scheduler.enqueue_job(Resource::file("f1"), listener.clone(), true);

        steps(&mut scheduler, 3).await;
        let status = scheduler.status();
        assert_eq!(status.file.delay_level, 5);
        assert!(status.service_limit);
        assert!(listener
            .notifications()
            .contains(&Notification::ServiceLimitReached(Duration::from_secs(150))));

        let start = tokio::time::Instant::now();
        steps(&mut scheduler, 2).await;
        assert_eq!(start.elapsed(), Duration::from_secs(150));
        let status = scheduler.status();
        assert!(!status.service_limit);
        assert_eq!(status.file.delay_level, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_other_queue_floors_level_at_one() {
        let (mut scheduler, _) = scheduler(
            MockConnector::new()
                .with_script(
                    "f1",
                    vec![
                        MockStep::scan_id("s1"),
                        MockStep::NotReady,
                        MockStep::NotReady,
                        MockStep::NotReady,
                        MockStep::NotReady,
                        MockStep::NotReady,
                    ],
                )
                .with_script("http://u1", vec![MockStep::scan_id("u1")]),
        );
        let file_listener = Arc::new(RecordingListener::new());
        let url_listener = Arc::new(RecordingListener::new());
        scheduler.enqueue_job(Resource::url("http://u1"), url_listener.clone(), true);
        scheduler.enqueue_job(Resource::file("f1"), file_listener.clone(), true);

        // Two scan ids, one url poll timer, five file polls.
        steps(&mut scheduler, 2 + 1 + 5 * 2).await;
        assert_eq!(waits(&file_listener), vec![90, 60, 45, 30, 30, 30]);
        assert_eq!(scheduler.status().file.delay_level, 1);
        assert_eq!(scheduler.status().url.delay_level, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lone_queue_relaxes_to_zero() {
        let mut steps_script = vec![MockStep::scan_id("s1")];
        steps_script.extend(std::iter::repeat(MockStep::NotReady).take(5));
        let (mut scheduler, _) = scheduler(MockConnector::new().with_script("f1", steps_script));
        let listener = Arc::new(RecordingListener::new());
        scheduler.enqueue_job(Resource::file("f1"), listener.clone(), true);

        steps(&mut scheduler, 1 + 5 * 2).await;
        assert_eq!(scheduler.status().file.delay_level, 0);
        assert_eq!(waits(&listener), vec![90, 60, 45, 30, 15, 15]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_levels_reset_when_queues_drain() {
        let (mut scheduler, _) = scheduler(MockConnector::new().with_script(
            "f1",
            vec![MockStep::scan_id("s1"), MockStep::RateLimited, MockStep::Ready],
        ));
        let listener = Arc::new(RecordingListener::new());
        scheduler.enqueue_job(Resource::file("f1"), listener.clone(), true);

        steps(&mut scheduler, 3).await;
        assert_eq!(scheduler.status().file.delay_level, 5);
        steps(&mut scheduler, 2).await;

        let status = scheduler.status();
        assert_eq!(status.job_count(), 0);
        assert_eq!(status.file.delay_level, 4);
        assert_eq!(scheduler.current_delay(ResourceType::File), Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_head_job_parks_until_promoted() {
        let (mut scheduler, connector) = scheduler(
            MockConnector::new()
                .with_script("f1", vec![MockStep::scan_id("s1")])
                .with_script(
                    "f2",
                    vec![MockStep::scan_id("s2"), MockStep::NotReady, MockStep::Ready],
                ),
        );
        let first = Arc::new(RecordingListener::new());
        let second = Arc::new(RecordingListener::new());
        let f1 = scheduler.enqueue_job(Resource::file("f1"), first.clone(), true);
        scheduler.enqueue_job(Resource::file("f2"), second.clone(), true);

        // Both scan ids, then the immediate poll of f2.
        steps(&mut scheduler, 3).await;
        assert_eq!(second.count(&Notification::Queued), 1);
        assert_eq!(connector.poll_count(), 1);
        assert_eq!(scheduler.status().file.delay_level, 4);

        assert!(scheduler.abort(f1));
        steps(&mut scheduler, 1).await;
        assert_eq!(first.count(&Notification::Aborted), 1);

        steps(&mut scheduler, 1).await;
        assert_eq!(second.count(&Notification::ReportReady), 1);
        assert_eq!(connector.poll_count(), 2);
        assert_eq!(scheduler.status().job_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_promoted_job_keeps_its_poll_in_flight() {
        let (mut scheduler, connector) = scheduler(
            MockConnector::new()
                .with_latency(Duration::from_secs(1))
                .with_script("f1", vec![MockStep::scan_id("s1")])
                .with_script(
                    "f2",
                    vec![MockStep::scan_id("s2"), MockStep::NotReady, MockStep::Ready],
                ),
        );
        let second = Arc::new(RecordingListener::new());
        let f1 = scheduler.enqueue_job(
            Resource::file("f1"),
            Arc::new(RecordingListener::new()),
            true,
        );
        let f2 = scheduler.enqueue_job(Resource::file("f2"), second.clone(), true);

        // Both scan ids; f2 polls at once and its reply is a second away.
        steps(&mut scheduler, 2).await;
        assert_eq!(scheduler.status().file.jobs[1].state, JobState::Polling);

        assert!(scheduler.abort(f1));
        assert_eq!(connector.aborts(), vec![("f1".to_string(), Some("s1".to_string()))]);
        steps(&mut scheduler, 1).await;
        let status = scheduler.status();
        assert_eq!(status.file.active().map(|job| job.id), Some(f2));
        assert_eq!(status.file.jobs[0].state, JobState::Polling);

        // The pending reply arrives with f2 at the head and is rescheduled.
        steps(&mut scheduler, 1).await;
        assert_eq!(connector.poll_count(), 1);
        assert_eq!(scheduler.status().file.delay_level, 3);
        assert_eq!(waits(&second), vec![60]);

        steps(&mut scheduler, 2).await;
        assert_eq!(second.count(&Notification::ReportReady), 1);
        assert_eq!(second.count(&Notification::RetrievingReport), 2);
        assert_eq!(connector.poll_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_limit_holds_back_unsubmitted_jobs() {
        let (mut scheduler, connector) = scheduler(
            MockConnector::new()
                .with_script("f1", vec![MockStep::scan_id("s1"), MockStep::Ready])
                .with_script("f2", vec![MockStep::RateLimited, MockStep::scan_id("s2")])
                .with_script("f3", vec![MockStep::RateLimited]),
        );
        let listener = Arc::new(RecordingListener::new());
        scheduler.enqueue_job(Resource::file("f1"), listener.clone(), true);
        steps(&mut scheduler, 1).await;

        let third = Arc::new(RecordingListener::new());
        let f2 = scheduler.enqueue_job(Resource::file("f2"), listener.clone(), true);
        let f3 = scheduler.enqueue_job(Resource::file("f3"), third.clone(), true);
        steps(&mut scheduler, 2).await;
        assert!(scheduler.status().service_limit);
        assert_eq!(third.count(&Notification::Queued), 1);

        // Poll timer, then the report of f1 while the limit is still set.
        steps(&mut scheduler, 2).await;
        let status = scheduler.status();
        assert!(status.service_limit);
        assert_eq!(status.file.active().map(|job| job.id), Some(f2));
        assert_eq!(connector.submit_count_for("f2"), 2);
        assert_eq!(connector.submit_count_for("f3"), 1);
        assert_eq!(status.file.jobs[1].id, f3);
        assert_eq!(status.file.jobs[1].state, JobState::Created);
    }

    #[tokio::test]
    async fn test_upload_progress_is_routed_to_listener() {
        let (mut scheduler, _) = scheduler(
            MockConnector::new()
                .with_upload_chunks(1)
                .with_script("f1", vec![MockStep::scan_id("s1")]),
        );
        let listener = Arc::new(RecordingListener::new());
        scheduler.enqueue_job(Resource::file("f1"), listener.clone(), true);

        steps(&mut scheduler, 2).await;
        assert_eq!(listener.count(&Notification::UploadProgress(1, 1)), 1);
        assert_eq!(scheduler.status().file.jobs[0].state, JobState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_is_idempotent() {
        // Unscripted submissions never answer.
        let (mut scheduler, connector) = scheduler(MockConnector::new());
        let listener = Arc::new(RecordingListener::new());
        let id = scheduler.enqueue_job(Resource::url("http://slow"), listener.clone(), false);

        assert!(scheduler.abort(id));
        assert!(scheduler.abort(id));
        assert!(scheduler.status().url.jobs[0].aborting);

        steps(&mut scheduler, 1).await;
        assert_eq!(listener.count(&Notification::Aborted), 1);
        assert_eq!(connector.abort_count(), 1);
        assert!(!scheduler.abort(id));
        assert!(!scheduler.abort(JobId::INVALID));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failures_remove_job() {
        let (mut scheduler, _) = scheduler(
            MockConnector::new()
                .with_script("f1", vec![MockStep::InvalidKey])
                .with_script("http://u1", vec![MockStep::Fail("connection refused".into())]),
        );
        let file_listener = Arc::new(RecordingListener::new());
        let url_listener = Arc::new(RecordingListener::new());
        scheduler.enqueue_job(Resource::file("f1"), file_listener.clone(), true);
        scheduler.enqueue_job(Resource::url("http://u1"), url_listener.clone(), true);

        steps(&mut scheduler, 2).await;
        assert_eq!(file_listener.count(&Notification::InvalidServiceKey), 1);
        assert!(url_listener
            .notifications()
            .iter()
            .any(|n| matches!(n, Notification::Error(message) if message.contains("connection refused"))));
        assert_eq!(scheduler.status().job_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_retries_are_bounded() {
        let (mut scheduler, connector) = scheduler_with(
            MockConnector::new().with_script(
                "f1",
                vec![MockStep::RateLimited, MockStep::RateLimited],
            ),
            SchedulerConfig::new().with_max_submission_retries(1),
        );
        let listener = Arc::new(RecordingListener::new());
        scheduler.enqueue_job(Resource::file("f1"), listener.clone(), true);

        let start = tokio::time::Instant::now();
        steps(&mut scheduler, 3).await;
        assert_eq!(start.elapsed(), Duration::from_secs(90));
        assert_eq!(connector.submit_count(), 2);
        assert!(matches!(
            listener.notifications().last(),
            Some(Notification::Error(_))
        ));
        assert_eq!(scheduler.status().job_count(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_validation() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"0123456789").expect("write");
        let path = file.path().to_string_lossy().into_owned();

        let limited = ConnectorConfig::from_secs(&[15, 30], 0)
            .with_service_key_required(true)
            .with_max_file_size(4);
        let connector = MockConnector::new().with_config(ResourceType::File, limited);

        let (mut keyless, _) = scheduler(connector.clone());
        let listener = Arc::new(RecordingListener::new());
        assert!(matches!(
            keyless.try_enqueue_job(Resource::file(path.clone()), listener.clone(), true),
            Err(SchedulerError::MissingServiceKey { .. })
        ));
        assert_eq!(
            keyless.enqueue_job(Resource::url(""), listener.clone(), true),
            JobId::INVALID
        );

        let (mut keyed, mock) =
            scheduler_with(connector, SchedulerConfig::new().with_service_key("secret"));
        assert!(matches!(
            keyed.try_enqueue_job(Resource::file(path), listener.clone(), true),
            Err(SchedulerError::FileTooLarge { size: 10, max: 4 })
        ));
        assert!(matches!(
            keyed.try_enqueue_job(Resource::file("/nonexistent/sample.bin"), listener.clone(), true),
            Err(SchedulerError::FileNotFound { .. })
        ));
        assert_eq!(mock.submit_count(), 0);
        assert_eq!(keyed.status().job_count(), 0);
    }

    #[test]
    fn test_invalid_connector_config_is_rejected() {
        let connector = MockConnector::new().with_config(
            ResourceType::Url,
            ConnectorConfig::from_secs(&[15], 3),
        );
        let factory = Arc::new(SharedConnector::new(connector));
        assert!(matches!(
            Scheduler::new(factory, SchedulerConfig::default()),
            Err(SchedulerError::Configuration { .. })
        ));
    }
}
