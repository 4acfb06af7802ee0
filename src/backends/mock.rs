//! Mock connector and listener for testing.
//!
//! This module provides a scripted connector that can be used in tests to
//! simulate a scanning service without a network, and a listener that
//! records every notification it receives.

use crate::core::{
    Connector, ConnectorConfig, ConnectorError, FileReport, JobListener, PollReply, Report,
    ReportSummary, Resource, ResourceType, UploadProgress, UrlReport,
};

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// One scripted reply of a [`MockConnector`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockStep {
    /// Submission accepted with this scan id.
    ScanId(String),
    /// Poll answered without a report.
    NotReady,
    /// Poll answered with a clean report for the resource.
    Ready,
    /// Poll answered with the given report.
    Report(Report),
    /// The service's rate limit.
    RateLimited,
    /// The service key was rejected.
    InvalidKey,
    /// Transport failure with this message.
    Fail(String),
}

impl MockStep {
    /// Shorthand for [`MockStep::ScanId`].
    pub fn scan_id(id: impl Into<String>) -> Self {
        Self::ScanId(id.into())
    }
}

#[derive(Debug, Default)]
struct MockState {
    scripts: RwLock<HashMap<String, VecDeque<MockStep>>>,
    submits: RwLock<HashMap<String, u64>>,
    submit_count: AtomicU64,
    poll_count: AtomicU64,
    abort_count: AtomicU64,
    aborts: RwLock<Vec<(String, Option<String>)>>,
}

/// A mock connector for testing purposes.
///
/// Replies are scripted per resource name and consumed in order by both
/// submissions and polls. A call with no scripted reply left never
/// completes, which keeps a job in flight until it is aborted.
///
/// Clones share their scripts and counters.
///
/// # Examples
///
/// ```rust
/// use scanpoll::backends::mock::{MockConnector, MockStep};
/// use std::time::Duration;
///
/// let connector = MockConnector::new()
///     .with_script(
///         "http://example.com",
///         vec![MockStep::scan_id("scan-1"), MockStep::NotReady, MockStep::Ready],
///     )
///     .with_latency(Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct MockConnector {
    /// Name of this connector instance.
    name: String,
    /// Configuration per resource type, indexed like the scheduler's queues.
    configs: [ConnectorConfig; 2],
    /// Simulated latency for every call.
    latency: Option<Duration>,
    /// Progress reports per accepted file upload.
    upload_chunks: u64,
    state: Arc<MockState>,
}

impl MockConnector {
    /// Creates a mock connector with an unrestricted copy of the API delay tables.
    pub fn new() -> Self {
        let unrestricted = |config: ConnectorConfig| ConnectorConfig {
            service_key_required: false,
            max_file_size: None,
            ..config
        };
        Self {
            name: "mock".to_string(),
            configs: [
                unrestricted(ConnectorConfig::api_file()),
                unrestricted(ConnectorConfig::api_url()),
            ],
            latency: None,
            upload_chunks: 0,
            state: Arc::new(MockState::default()),
        }
    }

    /// Sets the name of this connector.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the configuration for one resource type.
    pub fn with_config(mut self, resource_type: ResourceType, config: ConnectorConfig) -> Self {
        self.configs[resource_type.index()] = config;
        self
    }

    /// Sets the simulated latency for every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reports upload progress in `chunks` equal steps for every accepted
    /// file submission.
    pub fn with_upload_chunks(mut self, chunks: u64) -> Self {
        self.upload_chunks = chunks;
        self
    }

    /// Appends scripted replies for a resource name.
    pub fn with_script(self, name: impl Into<String>, steps: Vec<MockStep>) -> Self {
        self.add_script(name, steps);
        self
    }

    /// Appends scripted replies for a resource name (shared version).
    pub fn add_script(&self, name: impl Into<String>, steps: Vec<MockStep>) {
        self.state
            .scripts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(name.into())
            .or_default()
            .extend(steps);
    }

    /// Returns the number of submissions across all resources.
    pub fn submit_count(&self) -> u64 {
        self.state.submit_count.load(Ordering::Relaxed)
    }

    /// Returns the number of submissions of one resource.
    pub fn submit_count_for(&self, name: &str) -> u64 {
        self.state
            .submits
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Returns the number of report polls.
    pub fn poll_count(&self) -> u64 {
        self.state.poll_count.load(Ordering::Relaxed)
    }

    /// Returns the number of transport aborts.
    pub fn abort_count(&self) -> u64 {
        self.state.abort_count.load(Ordering::Relaxed)
    }

    /// Returns the resource name and scan id of every abort, in order.
    pub fn aborts(&self) -> Vec<(String, Option<String>)> {
        self.state
            .aborts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn next_step(&self, name: &str) -> Option<MockStep> {
        self.state
            .scripts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_mut(name)
            .and_then(VecDeque::pop_front)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn error_for(&self, step: MockStep, call: &str) -> ConnectorError {
        match step {
            MockStep::RateLimited => ConnectorError::rate_limited(&self.name),
            MockStep::InvalidKey => ConnectorError::invalid_service_key(&self.name),
            MockStep::Fail(message) => ConnectorError::transport(&self.name, message),
            other => ConnectorError::malformed(
                &self.name,
                format!("{other:?} is not a reply to {call}"),
            ),
        }
    }

    fn clean_report(resource: &Resource) -> Report {
        let summary = ReportSummary::new()
            .with_permanent_link(format!("https://scan.invalid/report/{}", resource.name))
            .with_scan_date(chrono::Utc::now());
        match resource.resource_type {
            ResourceType::File => Report::File(FileReport {
                summary,
                ..FileReport::default()
            }),
            ResourceType::Url => Report::Url(UrlReport {
                summary,
                url: resource.name.clone(),
                ..UrlReport::default()
            }),
        }
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self, resource_type: ResourceType) -> ConnectorConfig {
        self.configs[resource_type.index()].clone()
    }

    async fn submit(
        &self,
        resource: &Resource,
        _reuse_last_report: bool,
        progress: &UploadProgress,
    ) -> Result<String, ConnectorError> {
        self.state.submit_count.fetch_add(1, Ordering::Relaxed);
        *self
            .state
            .submits
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(resource.name.clone())
            .or_default() += 1;

        let Some(step) = self.next_step(&resource.name) else {
            return std::future::pending().await;
        };
        self.simulate_latency().await;
        match step {
            MockStep::ScanId(scan_id) => {
                if resource.resource_type == ResourceType::File {
                    for chunk in 1..=self.upload_chunks {
                        progress.report(chunk, self.upload_chunks);
                    }
                }
                Ok(scan_id)
            }
            other => Err(self.error_for(other, "a submission")),
        }
    }

    async fn retrieve_report(
        &self,
        resource: &Resource,
        _scan_id: &str,
    ) -> Result<PollReply, ConnectorError> {
        self.state.poll_count.fetch_add(1, Ordering::Relaxed);

        let Some(step) = self.next_step(&resource.name) else {
            return std::future::pending().await;
        };
        self.simulate_latency().await;
        match step {
            MockStep::NotReady => Ok(PollReply::NotReady),
            MockStep::Ready => Ok(PollReply::Ready(Self::clean_report(resource))),
            MockStep::Report(report) => Ok(PollReply::Ready(report)),
            other => Err(self.error_for(other, "a poll")),
        }
    }

    fn abort(&self, resource: &Resource, scan_id: Option<&str>) {
        self.state.abort_count.fetch_add(1, Ordering::Relaxed);
        self.state
            .aborts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((resource.name.clone(), scan_id.map(str::to_string)));
    }
}

/// A notification received by a [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// `queued`
    Queued,
    /// `scanning_started`
    ScanningStarted,
    /// `retrieving_report`
    RetrievingReport,
    /// `upload_progress` with bytes sent and total.
    UploadProgress(u64, u64),
    /// `waiting_for_report` with its countdown.
    WaitingForReport(Duration),
    /// `service_limit_reached` with its countdown.
    ServiceLimitReached(Duration),
    /// `report_ready`
    ReportReady,
    /// `aborted`
    Aborted,
    /// `invalid_service_key`
    InvalidServiceKey,
    /// `error_occurred` with its message.
    Error(String),
}

/// A listener that records every notification, in order.
#[derive(Debug, Default)]
pub struct RecordingListener {
    notifications: Mutex<Vec<Notification>>,
    reports: Mutex<Vec<Report>>,
}

impl RecordingListener {
    /// Creates an empty listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the notifications received so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns how many times `notification` was received.
    pub fn count(&self, notification: &Notification) -> usize {
        self.notifications
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|n| *n == notification)
            .count()
    }

    /// Returns the reports received so far.
    pub fn reports(&self) -> Vec<Report> {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns `true` once a terminal notification was received.
    pub fn is_finished(&self) -> bool {
        self.notifications
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .any(|n| {
                matches!(
                    n,
                    Notification::ReportReady
                        | Notification::Aborted
                        | Notification::InvalidServiceKey
                        | Notification::Error(_)
                )
            })
    }

    fn record(&self, notification: Notification) {
        self.notifications
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification);
    }
}

impl JobListener for RecordingListener {
    fn queued(&self) {
        self.record(Notification::Queued);
    }

    fn scanning_started(&self) {
        self.record(Notification::ScanningStarted);
    }

    fn retrieving_report(&self) {
        self.record(Notification::RetrievingReport);
    }

    fn upload_progress(&self, sent: u64, total: u64) {
        self.record(Notification::UploadProgress(sent, total));
    }

    fn waiting_for_report(&self, delay: Duration) {
        self.record(Notification::WaitingForReport(delay));
    }

    fn service_limit_reached(&self, delay: Duration) {
        self.record(Notification::ServiceLimitReached(delay));
    }

    fn report_ready(&self, report: &Report) {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(report.clone());
        self.record(Notification::ReportReady);
    }

    fn aborted(&self) {
        self.record(Notification::Aborted);
    }

    fn invalid_service_key(&self) {
        self.record(Notification::InvalidServiceKey);
    }

    fn error_occurred(&self, message: &str) {
        self.record(Notification::Error(message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_is_consumed_in_order() {
        let connector = MockConnector::new().with_script(
            "http://example.com",
            vec![MockStep::scan_id("s1"), MockStep::NotReady, MockStep::Ready],
        );
        let resource = Resource::url("http://example.com");

        let progress = UploadProgress::discard();
        assert_eq!(connector.submit(&resource, true, &progress).await.unwrap(), "s1");
        assert_eq!(
            connector.retrieve_report(&resource, "s1").await.unwrap(),
            PollReply::NotReady
        );
        match connector.retrieve_report(&resource, "s1").await.unwrap() {
            PollReply::Ready(report) => {
                assert_eq!(report.report_type(), ResourceType::Url);
                assert!(!report.is_infected());
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        assert_eq!(connector.submit_count_for("http://example.com"), 1);
        assert_eq!(connector.poll_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_steps_map_to_errors() {
        let connector = MockConnector::new().with_script(
            "/tmp/a.bin",
            vec![
                MockStep::RateLimited,
                MockStep::InvalidKey,
                MockStep::Fail("reset".into()),
                MockStep::NotReady,
            ],
        );
        let resource = Resource::file("/tmp/a.bin");

        let progress = UploadProgress::discard();
        assert!(connector
            .submit(&resource, false, &progress)
            .await
            .unwrap_err()
            .is_rate_limit());
        assert!(matches!(
            connector.submit(&resource, false, &progress).await,
            Err(ConnectorError::InvalidServiceKey { .. })
        ));
        assert!(matches!(
            connector.submit(&resource, false, &progress).await,
            Err(ConnectorError::Transport { .. })
        ));
        assert!(matches!(
            connector.submit(&resource, false, &progress).await,
            Err(ConnectorError::MalformedReply { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unscripted_call_never_completes() {
        let connector = MockConnector::new();
        let resource = Resource::url("http://example.com");
        let progress = UploadProgress::discard();
        let submission = connector.submit(&resource, true, &progress);
        let result = tokio::time::timeout(Duration::from_secs(3600), submission).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_clones_share_counters() {
        let connector = MockConnector::new();
        let clone = connector.clone();
        clone.abort(&Resource::url("http://example.com"), None);
        assert_eq!(connector.abort_count(), 1);
        assert!(!connector.config(ResourceType::File).service_key_required);
        assert_eq!(connector.config(ResourceType::Url).default_level, 2);
    }

    #[tokio::test]
    async fn test_upload_progress_for_files_only() {
        let connector = MockConnector::new()
            .with_upload_chunks(2)
            .with_script("/tmp/a.bin", vec![MockStep::scan_id("s1")])
            .with_script("http://example.com", vec![MockStep::scan_id("s2")]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = UploadProgress::new(move |sent, total| {
            sink.lock().expect("lock").push((sent, total));
        });

        connector
            .submit(&Resource::file("/tmp/a.bin"), false, &progress)
            .await
            .unwrap();
        connector
            .submit(&Resource::url("http://example.com"), false, &progress)
            .await
            .unwrap();
        assert_eq!(*seen.lock().expect("lock"), vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn test_recording_listener() {
        let listener = RecordingListener::new();
        listener.scanning_started();
        listener.waiting_for_report(Duration::from_secs(15));
        assert!(!listener.is_finished());

        listener.error_occurred("boom");
        assert!(listener.is_finished());
        assert_eq!(listener.count(&Notification::ScanningStarted), 1);
        assert_eq!(
            listener.notifications().last(),
            Some(&Notification::Error("boom".into()))
        );
    }
}
