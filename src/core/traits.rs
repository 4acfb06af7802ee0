//! Core traits for the scanpoll library.
//!
//! This module defines the [`Connector`] trait that scanning backends
//! implement, the [`ConnectorFactory`] the scheduler uses to give each job
//! its own connector, and the [`JobListener`] that receives user-facing
//! notifications.

use crate::core::config::ConnectorConfig;
use crate::core::error::ConnectorError;
use crate::core::report::Report;
use crate::core::types::{PollReply, Resource, ResourceType};

use async_trait::async_trait;
use secrecy::SecretString;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// A protocol adapter for one scanning service.
///
/// Each call performs a single request/response exchange. Connectors never
/// retry or wait on their own; pacing is the scheduler's job.
///
/// # Implementation Notes
///
/// - Implementations must be `Send + Sync`; calls run on spawned tasks.
/// - A rate-limit reply must be reported as [`ConnectorError::RateLimited`]
///   so the scheduler can back off instead of failing the job.
/// - Cancellation drops the in-flight future; [`Connector::abort`] is only
///   a hook for releasing transport resources.
/// - One connector may serve many jobs at once (see [`SharedConnector`]),
///   so `abort` must only release what belongs to the named job.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use scanpoll::core::{
///     Connector, ConnectorConfig, ConnectorError, PollReply, Resource, ResourceType, UploadProgress,
/// };
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct MyConnector;
///
/// #[async_trait]
/// impl Connector for MyConnector {
///     fn name(&self) -> &str {
///         "my-service"
///     }
///
///     fn config(&self, _resource_type: ResourceType) -> ConnectorConfig {
///         ConnectorConfig::web()
///     }
///
///     async fn submit(
///         &self,
///         resource: &Resource,
///         reuse_last_report: bool,
///         progress: &UploadProgress,
///     ) -> Result<String, ConnectorError> {
///         todo!()
///     }
///
///     async fn retrieve_report(&self, resource: &Resource, scan_id: &str) -> Result<PollReply, ConnectorError> {
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    /// Returns the name of this connector.
    fn name(&self) -> &str;

    /// Returns the delay table and limits for the given resource type.
    fn config(&self, resource_type: ResourceType) -> ConnectorConfig;

    /// Submits a resource and returns the scan id assigned by the service.
    ///
    /// When `reuse_last_report` is set, the connector may answer with the
    /// id of an existing analysis instead of uploading again. Connectors
    /// that stream an upload report how far it got through `progress`.
    async fn submit(
        &self,
        resource: &Resource,
        reuse_last_report: bool,
        progress: &UploadProgress,
    ) -> Result<String, ConnectorError>;

    /// Asks whether the report for `scan_id` is ready.
    async fn retrieve_report(
        &self,
        resource: &Resource,
        scan_id: &str,
    ) -> Result<PollReply, ConnectorError>;

    /// Releases transport resources held for one job's current request.
    ///
    /// `scan_id` is set once the service accepted the submission. Requests
    /// of other jobs going through the same connector must not be touched.
    fn abort(&self, resource: &Resource, scan_id: Option<&str>) {
        let _ = (resource, scan_id);
    }
}

/// Callback a connector uses to report upload progress of a submission.
///
/// Reports are forwarded to the job's listener as
/// [`JobListener::upload_progress`]. Cloning shares the callback.
#[derive(Clone)]
pub struct UploadProgress {
    report: Arc<dyn Fn(u64, u64) + Send + Sync>,
}

impl UploadProgress {
    /// Creates a progress reporter around `report(sent, total)`.
    pub fn new(report: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        Self {
            report: Arc::new(report),
        }
    }

    /// A reporter that discards everything.
    pub fn discard() -> Self {
        Self::new(|_, _| {})
    }

    /// Reports that `sent` of `total` bytes reached the service.
    pub fn report(&self, sent: u64, total: u64) {
        (self.report)(sent, total);
    }
}

impl Debug for UploadProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UploadProgress")
    }
}

/// An arc-wrapped connector for shared ownership.
pub type ArcConnector = Arc<dyn Connector>;

/// Builds the connector each job talks through.
pub trait ConnectorFactory: Send + Sync + Debug {
    /// Returns the name of the connectors this factory builds.
    fn name(&self) -> &str;

    /// Creates the connector for a new job.
    fn create(&self, service_key: Option<&SecretString>) -> ArcConnector;

    /// Returns the configuration for the given resource type.
    fn config(&self, resource_type: ResourceType) -> ConnectorConfig;
}

/// A factory that hands every job the same connector.
///
/// This is the usual setup: one transport handle reused by all jobs.
#[derive(Debug, Clone)]
pub struct SharedConnector {
    connector: ArcConnector,
}

impl SharedConnector {
    /// Wraps a connector.
    pub fn new<C: Connector + 'static>(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }

    /// Wraps a connector that is already shared.
    pub fn from_arc(connector: ArcConnector) -> Self {
        Self { connector }
    }
}

impl ConnectorFactory for SharedConnector {
    fn name(&self) -> &str {
        self.connector.name()
    }

    fn create(&self, _service_key: Option<&SecretString>) -> ArcConnector {
        Arc::clone(&self.connector)
    }

    fn config(&self, resource_type: ResourceType) -> ConnectorConfig {
        self.connector.config(resource_type)
    }
}

/// Receives user-facing notifications for one job.
///
/// Notifications are fire-and-forget and are delivered on the scheduler's
/// event loop, so implementations should return quickly.
pub trait JobListener: Send + Sync {
    /// The job waits behind the active job of its type.
    fn queued(&self);

    /// A submission request is about to be sent.
    fn scanning_started(&self);

    /// A report poll request is about to be sent.
    fn retrieving_report(&self) {}

    /// `sent` of `total` bytes of the submission were uploaded.
    fn upload_progress(&self, sent: u64, total: u64) {
        let _ = (sent, total);
    }

    /// The next report poll happens after `delay`.
    fn waiting_for_report(&self, delay: Duration);

    /// The service throttled the caller; the next attempt happens after `delay`.
    fn service_limit_reached(&self, delay: Duration);

    /// The report is available. Terminal.
    fn report_ready(&self, report: &Report);

    /// The job was aborted. Terminal.
    fn aborted(&self);

    /// The service rejected the key. Terminal.
    fn invalid_service_key(&self) {
        self.error_occurred("invalid service key");
    }

    /// The job failed. Terminal.
    fn error_occurred(&self, message: &str);
}

/// An arc-wrapped listener for shared ownership.
pub type ArcListener = Arc<dyn JobListener>;
