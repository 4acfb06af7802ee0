//! Connector events.
//!
//! Every round trip with the service ends in exactly one [`ConnectorEvent`].
//! The event travels back to the scheduler's event loop, which hands it to
//! the job that issued the request.

use crate::core::error::ConnectorError;
use crate::core::report::Report;
use crate::core::types::PollReply;

/// The outcome of one connector round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorEvent {
    /// The service accepted the submission and assigned a scan id.
    ScanIdReady(String),
    /// The analysis is still running.
    ReportNotReady,
    /// The report is available.
    ReportReady(Report),
    /// The service throttled the caller.
    ServiceLimitReached,
    /// The configured service key was rejected.
    InvalidServiceKey,
    /// The request was aborted.
    Aborted,
    /// Any other failure, with a user-facing message.
    Error(String),
}

impl ConnectorEvent {
    /// Returns `true` if handling this event ends the job.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ReportReady(_) | Self::InvalidServiceKey | Self::Aborted | Self::Error(_)
        )
    }

    /// Returns the name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ScanIdReady(_) => "scan_id_ready",
            Self::ReportNotReady => "report_not_ready",
            Self::ReportReady(_) => "report_ready",
            Self::ServiceLimitReached => "service_limit_reached",
            Self::InvalidServiceKey => "invalid_service_key",
            Self::Aborted => "aborted",
            Self::Error(_) => "error",
        }
    }
}

impl From<ConnectorError> for ConnectorEvent {
    fn from(error: ConnectorError) -> Self {
        match error {
            ConnectorError::RateLimited { .. } => Self::ServiceLimitReached,
            ConnectorError::InvalidServiceKey { .. } => Self::InvalidServiceKey,
            ConnectorError::Aborted => Self::Aborted,
            other => Self::Error(other.to_string()),
        }
    }
}

impl From<Result<String, ConnectorError>> for ConnectorEvent {
    fn from(result: Result<String, ConnectorError>) -> Self {
        match result {
            Ok(scan_id) => Self::ScanIdReady(scan_id),
            Err(error) => error.into(),
        }
    }
}

impl From<Result<PollReply, ConnectorError>> for ConnectorEvent {
    fn from(result: Result<PollReply, ConnectorError>) -> Self {
        match result {
            Ok(PollReply::NotReady) => Self::ReportNotReady,
            Ok(PollReply::Ready(report)) => Self::ReportReady(report),
            Err(error) => error.into(),
        }
    }
}
