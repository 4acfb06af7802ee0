//! Connector configuration.
//!
//! Each connector publishes one [`ConnectorConfig`] per resource type. The
//! scheduler reads the delay table from it to pace polls and resubmissions.

use crate::core::error::SchedulerError;
use std::time::Duration;

/// Delay table shared by the API connector presets, in seconds.
const API_DELAY_LEVELS: [u64; 7] = [15, 30, 45, 60, 90, 150, 300];

/// Upload limit of the API connector.
const API_MAX_FILE_SIZE: u64 = 20 * 1000 * 1000;

/// Per-resource-type configuration published by a connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Wait durations indexed by delay level, fastest first.
    pub delay_levels: Vec<Duration>,

    /// Level used for first submissions and restored when the scheduler idles.
    pub default_level: usize,

    /// Whether submissions need a service key.
    pub service_key_required: bool,

    /// Largest file the service accepts, if limited.
    pub max_file_size: Option<u64>,
}

impl ConnectorConfig {
    /// Creates a configuration from a delay table and default level.
    pub fn new(delay_levels: Vec<Duration>, default_level: usize) -> Self {
        Self {
            delay_levels,
            default_level,
            service_key_required: false,
            max_file_size: None,
        }
    }

    /// Creates a configuration from a delay table in whole seconds.
    pub fn from_secs(delay_levels: &[u64], default_level: usize) -> Self {
        Self::new(
            delay_levels.iter().copied().map(Duration::from_secs).collect(),
            default_level,
        )
    }

    /// File settings of the keyed API connector.
    pub fn api_file() -> Self {
        Self::from_secs(&API_DELAY_LEVELS, 4)
            .with_service_key_required(true)
            .with_max_file_size(API_MAX_FILE_SIZE)
    }

    /// URL settings of the keyed API connector.
    pub fn api_url() -> Self {
        Self::from_secs(&API_DELAY_LEVELS, 2)
            .with_service_key_required(true)
            .with_max_file_size(API_MAX_FILE_SIZE)
    }

    /// Settings of the public web form connector (both resource types).
    pub fn web() -> Self {
        Self::from_secs(&[5], 0)
    }

    /// Sets whether a service key is required.
    pub fn with_service_key_required(mut self, required: bool) -> Self {
        self.service_key_required = required;
        self
    }

    /// Sets the maximum file size.
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = Some(size);
        self
    }

    /// Returns the number of delay levels.
    pub fn num_levels(&self) -> usize {
        self.delay_levels.len()
    }

    /// Returns the delay at `default_level`.
    pub fn default_delay(&self) -> Duration {
        self.delay_levels
            .get(self.default_level)
            .copied()
            .unwrap_or_default()
    }

    /// Checks that the delay table is usable.
    ///
    /// The table must be non-empty, every delay must be positive and the
    /// default level must index into the table.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.delay_levels.is_empty() {
            return Err(SchedulerError::configuration("delay table is empty"));
        }
        if self.delay_levels.iter().any(Duration::is_zero) {
            return Err(SchedulerError::configuration(
                "delay levels must be positive",
            ));
        }
        if self.default_level >= self.delay_levels.len() {
            return Err(SchedulerError::configuration(format!(
                "default level {} out of range for {} levels",
                self.default_level,
                self.delay_levels.len()
            )));
        }
        Ok(())
    }
}
