//! Adaptive delay levels.
//!
//! A [`DelayLevel`] is an index into a connector's delay table. A
//! not-ready poll moves it one step towards faster polling, a rate-limit
//! reply moves it one step towards slower polling.

use crate::core::ConnectorConfig;
use std::time::Duration;

/// Position in a connector's delay table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayLevel {
    levels: Vec<Duration>,
    default_level: usize,
    level: usize,
}

impl DelayLevel {
    /// Creates a level positioned at the configuration's default level.
    ///
    /// The configuration is expected to be validated; an out-of-range
    /// default is clamped to the slowest level.
    pub fn new(config: &ConnectorConfig) -> Self {
        let levels = if config.delay_levels.is_empty() {
            vec![Duration::from_secs(1)]
        } else {
            config.delay_levels.clone()
        };
        let default_level = config.default_level.min(levels.len() - 1);
        Self {
            levels,
            default_level,
            level: default_level,
        }
    }

    /// Returns the current level.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Returns the number of levels.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Returns the slowest level.
    pub fn max_level(&self) -> usize {
        self.levels.len() - 1
    }

    /// Returns the delay at the current level.
    pub fn delay(&self) -> Duration {
        self.levels[self.level]
    }

    /// Returns the delay at the default level.
    pub fn default_delay(&self) -> Duration {
        self.levels[self.default_level]
    }

    /// Moves one level faster, never below `floor`, and returns the new delay.
    ///
    /// A level already under `floor` is raised to it.
    pub fn relax(&mut self, floor: usize) -> Duration {
        let floor = floor.min(self.max_level());
        self.level = if self.level > floor {
            self.level - 1
        } else {
            floor
        };
        self.delay()
    }

    /// Moves one level slower, capped at the slowest level, and returns the new delay.
    pub fn back_off(&mut self) -> Duration {
        if self.level < self.max_level() {
            self.level += 1;
        }
        self.delay()
    }
}
