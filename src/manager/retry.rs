//! Submission retry bookkeeping.

use std::time::Duration;

/// Paces and bounds resubmissions after rate-limit replies.
///
/// Only used while a job has no scan id yet. Once the service accepted the
/// submission, rate limits are handled by the scheduler's delay levels.
#[derive(Debug, Clone)]
pub struct SubmissionRetry {
    /// Wait before resubmitting; zero disables delayed retries.
    delay: Duration,

    /// Maximum number of silent resubmissions.
    max_attempts: u32,

    /// Resubmissions already armed.
    attempts: u32,
}

impl SubmissionRetry {
    /// Creates a disabled retry with the given attempt budget.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            delay: Duration::ZERO,
            max_attempts,
            attempts: 0,
        }
    }

    /// Sets the resubmission delay.
    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// Returns the resubmission delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns `true` if a delayed resubmission is configured.
    pub fn is_enabled(&self) -> bool {
        !self.delay.is_zero()
    }

    /// Returns the number of resubmissions armed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns whether another attempt should be made.
    pub fn should_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Records one armed resubmission.
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Forgets previous attempts.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_by_default() {
        let retry = SubmissionRetry::new(3);
        assert!(!retry.is_enabled());
        assert_eq!(retry.delay(), Duration::ZERO);
    }

    #[test]
    fn test_budget() {
        let mut retry = SubmissionRetry::new(2);
        retry.set_delay(Duration::from_secs(90));
        assert!(retry.is_enabled());

        assert!(retry.should_retry());
        retry.record_attempt();
        assert!(retry.should_retry());
        retry.record_attempt();
        assert!(!retry.should_retry());

        retry.reset();
        assert!(retry.should_retry());
        assert_eq!(retry.attempts(), 0);
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let retry = SubmissionRetry::new(0);
        assert!(!retry.should_retry());
    }
}
