//! Job scheduling with adaptive polling.
//!
//! The [`Scheduler`] keeps one FIFO queue per resource type, submits jobs
//! as they arrive and polls the active job of each queue with a delay
//! that adapts to how fast the service answers.

mod delay;
mod handle;
mod job;
mod message;
mod queue;
mod retry;
mod scheduler;

pub use delay::DelayLevel;
pub use handle::SchedulerHandle;
pub use queue::{JobSnapshot, LaneStatus, SchedulerStatus};
pub use retry::SubmissionRetry;
pub use scheduler::{Scheduler, SchedulerConfig};
