//! Durable background work: re-arming alarms after they fire and full
//! reschedules requested by settings changes or recovery.

mod queue;
mod reschedule;
mod worker;

use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use crate::error::ScheduleError;

pub use crate::db::JobKind;
pub use queue::SqliteJobQueue;
pub use reschedule::{JobOutcome, RescheduleJob, SkipReason};
pub use worker::{job_loop, JobWorker, JobWorkerConfig};

/// Accepts work for eventual, at-least-once execution. `enqueue` does not
/// block on I/O, so it can be called from alarm callbacks.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, kind: JobKind) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub enum JobError {
    /// Try again later under the queue's backoff.
    #[error("{0}")]
    Retryable(String),
    /// Retrying cannot help; the job is dead-lettered.
    #[error("{0}")]
    Permanent(String),
}

impl From<ScheduleError> for JobError {
    fn from(err: ScheduleError) -> Self {
        if err.is_transient() {
            JobError::Retryable(err.to_string())
        } else {
            JobError::Permanent(err.to_string())
        }
    }
}

/// Exponential backoff with proportional jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
    /// Fraction of the delay added or removed at random, 0.0 to 1.0.
    pub jitter: f64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            multiplier: 2,
            max_delay: Duration::from_secs(60 * 60),
            jitter: 0.2,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn jittered_delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let delay = self.delay_for(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return delay;
        }
        let factor = 1.0 + rng.gen_range(-jitter..=jitter);
        delay.mul_f64(factor)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}
