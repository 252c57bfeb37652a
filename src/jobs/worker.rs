use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use chrono::TimeDelta;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    db::ClaimedJob,
    reminders::ScheduleZone,
    utils::Clock,
};

use super::{JobError, RescheduleJob, RetryPolicy, SqliteJobQueue};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "studyguard::jobs";

use crate::{log_debug, log_error, log_info, log_warn};

const DONE_JOB_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            job_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Runs queued jobs until cancelled. Jobs left `running` by a previous
/// process are handed back to the queue first.
pub async fn job_loop<Tz: ScheduleZone>(
    queue: SqliteJobQueue,
    job: Arc<RescheduleJob<Tz>>,
    clock: Arc<dyn Clock>,
    config: JobWorkerConfig,
    cancel_token: CancellationToken,
) {
    match queue.db().reset_running_jobs().await {
        Ok(0) => {}
        Ok(count) => log_info!("requeued {count} interrupted job(s)"),
        Err(err) => log_error!("failed to requeue interrupted jobs: {err:#}"),
    }
    match queue
        .db()
        .prune_done_jobs(clock.now() - TimeDelta::days(DONE_JOB_RETENTION_DAYS))
        .await
    {
        Ok(0) => {}
        Ok(count) => log_debug!("pruned {count} finished job(s)"),
        Err(err) => log_warn!("failed to prune finished jobs: {err:#}"),
    }

    let wake = queue.wake_handle();
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("job worker shutting down");
                break;
            }
            _ = ticker.tick() => {}
            _ = wake.notified() => {}
        }

        if let Err(err) = queue.flush_unsaved().await {
            log_error!("{err:#}");
        }
        if let Err(err) = drain_due_jobs(&queue, &job, clock.as_ref(), &config, &cancel_token).await
        {
            log_error!("job worker pass failed: {err:#}");
        }
    }
}

/// Claims and runs due jobs one at a time until none are left.
async fn drain_due_jobs<Tz: ScheduleZone>(
    queue: &SqliteJobQueue,
    job: &RescheduleJob<Tz>,
    clock: &dyn Clock,
    config: &JobWorkerConfig,
    cancel_token: &CancellationToken,
) -> Result<usize> {
    let db = queue.db();
    let mut processed = 0;

    while !cancel_token.is_cancelled() {
        let Some(claimed) = db.claim_next_job(clock.now()).await? else {
            break;
        };
        processed += 1;

        let result = match tokio::time::timeout(config.job_timeout, job.run(claimed.kind)).await {
            Ok(result) => result,
            Err(_) => Err(JobError::Retryable(format!(
                "timed out after {}s",
                config.job_timeout.as_secs()
            ))),
        };

        if let Err(err) = settle(queue, &claimed, result, clock, &config.retry).await {
            // Otherwise it sits in `running` until the next process start.
            db.release_job(&claimed.id)
                .await
                .with_context(|| format!("job {} stuck after: {err:#}", claimed.id))?;
            return Err(err);
        }
    }

    Ok(processed)
}

async fn settle(
    queue: &SqliteJobQueue,
    claimed: &ClaimedJob,
    result: Result<super::JobOutcome, JobError>,
    clock: &dyn Clock,
    retry: &RetryPolicy,
) -> Result<()> {
    let db = queue.db();
    let now = clock.now();

    match result {
        Ok(outcome) => {
            log_debug!("job {} {:?} finished: {outcome:?}", claimed.id, claimed.kind);
            db.complete_job(&claimed.id, now).await
        }
        Err(JobError::Retryable(reason)) if !retry.exhausted(claimed.attempts) => {
            let delay = retry.jittered_delay(claimed.attempts, &mut rand::thread_rng());
            let delay = TimeDelta::from_std(delay).context("retry delay out of range")?;
            log_warn!(
                "job {} {:?} attempt {} failed, retrying in {}s: {reason}",
                claimed.id,
                claimed.kind,
                claimed.attempts,
                delay.num_seconds()
            );
            db.retry_job(&claimed.id, now + delay, &reason, now).await
        }
        Err(JobError::Retryable(reason)) | Err(JobError::Permanent(reason)) => {
            log_error!(
                "job {} {:?} dead-lettered after {} attempt(s): {reason}",
                claimed.id,
                claimed.kind,
                claimed.attempts
            );
            db.dead_letter_job(&claimed.id, &reason, now).await
        }
    }
}

/// Owns the background job loop task.
pub struct JobWorker {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl JobWorker {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn start<Tz: ScheduleZone>(
        &mut self,
        queue: SqliteJobQueue,
        job: Arc<RescheduleJob<Tz>>,
        clock: Arc<dyn Clock>,
        config: JobWorkerConfig,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("job worker already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(job_loop(queue, job, clock, config, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle.await.context("job worker task failed to join")
        } else {
            Ok(())
        }
    }
}

impl Default for JobWorker {
    fn default() -> Self {
        Self::new()
    }
}
