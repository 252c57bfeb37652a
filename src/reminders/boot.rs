use std::sync::Arc;

use anyhow::Result;
use sysinfo::System;
use tokio::task::JoinHandle;

use crate::{
    db::{Database, LAST_BOOT_TIME},
    jobs::{JobKind, JobQueue},
};

use super::scheduler::{ReminderScheduler, RescheduleSummary, ScheduleZone};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "studyguard::boot";

use crate::{log_error, log_info, log_warn};

/// Boot times reported by the OS drift by a second or two between reads.
const BOOT_TIME_TOLERANCE_SECS: u64 = 5;

/// Re-arms everything once after a restart, off the caller's task.
pub struct BootRecovery<Tz: ScheduleZone> {
    scheduler: Arc<ReminderScheduler<Tz>>,
    queue: Option<Arc<dyn JobQueue>>,
}

impl<Tz: ScheduleZone> BootRecovery<Tz> {
    /// With a queue, a transient failure is handed to it as a `RescheduleAll`
    /// job so recovery is retried under backoff.
    pub fn new(scheduler: Arc<ReminderScheduler<Tz>>, queue: Option<Arc<dyn JobQueue>>) -> Self {
        Self { scheduler, queue }
    }

    /// Spawns the full reschedule and returns at once. The handle resolves to
    /// the summary, or `None` when recovery failed.
    pub fn on_boot(&self) -> JoinHandle<Option<RescheduleSummary>> {
        let scheduler = self.scheduler.clone();
        let queue = self.queue.clone();

        tokio::spawn(async move {
            match scheduler.reschedule_all().await {
                Ok(summary) => {
                    log_info!(
                        "boot recovery armed {} reminders and {} focus guards",
                        summary.scheduled,
                        summary.guards
                    );
                    Some(summary)
                }
                Err(err) => {
                    log_error!("boot recovery failed: {err}");
                    if err.is_transient() {
                        if let Some(queue) = queue {
                            if let Err(enqueue_err) = queue.enqueue(JobKind::RescheduleAll) {
                                log_error!("failed to queue recovery retry: {enqueue_err:#}");
                            }
                        }
                    }
                    None
                }
            }
        })
    }
}

/// Seconds since the epoch at which the OS last booted.
pub fn current_boot_time() -> u64 {
    System::boot_time()
}

/// Compares the OS boot time with the one stored by the previous run and
/// records the current one. True on first run or after a reboot.
pub async fn detect_cold_boot(db: &Database, current_boot_secs: u64) -> Result<bool> {
    let previous = db.get_engine_state(LAST_BOOT_TIME).await?;
    let cold = match previous.as_deref().map(str::parse::<u64>) {
        Some(Ok(previous)) => previous.abs_diff(current_boot_secs) > BOOT_TIME_TOLERANCE_SECS,
        Some(Err(_)) => {
            log_warn!("stored boot time unreadable; treating as cold boot");
            true
        }
        None => true,
    };

    db.set_engine_state(LAST_BOOT_TIME, current_boot_secs.to_string())
        .await?;
    if cold {
        log_info!("cold boot detected (boot time {current_boot_secs})");
    }
    Ok(cold)
}
