use std::sync::Arc;

use chrono::Local;

use crate::{
    error::ScheduleError,
    reminders::{AlarmKey, ReminderScheduler, ScheduleZone},
};

use super::{JobError, JobKind};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "studyguard::jobs";

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Deleted,
    Disabled,
    NotActiveTimetable,
    TimetableMissing,
    /// Guard no longer wanted (not a study block, or focus guard off).
    NotGuarded,
    InvalidData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Number of alarms armed.
    Rearmed(usize),
    Skipped(SkipReason),
}

/// Re-fetches the current state of the world and re-arms accordingly.
/// Running it any number of times for the same input converges on the same
/// registered alarms.
pub struct RescheduleJob<Tz: ScheduleZone = Local> {
    scheduler: Arc<ReminderScheduler<Tz>>,
}

impl<Tz: ScheduleZone> RescheduleJob<Tz> {
    pub fn new(scheduler: Arc<ReminderScheduler<Tz>>) -> Self {
        Self { scheduler }
    }

    pub async fn run(&self, kind: JobKind) -> Result<JobOutcome, JobError> {
        match kind {
            JobKind::RescheduleAll => {
                let summary = self.scheduler.reschedule_all().await?;
                Ok(JobOutcome::Rearmed(summary.scheduled + summary.guards))
            }
            JobKind::Reschedule(key) => self.rearm(key).await,
        }
    }

    async fn rearm(&self, key: AlarmKey) -> Result<JobOutcome, JobError> {
        let activity_id = key.activity_id();
        let source = self.scheduler.source();

        let Some(activity) = source
            .get_activity(activity_id)
            .await
            .map_err(|err| JobError::Retryable(format!("{err:#}")))?
        else {
            log_debug!("activity {activity_id} was deleted; {key} not re-armed");
            return Ok(JobOutcome::Skipped(SkipReason::Deleted));
        };

        if !activity.notify_enabled {
            log_debug!("activity {activity_id} disabled; {key} not re-armed");
            return Ok(JobOutcome::Skipped(SkipReason::Disabled));
        }

        if !self.scheduler.is_active_timetable(activity.timetable_id) {
            log_debug!(
                "timetable {} is not active; {key} not re-armed",
                activity.timetable_id
            );
            return Ok(JobOutcome::Skipped(SkipReason::NotActiveTimetable));
        }

        let Some(timetable) = source
            .get_timetable(activity.timetable_id)
            .await
            .map_err(|err| JobError::Retryable(format!("{err:#}")))?
        else {
            return Ok(JobOutcome::Skipped(SkipReason::TimetableMissing));
        };

        let options = self.scheduler.options();
        let armed = match key {
            AlarmKey::Reminder(_) => {
                self.scheduler
                    .arm_reminder(&activity, Some(&timetable.name), options)
            }
            AlarmKey::FocusGuard(_) => self.scheduler.arm_guard(&activity, options),
        };

        match armed {
            Ok(Some(armed)) => {
                log_info!("{key} re-armed for {}", armed.at);
                Ok(JobOutcome::Rearmed(1))
            }
            Ok(None) => Ok(JobOutcome::Skipped(SkipReason::NotGuarded)),
            Err(err @ ScheduleError::InvalidBounds { .. })
            | Err(err @ ScheduleError::InvalidDay(_))
            | Err(err @ ScheduleError::InvalidMinute(_)) => {
                log_warn!("not re-arming {key}: {err}");
                Ok(JobOutcome::Skipped(SkipReason::InvalidData))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::{
        db::ActivityKind,
        reminders::AlarmRegistry,
        test_utils::{activity, utc, FakeAlarms, FakeSettings, FakeSource, FixedClock},
    };

    struct Harness {
        alarms: Arc<FakeAlarms>,
        source: Arc<FakeSource>,
        settings: Arc<FakeSettings>,
        job: RescheduleJob<Utc>,
    }

    fn harness() -> Harness {
        let alarms = Arc::new(FakeAlarms::new());
        let source = Arc::new(FakeSource::new());
        let settings = Arc::new(FakeSettings::new());
        let scheduler = Arc::new(ReminderScheduler::new(
            source.clone(),
            settings.clone(),
            Arc::new(AlarmRegistry::new(alarms.clone())),
            Arc::new(FixedClock::new(utc(2024, 1, 1, 8, 0))),
            Utc,
        ));

        source.add_timetable(1, "Week A");
        source.put(activity(10, 1, 7 * 60 + 30, 8 * 60 + 30));
        settings.set_active(Some(1));

        Harness {
            alarms,
            source,
            settings,
            job: RescheduleJob::new(scheduler),
        }
    }

    #[tokio::test]
    async fn running_twice_leaves_exactly_one_trigger() {
        let h = harness();
        let kind = JobKind::Reschedule(AlarmKey::Reminder(10));

        assert_eq!(h.job.run(kind).await.unwrap(), JobOutcome::Rearmed(1));
        assert_eq!(h.job.run(kind).await.unwrap(), JobOutcome::Rearmed(1));

        assert_eq!(h.alarms.len(), 1);
        assert_eq!(
            h.alarms.get(AlarmKey::Reminder(10)).unwrap().at,
            utc(2024, 1, 8, 7, 30)
        );
    }

    #[tokio::test]
    async fn deleted_activity_is_a_successful_noop() {
        let h = harness();
        h.source.remove(10);

        let outcome = h
            .job
            .run(JobKind::Reschedule(AlarmKey::Reminder(10)))
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Skipped(SkipReason::Deleted));
        assert_eq!(h.alarms.len(), 0);
    }

    #[tokio::test]
    async fn disabled_activity_is_not_rearmed() {
        let h = harness();
        h.source.set_notify(10, false);

        let outcome = h
            .job
            .run(JobKind::Reschedule(AlarmKey::Reminder(10)))
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Skipped(SkipReason::Disabled));
        assert_eq!(h.alarms.len(), 0);
    }

    #[tokio::test]
    async fn inactive_timetable_is_not_rearmed() {
        let h = harness();
        h.settings.set_active(Some(2));

        let outcome = h
            .job
            .run(JobKind::Reschedule(AlarmKey::Reminder(10)))
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Skipped(SkipReason::NotActiveTimetable));
    }

    #[tokio::test]
    async fn guard_rearm_respects_activity_kind() {
        let h = harness();
        let kind = JobKind::Reschedule(AlarmKey::FocusGuard(10));
        assert_eq!(h.job.run(kind).await.unwrap(), JobOutcome::Rearmed(1));

        let mut school = h.source.activity(10).unwrap();
        school.kind = ActivityKind::School;
        h.source.put(school);
        assert_eq!(
            h.job.run(kind).await.unwrap(),
            JobOutcome::Skipped(SkipReason::NotGuarded)
        );
        assert!(h.alarms.get(AlarmKey::FocusGuard(10)).is_none());
    }

    #[tokio::test]
    async fn store_failure_is_retryable() {
        let h = harness();
        h.source.fail_reads(true);

        let err = h
            .job
            .run(JobKind::Reschedule(AlarmKey::Reminder(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Retryable(_)));
    }

    #[tokio::test]
    async fn invalid_bounds_are_skipped() {
        let h = harness();
        h.source.put(activity(10, 1, 600, 500));

        let outcome = h
            .job
            .run(JobKind::Reschedule(AlarmKey::Reminder(10)))
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Skipped(SkipReason::InvalidData));
    }
}
