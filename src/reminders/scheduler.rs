use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use serde::Serialize;

use crate::{
    db::{ActivityKind, ScheduledActivity, Timetable},
    error::{Result, ScheduleError},
    utils::Clock,
};

use super::{
    payload::{reminder_body, AlarmKey, AlarmPayload, FocusGuardPayload, ReminderPayload},
    registry::{AlarmRegistry, Precision},
    trigger::next_trigger,
};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "studyguard::reminders";

use crate::{log_debug, log_error, log_info, log_warn};

/// Read access to activity records.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn get_activity(&self, activity_id: i64) -> anyhow::Result<Option<ScheduledActivity>>;

    /// Activities of `timetable_id` with notifications enabled.
    async fn get_enabled_activities(
        &self,
        timetable_id: i64,
    ) -> anyhow::Result<Vec<ScheduledActivity>>;

    async fn get_timetable(&self, timetable_id: i64) -> anyhow::Result<Option<Timetable>>;
}

/// User preferences that shape what gets armed. Captured when an alarm is
/// registered, not when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderOptions {
    pub focus_guard_enabled: bool,
    pub sound_enabled: bool,
    pub urgent_reminders: bool,
}

impl Default for ReminderOptions {
    fn default() -> Self {
        Self {
            focus_guard_enabled: true,
            sound_enabled: true,
            urgent_reminders: true,
        }
    }
}

/// The single "currently scheduled timetable" setting.
pub trait ActiveTimetableRef: Send + Sync {
    fn active_timetable_id(&self) -> Option<i64>;

    fn reminder_options(&self) -> ReminderOptions {
        ReminderOptions::default()
    }
}

/// Time zones the scheduler can compute triggers in.
pub trait ScheduleZone: TimeZone + Send + Sync + 'static {}

impl<Tz: TimeZone + Send + Sync + 'static> ScheduleZone for Tz {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Armed {
    pub at: DateTime<Utc>,
    pub precision: Precision,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleSummary {
    pub scheduled: usize,
    pub guards: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

/// Turns activity records into registered alarms.
pub struct ReminderScheduler<Tz: ScheduleZone = Local> {
    source: Arc<dyn ActivitySource>,
    active: Arc<dyn ActiveTimetableRef>,
    registry: Arc<AlarmRegistry>,
    clock: Arc<dyn Clock>,
    tz: Tz,
}

impl<Tz: ScheduleZone> ReminderScheduler<Tz> {
    pub fn new(
        source: Arc<dyn ActivitySource>,
        active: Arc<dyn ActiveTimetableRef>,
        registry: Arc<AlarmRegistry>,
        clock: Arc<dyn Clock>,
        tz: Tz,
    ) -> Self {
        Self {
            source,
            active,
            registry,
            clock,
            tz,
        }
    }

    pub fn source(&self) -> &Arc<dyn ActivitySource> {
        &self.source
    }

    pub fn options(&self) -> ReminderOptions {
        self.active.reminder_options()
    }

    pub fn is_active_timetable(&self, timetable_id: i64) -> bool {
        self.active.active_timetable_id() == Some(timetable_id)
    }

    fn next_fire(&self, day_of_week: u8, minute_of_day: u32) -> Result<DateTime<Utc>> {
        let now = self.clock.now().with_timezone(&self.tz);
        next_trigger(day_of_week, minute_of_day, &now).map(|at| at.with_timezone(&Utc))
    }

    /// Arms the next reminder for `activity`. A disabled activity has its
    /// reminder cancelled instead and yields `None`.
    pub fn arm_reminder(
        &self,
        activity: &ScheduledActivity,
        timetable_name: Option<&str>,
        options: ReminderOptions,
    ) -> Result<Option<Armed>> {
        let key = AlarmKey::Reminder(activity.id);
        if !activity.notify_enabled {
            self.registry.cancel(key)?;
            return Ok(None);
        }
        ensure_bounds(activity)?;

        let at = self.next_fire(activity.day_of_week, activity.trigger_minute())?;
        if activity.lead_minutes > activity.start_minute {
            log_debug!(
                "activity {} lead {}m exceeds start; reminder clamped to midnight",
                activity.id,
                activity.lead_minutes
            );
        }

        let announce_message = activity
            .announce_message
            .clone()
            .filter(|message| !message.trim().is_empty() && options.sound_enabled);
        let payload = AlarmPayload::Reminder(ReminderPayload {
            activity_id: activity.id,
            timetable_id: activity.timetable_id,
            timetable_name: timetable_name.map(str::to_string),
            title: activity.title.clone(),
            body: reminder_body(
                activity.start_minute,
                activity.end_minute,
                &activity.title,
                activity.note.as_deref(),
            ),
            day_of_week: activity.day_of_week,
            announce_message,
            urgent: options.urgent_reminders,
        });

        let precision = self.registry.register(key, at, payload)?;
        log_debug!("reminder {key} armed for {at} ({precision:?})");
        Ok(Some(Armed { at, precision }))
    }

    /// Arms the focus-guard alarm at the start of a study activity. Anything
    /// that no longer qualifies has its guard cancelled and yields `None`.
    pub fn arm_guard(
        &self,
        activity: &ScheduledActivity,
        options: ReminderOptions,
    ) -> Result<Option<Armed>> {
        let key = AlarmKey::FocusGuard(activity.id);
        let wanted = activity.kind == ActivityKind::Study
            && activity.notify_enabled
            && options.focus_guard_enabled;
        if !wanted {
            self.registry.cancel(key)?;
            return Ok(None);
        }
        ensure_bounds(activity)?;

        let at = self.next_fire(activity.day_of_week, activity.start_minute)?;
        let window_end = at + TimeDelta::minutes(i64::from(activity.duration_minutes()));
        let payload = AlarmPayload::FocusGuard(FocusGuardPayload {
            activity_id: activity.id,
            activity_title: activity.title.clone(),
            window_end,
        });

        let precision = self.registry.register(key, at, payload)?;
        log_debug!("focus guard {key} armed for {at} until {window_end}");
        Ok(Some(Armed { at, precision }))
    }

    /// Re-arms the reminder of one activity, looking up its timetable name.
    pub async fn schedule_one(&self, activity: &ScheduledActivity) -> Result<Option<Armed>> {
        if !activity.notify_enabled {
            self.registry.cancel(AlarmKey::Reminder(activity.id))?;
            return Ok(None);
        }
        let timetable = self
            .source
            .get_timetable(activity.timetable_id)
            .await
            .map_err(ScheduleError::Store)?;
        let name = timetable.as_ref().map(|t| t.name.as_str());
        self.arm_reminder(activity, name, self.options())
    }

    /// Rebuilds every alarm of the active timetable and cancels alarms that
    /// no longer belong to it. Safe to call any number of times.
    pub async fn reschedule_all(&self) -> Result<RescheduleSummary> {
        let mut summary = RescheduleSummary::default();

        let Some(timetable_id) = self.active.active_timetable_id() else {
            log_debug!("no active timetable; nothing to schedule");
            return Ok(summary);
        };

        let Some(timetable) = self
            .source
            .get_timetable(timetable_id)
            .await
            .map_err(ScheduleError::Store)?
        else {
            log_warn!("active timetable {timetable_id} does not exist; nothing to schedule");
            return Ok(summary);
        };

        let options = self.options();
        let activities = self
            .source
            .get_enabled_activities(timetable_id)
            .await
            .map_err(ScheduleError::Store)?;

        let mut keep: HashSet<AlarmKey> = HashSet::new();
        let mut first_failure: Option<ScheduleError> = None;

        for activity in activities.iter().filter(|a| a.notify_enabled) {
            match self.arm_reminder(activity, Some(&timetable.name), options) {
                Ok(Some(_)) => {
                    summary.scheduled += 1;
                    keep.insert(AlarmKey::Reminder(activity.id));
                }
                Ok(None) => {}
                Err(err) if err.is_transient() => {
                    log_error!("failed to arm reminder for activity {}: {err}", activity.id);
                    first_failure.get_or_insert(err);
                    continue;
                }
                Err(err) => {
                    log_warn!("skipping activity {} '{}': {err}", activity.id, activity.title);
                    summary.skipped += 1;
                    continue;
                }
            }

            match self.arm_guard(activity, options) {
                Ok(Some(_)) => {
                    summary.guards += 1;
                    keep.insert(AlarmKey::FocusGuard(activity.id));
                }
                Ok(None) => {}
                Err(err) => {
                    log_error!("failed to arm focus guard for activity {}: {err}", activity.id);
                    if err.is_transient() {
                        first_failure.get_or_insert(err);
                    }
                }
            }
        }

        for (key, _) in self.registry.registered() {
            if keep.contains(&key) {
                continue;
            }
            match self.registry.cancel(key) {
                Ok(()) => summary.cancelled += 1,
                Err(err) => {
                    log_error!("failed to cancel stale alarm {key}: {err}");
                    first_failure.get_or_insert(err);
                }
            }
        }

        if let Some(err) = first_failure {
            return Err(err);
        }

        log_info!(
            "timetable {} '{}' scheduled: {} reminders, {} focus guards, {} skipped, {} stale cancelled",
            timetable.id,
            timetable.name,
            summary.scheduled,
            summary.guards,
            summary.skipped,
            summary.cancelled
        );
        Ok(summary)
    }

    /// Cancels both the reminder and the focus guard of an activity.
    pub fn cancel_activity(&self, activity_id: i64) -> Result<()> {
        self.registry.cancel(AlarmKey::Reminder(activity_id))?;
        self.registry.cancel(AlarmKey::FocusGuard(activity_id))
    }
}

fn ensure_bounds(activity: &ScheduledActivity) -> Result<()> {
    if activity.has_valid_bounds() {
        Ok(())
    } else {
        Err(ScheduleError::InvalidBounds {
            id: activity.id,
            start: activity.start_minute,
            end: activity.end_minute,
        })
    }
}
