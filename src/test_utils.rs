//! Fakes and fixtures shared by the unit tests.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tempfile::TempDir;

use crate::{
    db::{ActivityKind, Database, JobKind, ScheduledActivity, Timetable},
    error::{Result, ScheduleError},
    focus::{effective_restricted, RestrictedApps},
    jobs::JobQueue,
    platform::{AlertSurface, FocusNudge, ForegroundProbe, ReminderAlert},
    reminders::{
        ActiveTimetableRef, ActivitySource, AlarmFacility, AlarmKey, AlarmPayload, ReminderOptions,
    },
    utils::Clock,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
}

/// Enabled study activity in timetable 1 with no lead time.
pub fn activity(id: i64, day_of_week: u8, start_minute: u32, end_minute: u32) -> ScheduledActivity {
    ScheduledActivity {
        id,
        timetable_id: 1,
        day_of_week,
        start_minute,
        end_minute,
        title: format!("Activity {id}"),
        kind: ActivityKind::Study,
        note: None,
        notify_enabled: true,
        lead_minutes: 0,
        announce_message: None,
    }
}

pub fn setup_test_db() -> (Database, TempDir) {
    let dir = TempDir::new().unwrap();
    let db = Database::new(dir.path().join("test.sqlite3")).unwrap();
    (db, dir)
}

// ---------------------------------------------------------------------------
// Alarms

#[derive(Debug, Clone, PartialEq)]
pub struct ArmedAlarm {
    pub at: DateTime<Utc>,
    pub payload: AlarmPayload,
    pub exact: bool,
}

pub struct FakeAlarms {
    armed: Mutex<BTreeMap<AlarmKey, ArmedAlarm>>,
    exact_allowed: Mutex<bool>,
    refuse_exact: Mutex<bool>,
}

impl FakeAlarms {
    pub fn new() -> Self {
        Self {
            armed: Mutex::new(BTreeMap::new()),
            exact_allowed: Mutex::new(true),
            refuse_exact: Mutex::new(false),
        }
    }

    pub fn set_exact_allowed(&self, allowed: bool) {
        *lock(&self.exact_allowed) = allowed;
    }

    /// Reports exact alarms as available but denies each registration.
    pub fn refuse_exact(&self) {
        *lock(&self.refuse_exact) = true;
    }

    pub fn get(&self, key: AlarmKey) -> Option<ArmedAlarm> {
        lock(&self.armed).get(&key).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<AlarmKey, ArmedAlarm> {
        lock(&self.armed).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.armed).len()
    }
}

impl Default for FakeAlarms {
    fn default() -> Self {
        Self::new()
    }
}

impl AlarmFacility for FakeAlarms {
    fn can_schedule_exact(&self) -> bool {
        *lock(&self.exact_allowed)
    }

    fn register_exact(&self, key: AlarmKey, at: DateTime<Utc>, payload: AlarmPayload) -> Result<()> {
        if *lock(&self.refuse_exact) || !*lock(&self.exact_allowed) {
            return Err(ScheduleError::ExactAlarmDenied);
        }
        lock(&self.armed).insert(
            key,
            ArmedAlarm {
                at,
                payload,
                exact: true,
            },
        );
        Ok(())
    }

    fn register_inexact(&self, key: AlarmKey, at: DateTime<Utc>, payload: AlarmPayload) -> Result<()> {
        lock(&self.armed).insert(
            key,
            ArmedAlarm {
                at,
                payload,
                exact: false,
            },
        );
        Ok(())
    }

    fn cancel(&self, key: AlarmKey) -> Result<()> {
        lock(&self.armed).remove(&key);
        Ok(())
    }

    fn registered(&self) -> Vec<(AlarmKey, DateTime<Utc>)> {
        lock(&self.armed)
            .iter()
            .map(|(key, alarm)| (*key, alarm.at))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Activity store

#[derive(Default)]
pub struct FakeSource {
    timetables: Mutex<HashMap<i64, Timetable>>,
    activities: Mutex<BTreeMap<i64, ScheduledActivity>>,
    failing: Mutex<bool>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_timetable(&self, id: i64, name: &str) {
        lock(&self.timetables).insert(
            id,
            Timetable {
                id,
                name: name.to_string(),
            },
        );
    }

    pub fn put(&self, activity: ScheduledActivity) {
        lock(&self.activities).insert(activity.id, activity);
    }

    pub fn activity(&self, id: i64) -> Option<ScheduledActivity> {
        lock(&self.activities).get(&id).cloned()
    }

    pub fn set_notify(&self, id: i64, enabled: bool) {
        if let Some(activity) = lock(&self.activities).get_mut(&id) {
            activity.notify_enabled = enabled;
        }
    }

    pub fn remove(&self, id: i64) {
        lock(&self.activities).remove(&id);
    }

    /// Every read fails while set, like an unavailable database.
    pub fn fail_reads(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    fn check(&self) -> anyhow::Result<()> {
        if *lock(&self.failing) {
            bail!("activity store unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl ActivitySource for FakeSource {
    async fn get_activity(&self, activity_id: i64) -> anyhow::Result<Option<ScheduledActivity>> {
        self.check()?;
        Ok(self.activity(activity_id))
    }

    async fn get_enabled_activities(
        &self,
        timetable_id: i64,
    ) -> anyhow::Result<Vec<ScheduledActivity>> {
        self.check()?;
        let mut activities: Vec<_> = lock(&self.activities)
            .values()
            .filter(|a| a.timetable_id == timetable_id && a.notify_enabled)
            .cloned()
            .collect();
        activities.sort_by_key(|a| (a.day_of_week, a.start_minute, a.id));
        Ok(activities)
    }

    async fn get_timetable(&self, timetable_id: i64) -> anyhow::Result<Option<Timetable>> {
        self.check()?;
        Ok(lock(&self.timetables).get(&timetable_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Settings

pub struct FakeSettings {
    active: Mutex<Option<i64>>,
    options: Mutex<ReminderOptions>,
    restricted: Mutex<HashSet<String>>,
}

impl FakeSettings {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
            options: Mutex::new(ReminderOptions::default()),
            restricted: Mutex::new(effective_restricted(&[], &[])),
        }
    }

    pub fn set_active(&self, timetable_id: Option<i64>) {
        *lock(&self.active) = timetable_id;
    }

    pub fn set_focus_guard(&self, enabled: bool) {
        lock(&self.options).focus_guard_enabled = enabled;
    }

    pub fn set_sound(&self, enabled: bool) {
        lock(&self.options).sound_enabled = enabled;
    }

    pub fn set_restricted(&self, apps: &[&str]) {
        *lock(&self.restricted) = apps.iter().map(|app| app.to_lowercase()).collect();
    }
}

impl Default for FakeSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveTimetableRef for FakeSettings {
    fn active_timetable_id(&self) -> Option<i64> {
        *lock(&self.active)
    }

    fn reminder_options(&self) -> ReminderOptions {
        *lock(&self.options)
    }
}

impl RestrictedApps for FakeSettings {
    fn restricted_apps(&self) -> HashSet<String> {
        lock(&self.restricted).clone()
    }
}

// ---------------------------------------------------------------------------
// Clocks

/// Clock that only moves when told to.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

/// Wall clock driven by Tokio's (possibly paused) time.
pub struct TokioClock {
    base: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap();
        self.base + elapsed
    }
}

// ---------------------------------------------------------------------------
// Host surfaces

pub struct FakeProbe {
    permission: bool,
    foreground: Mutex<Option<String>>,
}

impl FakeProbe {
    pub fn new(permission: bool) -> Self {
        Self {
            permission,
            foreground: Mutex::new(None),
        }
    }

    pub fn set_foreground(&self, app_id: Option<&str>) {
        *lock(&self.foreground) = app_id.map(str::to_string);
    }
}

impl ForegroundProbe for FakeProbe {
    fn has_introspection_permission(&self) -> bool {
        self.permission
    }

    fn current_foreground_app(&self) -> Option<String> {
        lock(&self.foreground).clone()
    }
}

#[derive(Default)]
pub struct RecordingAlerts {
    reminders: Mutex<Vec<ReminderAlert>>,
    announcements: Mutex<Vec<String>>,
    nudges: Mutex<Vec<FocusNudge>>,
    nudge_failures: Mutex<u32>,
}

impl RecordingAlerts {
    pub fn reminders(&self) -> Vec<ReminderAlert> {
        lock(&self.reminders).clone()
    }

    pub fn announcements(&self) -> Vec<String> {
        lock(&self.announcements).clone()
    }

    pub fn nudges(&self) -> Vec<FocusNudge> {
        lock(&self.nudges).clone()
    }

    /// The next `count` focus nudges fail to show.
    pub fn fail_next_nudges(&self, count: u32) {
        *lock(&self.nudge_failures) = count;
    }
}

impl AlertSurface for RecordingAlerts {
    fn show_reminder(&self, alert: &ReminderAlert) -> anyhow::Result<()> {
        lock(&self.reminders).push(alert.clone());
        Ok(())
    }

    fn announce(&self, message: &str) -> anyhow::Result<()> {
        lock(&self.announcements).push(message.to_string());
        Ok(())
    }

    fn show_focus_nudge(&self, nudge: &FocusNudge) -> anyhow::Result<()> {
        let mut failures = lock(&self.nudge_failures);
        if *failures > 0 {
            *failures -= 1;
            bail!("notification service unavailable");
        }
        lock(&self.nudges).push(nudge.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<JobKind>>,
    failing: Mutex<bool>,
}

impl RecordingQueue {
    pub fn jobs(&self) -> Vec<JobKind> {
        lock(&self.jobs).clone()
    }

    pub fn fail(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }
}

impl JobQueue for RecordingQueue {
    fn enqueue(&self, kind: JobKind) -> anyhow::Result<()> {
        if *lock(&self.failing) {
            return Err(anyhow!("queue unavailable"));
        }
        lock(&self.jobs).push(kind);
        Ok(())
    }
}

