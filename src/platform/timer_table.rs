//! In-process alarm facility. Each armed key owns one sleeping task; a fired
//! alarm is delivered on a channel. Armed alarms are mirrored to the
//! `alarms` table so a restarted process can restore them.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, Weak,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle};

use crate::{
    db::{AlarmRow, Database},
    error::ScheduleError,
    reminders::{AlarmFacility, AlarmKey, AlarmPayload},
    utils::Clock,
};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "studyguard::alarms";

use crate::{log_debug, log_error, log_info};

/// Longest single sleep. The wall clock is re-read after each slice so a
/// suspended machine fires as soon as it wakes instead of sleeping on.
const MAX_SLEEP_SLICE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct FiredAlarm {
    pub key: AlarmKey,
    pub payload: AlarmPayload,
    pub scheduled_for: DateTime<Utc>,
}

struct TimerEntry {
    generation: u64,
    requested_at: DateTime<Utc>,
    task: JoinHandle<()>,
}

struct TimerInner {
    entries: Mutex<HashMap<AlarmKey, TimerEntry>>,
    next_generation: AtomicU64,
    exact_allowed: AtomicBool,
    inexact_window: Duration,
    clock: Arc<dyn Clock>,
    fired_tx: mpsc::UnboundedSender<FiredAlarm>,
    db: Option<Database>,
    runtime: Handle,
}

impl TimerInner {
    fn entries(&self) -> MutexGuard<'_, HashMap<AlarmKey, TimerEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn fire(
        &self,
        key: AlarmKey,
        generation: u64,
        payload: AlarmPayload,
        scheduled_for: DateTime<Utc>,
    ) {
        {
            let mut entries = self.entries();
            match entries.get(&key) {
                Some(entry) if entry.generation == generation => {
                    entries.remove(&key);
                }
                // Replaced or cancelled while this task was waking up.
                _ => return,
            }
        }

        if let Some(db) = &self.db {
            if let Err(err) = db.forget_alarm(key) {
                log_error!("failed to forget fired alarm {key}: {err:#}");
            }
        }

        log_debug!("alarm {key} fired");
        if self
            .fired_tx
            .send(FiredAlarm {
                key,
                payload,
                scheduled_for,
            })
            .is_err()
        {
            log_error!("alarm {key} fired with no receiver");
        }
    }
}

#[derive(Clone)]
pub struct TimerTable {
    inner: Arc<TimerInner>,
}

impl TimerTable {
    /// Must be called from within a Tokio runtime; alarm tasks run on it.
    pub fn new(
        clock: Arc<dyn Clock>,
        exact_allowed: bool,
        inexact_window: Duration,
        db: Option<Database>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<FiredAlarm>)> {
        let runtime = Handle::try_current().context("timer table needs a Tokio runtime")?;
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();

        let table = Self {
            inner: Arc::new(TimerInner {
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                exact_allowed: AtomicBool::new(exact_allowed),
                inexact_window,
                clock,
                fired_tx,
                db,
                runtime,
            }),
        };
        Ok((table, fired_rx))
    }

    /// Re-arms persisted alarms. Overdue ones fire immediately.
    pub fn restore(&self, rows: Vec<AlarmRow>) -> usize {
        let count = rows.len();
        for row in rows {
            self.arm(row.key, row.fire_at, row.payload, row.exact);
        }
        if count > 0 {
            log_info!("restored {count} alarm(s)");
        }
        count
    }

    fn effective_fire_at(&self, at: DateTime<Utc>, exact: bool) -> DateTime<Utc> {
        let window = i64::try_from(self.inner.inexact_window.as_secs()).unwrap_or(0);
        if exact || window <= 0 {
            return at;
        }
        let timestamp = at.timestamp() + i64::from(at.timestamp_subsec_nanos() > 0);
        let rounded = (timestamp + window - 1).div_euclid(window) * window;
        DateTime::from_timestamp(rounded, 0).unwrap_or(at)
    }

    fn arm(&self, key: AlarmKey, at: DateTime<Utc>, payload: AlarmPayload, exact: bool) {
        let fire_at = self.effective_fire_at(at, exact);
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let weak: Weak<TimerInner> = Arc::downgrade(&self.inner);
        let clock = self.inner.clock.clone();

        // Queued before the task exists so the row is always written before
        // the fire path deletes it.
        if let Some(db) = &self.inner.db {
            let row = AlarmRow {
                key,
                fire_at: at,
                exact,
                payload: payload.clone(),
            };
            if let Err(err) = db.persist_alarm(row) {
                log_error!("failed to persist alarm {key}: {err:#}");
            }
        }

        // Held across spawn so an immediately due task cannot look up its
        // entry before it is inserted.
        let mut entries = self.inner.entries();
        let task = self.inner.runtime.spawn(async move {
            loop {
                let remaining = fire_at - clock.now();
                if remaining <= TimeDelta::zero() {
                    break;
                }
                let slice = remaining.to_std().unwrap_or(Duration::ZERO).min(MAX_SLEEP_SLICE);
                tokio::time::sleep(slice).await;
            }
            if let Some(inner) = weak.upgrade() {
                inner.fire(key, generation, payload, at);
            }
        });

        let replaced = entries.insert(
            key,
            TimerEntry {
                generation,
                requested_at: at,
                task,
            },
        );
        drop(entries);
        if let Some(old) = replaced {
            old.task.abort();
        }
    }
}

impl AlarmFacility for TimerTable {
    fn can_schedule_exact(&self) -> bool {
        self.inner.exact_allowed.load(Ordering::SeqCst)
    }

    fn register_exact(
        &self,
        key: AlarmKey,
        at: DateTime<Utc>,
        payload: AlarmPayload,
    ) -> crate::error::Result<()> {
        if !self.can_schedule_exact() {
            return Err(ScheduleError::ExactAlarmDenied);
        }
        self.arm(key, at, payload, true);
        Ok(())
    }

    fn register_inexact(
        &self,
        key: AlarmKey,
        at: DateTime<Utc>,
        payload: AlarmPayload,
    ) -> crate::error::Result<()> {
        self.arm(key, at, payload, false);
        Ok(())
    }

    fn cancel(&self, key: AlarmKey) -> crate::error::Result<()> {
        let removed = self.inner.entries().remove(&key);
        if let Some(entry) = removed {
            entry.task.abort();
            if let Some(db) = &self.inner.db {
                db.forget_alarm(key)
                    .map_err(|err| ScheduleError::Facility(format!("{err:#}")))?;
            }
        }
        Ok(())
    }

    fn registered(&self) -> Vec<(AlarmKey, DateTime<Utc>)> {
        let mut registered: Vec<_> = self
            .inner
            .entries()
            .iter()
            .map(|(key, entry)| (*key, entry.requested_at))
            .collect();
        registered.sort();
        registered
    }
}
