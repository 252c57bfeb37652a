pub mod config;
pub mod db;
pub mod error;
pub mod focus;
pub mod jobs;
pub mod platform;
pub mod reminders;
pub mod settings;
pub mod utils;

#[cfg(test)]
mod test_utils;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};

use config::EngineConfig;
use db::{Database, JobCounts, Timetable, TimetableImport};
use focus::{FocusDeps, FocusMonitor};
use jobs::{JobKind, JobQueue, JobWorker, JobWorkerConfig, RescheduleJob, SqliteJobQueue};
use platform::{native_probe, AlertSurface, FiredAlarm, LogAlertSurface, TimerTable};
use reminders::{
    current_boot_time, detect_cold_boot, ActiveTimetableRef, AlarmRegistry,
    BootRecovery, FireHandler, ReminderScheduler,
};
use settings::SettingsStore;
use utils::{Clock, SystemClock};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "studyguard";

/// Everything the running engine owns.
pub struct Engine {
    pub db: Database,
    pub settings: Arc<SettingsStore>,
    pub scheduler: Arc<ReminderScheduler>,
    pub queue: SqliteJobQueue,
    pub focus: Arc<FocusMonitor>,
    worker: JobWorker,
    fire_driver: JoinHandle<()>,
    // Alarm tasks live as long as the table does.
    _timers: TimerTable,
}

impl Engine {
    /// Opens the stores, restores or rebuilds alarms and starts the
    /// background tasks. Must be called inside a Tokio runtime.
    pub async fn start(config: &EngineConfig) -> Result<Self> {
        let db = Database::new(config.db_path())?;
        let settings = Arc::new(SettingsStore::new(config.settings_path())?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (timers, fired_rx) = TimerTable::new(
            clock.clone(),
            config.exact_alarms,
            config.inexact_window,
            Some(db.clone()),
        )?;

        let cold_boot = match detect_cold_boot(&db, current_boot_time()).await {
            Ok(cold) => cold,
            Err(err) => {
                log_warn!("boot detection failed, rebuilding alarms: {err:#}");
                true
            }
        };
        if cold_boot {
            // Registrations do not survive a reboot.
            let cleared = db.clear_alarms().await?;
            if cleared > 0 {
                log_info!("dropped {cleared} alarm(s) from before the reboot");
            }
        } else {
            timers.restore(db.load_alarms().await?);
        }

        let registry = Arc::new(AlarmRegistry::new(Arc::new(timers.clone())));
        let scheduler = Arc::new(ReminderScheduler::new(
            Arc::new(db.clone()),
            settings.clone(),
            registry,
            clock.clone(),
            Local,
        ));

        let queue = SqliteJobQueue::new(db.clone(), clock.clone());
        let mut worker = JobWorker::new();
        worker.start(
            queue.clone(),
            Arc::new(RescheduleJob::new(scheduler.clone())),
            clock.clone(),
            JobWorkerConfig {
                poll_interval: config.job_poll_interval,
                job_timeout: config.job_timeout,
                retry: config.retry.clone(),
            },
        )?;

        let surface: Arc<dyn AlertSurface> = Arc::new(LogAlertSurface);
        let focus = Arc::new(FocusMonitor::new(FocusDeps {
            probe: native_probe(),
            restricted: settings.clone(),
            surface: surface.clone(),
            clock,
            poll_interval: config.focus_poll_interval,
            cooldown: config.focus_alert_cooldown,
            host_app_id: config.host_app_id.clone(),
        }));

        let shared_queue: Arc<dyn JobQueue> = Arc::new(queue.clone());
        let fire = FireHandler::new(surface, focus.clone(), shared_queue.clone());
        let fire_driver = tokio::spawn(drive_fired(fired_rx, fire));

        if cold_boot {
            // Detached; failures are logged and retried through the queue.
            drop(BootRecovery::new(scheduler.clone(), Some(shared_queue)).on_boot());
        } else {
            // Catches edits made while the engine was down.
            shared_queue.enqueue(JobKind::RescheduleAll)?;
        }

        Ok(Self {
            db,
            settings,
            scheduler,
            queue,
            focus,
            worker,
            fire_driver,
            _timers: timers,
        })
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Err(err) = self.focus.stop().await {
            log_error!("focus monitor did not stop cleanly: {err:#}");
        }
        self.worker.stop().await?;
        self.fire_driver.abort();
        log_info!("engine stopped");
        Ok(())
    }
}

async fn drive_fired(mut fired_rx: mpsc::UnboundedReceiver<FiredAlarm>, handler: FireHandler) {
    while let Some(fired) = fired_rx.recv().await {
        handler.on_fire(fired);
    }
}

/// Runs the engine until Ctrl-C.
pub async fn run(config: EngineConfig) -> Result<()> {
    log_info!("StudyGuard starting, data in {}", config.data_dir.display());

    let engine = Engine::start(&config).await?;
    match engine.settings.active_timetable_id() {
        Some(id) => log_info!("active timetable {id}"),
        None => log_warn!("no active timetable; import one with `studyguard import --activate`"),
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    log_info!("shutting down");
    engine.shutdown().await
}

/// Loads a timetable JSON file into the store. A reschedule job is queued so
/// a running engine picks the change up on its next poll.
pub async fn import(config: &EngineConfig, file: &Path, activate: bool) -> Result<Timetable> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let import: TimetableImport = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a valid timetable file", file.display()))?;

    let db = Database::new(config.db_path())?;
    let timetable = db.import_timetable(import).await?;
    log_info!("imported timetable {} '{}'", timetable.id, timetable.name);

    if activate {
        let settings = SettingsStore::new(config.settings_path())?;
        settings.set_active_timetable(Some(timetable.id))?;
        log_info!("timetable {} is now active", timetable.id);
    }
    db.enqueue_job(JobKind::RescheduleAll, Utc::now()).await?;
    Ok(timetable)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmedAlarmStatus {
    pub key: String,
    pub fire_at: DateTime<Local>,
    pub exact: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub active_timetable_id: Option<i64>,
    pub timetables: Vec<Timetable>,
    pub alarms: Vec<ArmedAlarmStatus>,
    pub jobs: JobCounts,
}

/// Snapshot of the persisted engine state.
pub async fn status(config: &EngineConfig) -> Result<StatusReport> {
    let db = Database::new(config.db_path())?;
    let settings = SettingsStore::new(config.settings_path())?;

    let mut alarms: Vec<ArmedAlarmStatus> = db
        .load_alarms()
        .await?
        .into_iter()
        .map(|row| ArmedAlarmStatus {
            key: row.key.to_string(),
            fire_at: row.fire_at.with_timezone(&Local),
            exact: row.exact,
        })
        .collect();
    alarms.sort_by_key(|alarm| alarm.fire_at);

    Ok(StatusReport {
        active_timetable_id: settings.active_timetable_id(),
        timetables: db.get_timetables().await?,
        alarms,
        jobs: db.job_counts().await?,
    })
}
