use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::SystemTime,
};

use crate::{
    focus::{effective_restricted, RestrictedApps},
    reminders::{ActiveTimetableRef, ReminderOptions},
};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "studyguard::settings";

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSettings {
    pub active_timetable_id: Option<i64>,
    pub focus_guard_enabled: bool,
    pub sound_enabled: bool,
    pub urgent_reminders: bool,
    pub added_restricted_apps: Vec<String>,
    pub removed_restricted_apps: Vec<String>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            active_timetable_id: None,
            focus_guard_enabled: true,
            sound_enabled: true,
            urgent_reminders: true,
            added_restricted_apps: Vec::new(),
            removed_restricted_apps: Vec::new(),
        }
    }
}

/// User settings kept in a JSON file. Each setter writes through and returns
/// whether armed alarms are now stale and need a full reschedule. Edits made
/// by another process (`studyguard import --activate`, a hand-edited file)
/// are picked up by the next read through the engine-facing traits.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
    seen_mtime: Mutex<Option<SystemTime>>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!("settings file {} unreadable, using defaults: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            seen_mtime: Mutex::new(file_mtime(&path)),
            path,
            data: RwLock::new(data),
        })
    }

    fn seen_mtime(&self) -> MutexGuard<'_, Option<SystemTime>> {
        match self.seen_mtime.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn refresh_from_disk(&self) {
        let Some(modified) = file_mtime(&self.path) else {
            return;
        };
        if *self.seen_mtime() == Some(modified) {
            return;
        }
        match fs::read_to_string(&self.path)
            .map_err(anyhow::Error::from)
            .and_then(|contents| Ok(serde_json::from_str::<UserSettings>(&contents)?))
        {
            Ok(data) => {
                *self.write() = data;
                log_info!("settings changed on disk; reloaded");
            }
            Err(err) => log_warn!("ignoring unreadable settings file: {err:#}"),
        }
        *self.seen_mtime() = Some(modified);
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn snapshot(&self) -> UserSettings {
        self.read().clone()
    }

    /// Applies `change` and persists when it reports a modification.
    fn update(&self, change: impl FnOnce(&mut UserSettings) -> bool) -> Result<bool> {
        let mut guard = self.write();
        let changed = change(&mut guard);
        if changed {
            self.persist(&guard)?;
        }
        Ok(changed)
    }

    pub fn set_active_timetable(&self, timetable_id: Option<i64>) -> Result<bool> {
        self.update(|data| replace(&mut data.active_timetable_id, timetable_id))
    }

    pub fn set_focus_guard_enabled(&self, enabled: bool) -> Result<bool> {
        self.update(|data| replace(&mut data.focus_guard_enabled, enabled))
    }

    /// Announcements are captured when an alarm is armed, so this reschedules.
    pub fn set_sound_enabled(&self, enabled: bool) -> Result<bool> {
        self.update(|data| replace(&mut data.sound_enabled, enabled))
    }

    pub fn set_urgent_reminders(&self, enabled: bool) -> Result<bool> {
        self.update(|data| replace(&mut data.urgent_reminders, enabled))
    }

    /// The restricted set is read on every focus tick; never needs a reschedule.
    pub fn add_restricted_app(&self, app_id: &str) -> Result<bool> {
        let app = app_id.trim().to_lowercase();
        if app.is_empty() {
            return Ok(false);
        }
        self.update(|data| {
            data.removed_restricted_apps.retain(|removed| *removed != app);
            if !data.added_restricted_apps.contains(&app) {
                data.added_restricted_apps.push(app);
            }
            true
        })?;
        Ok(false)
    }

    pub fn remove_restricted_app(&self, app_id: &str) -> Result<bool> {
        let app = app_id.trim().to_lowercase();
        if app.is_empty() {
            return Ok(false);
        }
        self.update(|data| {
            data.added_restricted_apps.retain(|added| *added != app);
            if !data.removed_restricted_apps.contains(&app) {
                data.removed_restricted_apps.push(app);
            }
            true
        })?;
        Ok(false)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))?;
        *self.seen_mtime() = file_mtime(&self.path);
        Ok(())
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

impl ActiveTimetableRef for SettingsStore {
    fn active_timetable_id(&self) -> Option<i64> {
        self.refresh_from_disk();
        self.read().active_timetable_id
    }

    fn reminder_options(&self) -> ReminderOptions {
        self.refresh_from_disk();
        let data = self.read();
        ReminderOptions {
            focus_guard_enabled: data.focus_guard_enabled,
            sound_enabled: data.sound_enabled,
            urgent_reminders: data.urgent_reminders,
        }
    }
}

impl RestrictedApps for SettingsStore {
    fn restricted_apps(&self) -> HashSet<String> {
        self.refresh_from_disk();
        let data = self.read();
        effective_restricted(&data.added_restricted_apps, &data.removed_restricted_apps)
    }
}
