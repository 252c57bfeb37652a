use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;

use crate::jobs::RetryPolicy;

/// Identifier the foreground probe reports for this process; never nudged.
pub const HOST_APP_ID: &str = "studyguard";

/// Tunables for the engine. Defaults match the behaviour users expect from
/// the reminder and focus-guard features; every field can be overridden from
/// the environment through [`EngineConfig::from_env`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Holds `studyguard.sqlite3` and `settings.json`.
    pub data_dir: PathBuf,

    /// Focus monitor sampling cadence.
    pub focus_poll_interval: Duration,
    /// Minimum spacing between two nudges for the same application.
    pub focus_alert_cooldown: Duration,
    pub host_app_id: String,

    /// Whether the alarm facility may register exact wake-ups.
    pub exact_alarms: bool,
    /// Granularity of inexact wake-ups; fire times are rounded up to it.
    pub inexact_window: Duration,

    /// Fallback cadence for the job worker when no enqueue wakes it.
    pub job_poll_interval: Duration,
    pub job_timeout: Duration,
    pub retry: RetryPolicy,

    pub debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            focus_poll_interval: Duration::from_secs(5),
            focus_alert_cooldown: Duration::from_secs(2 * 60),
            host_app_id: HOST_APP_ID.to_string(),
            exact_alarms: true,
            inexact_window: Duration::from_secs(60),
            job_poll_interval: Duration::from_secs(30),
            job_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            debug: false,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("STUDYGUARD_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(secs) = env_u64("STUDYGUARD_FOCUS_POLL_SECS")? {
            if secs == 0 {
                return Err(anyhow!("STUDYGUARD_FOCUS_POLL_SECS must be greater than zero"));
            }
            config.focus_poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("STUDYGUARD_FOCUS_COOLDOWN_SECS")? {
            config.focus_alert_cooldown = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("STUDYGUARD_JOB_POLL_SECS")? {
            config.job_poll_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(flag) = env_flag("STUDYGUARD_EXACT_ALARMS") {
            config.exact_alarms = flag;
        }
        if let Some(flag) = env_flag("STUDYGUARD_DEBUG") {
            config.debug = flag;
        }

        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("studyguard.sqlite3")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "studyguard", "StudyGuard")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".studyguard"))
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{name} must be a whole number of seconds, got '{raw}'")),
        Err(_) => Ok(None),
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_focus_guard_cadence() {
        let config = EngineConfig::default();
        assert_eq!(config.focus_poll_interval, Duration::from_secs(5));
        assert_eq!(config.focus_alert_cooldown, Duration::from_secs(120));
        assert!(config.exact_alarms);
        assert_eq!(config.host_app_id, HOST_APP_ID);
    }

    #[test]
    fn paths_live_under_data_dir() {
        let config = EngineConfig {
            data_dir: PathBuf::from("/tmp/sg"),
            ..EngineConfig::default()
        };
        assert_eq!(config.db_path(), PathBuf::from("/tmp/sg/studyguard.sqlite3"));
        assert_eq!(config.settings_path(), PathBuf::from("/tmp/sg/settings.json"));
    }
}
