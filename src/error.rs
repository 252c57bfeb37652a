//! Error types shared by the scheduling engine.

use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid day of week {0}; expected 1 (Monday) through 7 (Sunday)")]
    InvalidDay(u8),

    #[error("invalid minute of day {0}; expected 0 through 1439")]
    InvalidMinute(u32),

    #[error("activity {id} has invalid time bounds {start}..{end}")]
    InvalidBounds { id: i64, start: u32, end: u32 },

    #[error("local time {0} cannot be represented in this time zone")]
    NonexistentLocalTime(NaiveDateTime),

    /// The platform refused an exact wake-up request.
    #[error("exact alarms are not permitted")]
    ExactAlarmDenied,

    #[error("alarm facility failure: {0}")]
    Facility(String),

    /// Reading activities or timetables failed. Transient by assumption.
    #[error("activity store unavailable: {0:#}")]
    Store(#[source] anyhow::Error),
}

impl ScheduleError {
    /// Whether retrying the same operation later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ScheduleError::Store(_) | ScheduleError::Facility(_))
    }
}

pub type Result<T, E = ScheduleError> = std::result::Result<T, E>;
