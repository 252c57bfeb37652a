//! Timetable and activity records as the engine reads them.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::reminders::trigger::MINUTES_PER_DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ActivityKind {
    #[default]
    Study,
    Break,
    School,
    Tuition,
    Sleep,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Study => "Study",
            ActivityKind::Break => "Break",
            ActivityKind::School => "School",
            ActivityKind::Tuition => "Tuition",
            ActivityKind::Sleep => "Sleep",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "Study" => Ok(ActivityKind::Study),
            "Break" => Ok(ActivityKind::Break),
            "School" => Ok(ActivityKind::School),
            "Tuition" => Ok(ActivityKind::Tuition),
            "Sleep" => Ok(ActivityKind::Sleep),
            other => Err(anyhow!("unknown activity kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timetable {
    pub id: i64,
    pub name: String,
}

/// One weekly recurring block. `day_of_week` is 1 (Monday) to 7 (Sunday);
/// minutes count from local midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledActivity {
    pub id: i64,
    pub timetable_id: i64,
    pub day_of_week: u8,
    pub start_minute: u32,
    pub end_minute: u32,
    pub title: String,
    #[serde(default)]
    pub kind: ActivityKind,
    #[serde(default)]
    pub note: Option<String>,
    pub notify_enabled: bool,
    #[serde(default)]
    pub lead_minutes: u32,
    #[serde(default)]
    pub announce_message: Option<String>,
}

impl ScheduledActivity {
    /// Minute of day the reminder fires. A lead longer than the start time
    /// clamps to midnight of the same day rather than reaching into the
    /// previous day.
    pub fn trigger_minute(&self) -> u32 {
        self.start_minute.saturating_sub(self.lead_minutes)
    }

    pub fn has_valid_bounds(&self) -> bool {
        self.start_minute < self.end_minute && self.end_minute <= MINUTES_PER_DAY
    }

    pub fn duration_minutes(&self) -> u32 {
        self.end_minute.saturating_sub(self.start_minute)
    }
}
