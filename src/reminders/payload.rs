//! What gets stored alongside a registered alarm. Everything needed to render
//! the alert travels in the payload so the fire path never reads the store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time_fmt::format_span;

/// Heading used when a reminder has no timetable name.
pub const DEFAULT_HEADING: &str = "StudyGuard";
const DEFAULT_GUARD_TITLE: &str = "Study";

/// Identity of a registered alarm. Each activity owns at most one reminder
/// and at most one focus-guard alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "activityId", rename_all = "camelCase")]
pub enum AlarmKey {
    Reminder(i64),
    FocusGuard(i64),
}

impl AlarmKey {
    pub fn activity_id(&self) -> i64 {
        match self {
            AlarmKey::Reminder(id) | AlarmKey::FocusGuard(id) => *id,
        }
    }

    /// Stable string form used as the `alarms.key` column.
    pub fn as_storage_key(&self) -> String {
        match self {
            AlarmKey::Reminder(id) => format!("reminder:{id}"),
            AlarmKey::FocusGuard(id) => format!("guard:{id}"),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (kind, id) = value.split_once(':')?;
        let id = id.parse::<i64>().ok()?;
        match kind {
            "reminder" => Some(AlarmKey::Reminder(id)),
            "guard" => Some(AlarmKey::FocusGuard(id)),
            _ => None,
        }
    }
}

impl fmt::Display for AlarmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_storage_key())
    }
}

/// Which alert surface a fired reminder goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertChannel {
    Default,
    /// Alarm-style alert with the ringtone.
    Urgent,
    /// No ringtone; the announcement is spoken instead.
    SilentAnnounce,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPayload {
    pub activity_id: i64,
    pub timetable_id: i64,
    pub timetable_name: Option<String>,
    pub title: String,
    pub body: String,
    pub day_of_week: u8,
    /// Present only when the message is non-blank and sound was enabled at
    /// scheduling time.
    pub announce_message: Option<String>,
    pub urgent: bool,
}

impl ReminderPayload {
    pub fn heading(&self) -> &str {
        self.timetable_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(DEFAULT_HEADING)
    }

    pub fn channel(&self) -> AlertChannel {
        if self.announce_message.is_some() {
            AlertChannel::SilentAnnounce
        } else if self.urgent {
            AlertChannel::Urgent
        } else {
            AlertChannel::Default
        }
    }
}

/// Builds `H:MM–H:MM title`, with ` (note)` appended when a note is set.
pub fn reminder_body(start_minute: u32, end_minute: u32, title: &str, note: Option<&str>) -> String {
    let mut body = format!("{} {title}", format_span(start_minute, end_minute));
    if let Some(note) = note.filter(|note| !note.trim().is_empty()) {
        body.push_str(&format!(" ({note})"));
    }
    body
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusGuardPayload {
    pub activity_id: i64,
    pub activity_title: String,
    pub window_end: DateTime<Utc>,
}

impl FocusGuardPayload {
    pub fn title(&self) -> &str {
        if self.activity_title.trim().is_empty() {
            DEFAULT_GUARD_TITLE
        } else {
            &self.activity_title
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AlarmPayload {
    Reminder(ReminderPayload),
    FocusGuard(FocusGuardPayload),
}

impl AlarmPayload {
    pub fn activity_id(&self) -> i64 {
        match self {
            AlarmPayload::Reminder(payload) => payload.activity_id,
            AlarmPayload::FocusGuard(payload) => payload.activity_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reminder(name: Option<&str>, announce: Option<&str>, urgent: bool) -> ReminderPayload {
        ReminderPayload {
            activity_id: 1,
            timetable_id: 1,
            timetable_name: name.map(str::to_string),
            title: "Math".into(),
            body: reminder_body(450, 510, "Math", None),
            day_of_week: 1,
            announce_message: announce.map(str::to_string),
            urgent,
        }
    }

    #[test]
    fn storage_key_round_trips() {
        for key in [AlarmKey::Reminder(42), AlarmKey::FocusGuard(7)] {
            assert_eq!(AlarmKey::parse(&key.as_storage_key()), Some(key));
        }
        assert_eq!(AlarmKey::parse("reminder:x"), None);
        assert_eq!(AlarmKey::parse("other:1"), None);
        assert_eq!(AlarmKey::parse("reminder"), None);
    }

    #[test]
    fn body_includes_note_only_when_present() {
        assert_eq!(reminder_body(450, 510, "Math", None), "7:30–8:30 Math");
        assert_eq!(
            reminder_body(450, 510, "Math", Some("chapter 4")),
            "7:30–8:30 Math (chapter 4)"
        );
        assert_eq!(reminder_body(450, 510, "Math", Some("  ")), "7:30–8:30 Math");
    }

    #[test]
    fn heading_falls_back_to_app_name() {
        assert_eq!(reminder(Some("Week A"), None, true).heading(), "Week A");
        assert_eq!(reminder(None, None, true).heading(), DEFAULT_HEADING);
        assert_eq!(reminder(Some(""), None, true).heading(), DEFAULT_HEADING);
    }

    #[test]
    fn announcement_selects_silent_channel() {
        assert_eq!(
            reminder(None, Some("Time for math"), true).channel(),
            AlertChannel::SilentAnnounce
        );
        assert_eq!(reminder(None, None, true).channel(), AlertChannel::Urgent);
        assert_eq!(reminder(None, None, false).channel(), AlertChannel::Default);
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = AlarmPayload::Reminder(reminder(Some("Week A"), None, true));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "reminder");
        assert_eq!(json["timetableName"], "Week A");
        let back: AlarmPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }
}
