use chrono::{DateTime, Utc};

use crate::reminders::{AlarmKey, AlarmPayload};

/// Persisted row of the host timer table.
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmRow {
    pub key: AlarmKey,
    pub fire_at: DateTime<Utc>,
    pub exact: bool,
    pub payload: AlarmPayload,
}
