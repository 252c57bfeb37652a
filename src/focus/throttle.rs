use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

/// Last nudge time per app within one focus session.
#[derive(Debug)]
pub struct FocusAlertThrottle {
    cooldown: TimeDelta,
    last_alert: HashMap<String, DateTime<Utc>>,
}

impl FocusAlertThrottle {
    pub fn new(cooldown: TimeDelta) -> Self {
        Self {
            cooldown,
            last_alert: HashMap::new(),
        }
    }

    /// True when `app_id` has not been nudged within the cooldown.
    pub fn can_alert(&self, app_id: &str, now: DateTime<Utc>) -> bool {
        self.last_alert
            .get(app_id)
            .map_or(true, |last| now - *last >= self.cooldown)
    }

    /// Starts the cooldown. Only called once a nudge was actually shown.
    pub fn record_alert(&mut self, app_id: &str, now: DateTime<Utc>) {
        self.last_alert.insert(app_id.to_string(), now);
    }
}
