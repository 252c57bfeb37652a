use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::error::{Result, ScheduleError};

use super::payload::{AlarmKey, AlarmPayload};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "studyguard::reminders";

use crate::{log_debug, log_warn};

/// Platform wake-up facility. Registrations are expected to outlive the
/// process but not a reboot.
pub trait AlarmFacility: Send + Sync {
    fn can_schedule_exact(&self) -> bool;

    /// May return [`ScheduleError::ExactAlarmDenied`] even after
    /// `can_schedule_exact` reported true; the permission can be revoked at
    /// any time.
    fn register_exact(&self, key: AlarmKey, at: DateTime<Utc>, payload: AlarmPayload)
        -> Result<()>;

    /// Fires no earlier than `at`, possibly later, and is allowed while idle.
    fn register_inexact(
        &self,
        key: AlarmKey,
        at: DateTime<Utc>,
        payload: AlarmPayload,
    ) -> Result<()>;

    /// Cancelling an unknown key is not an error.
    fn cancel(&self, key: AlarmKey) -> Result<()>;

    fn registered(&self) -> Vec<(AlarmKey, DateTime<Utc>)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Exact,
    Inexact,
}

/// Keyed, overwrite-on-register view over an [`AlarmFacility`].
pub struct AlarmRegistry {
    facility: Arc<dyn AlarmFacility>,
    // Serializes cancel-then-set pairs so two registrations for one key
    // cannot interleave.
    serial: Mutex<()>,
}

impl AlarmRegistry {
    pub fn new(facility: Arc<dyn AlarmFacility>) -> Self {
        Self {
            facility,
            serial: Mutex::new(()),
        }
    }

    /// Replaces any registration for `key`. Falls back to an inexact wake-up
    /// when exact alarms are unavailable or refused.
    pub fn register(
        &self,
        key: AlarmKey,
        at: DateTime<Utc>,
        payload: AlarmPayload,
    ) -> Result<Precision> {
        let _guard = match self.serial.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        self.facility.cancel(key)?;

        if self.facility.can_schedule_exact() {
            match self.facility.register_exact(key, at, payload.clone()) {
                Ok(()) => {
                    log_debug!("registered exact alarm {key} at {at}");
                    return Ok(Precision::Exact);
                }
                Err(ScheduleError::ExactAlarmDenied) => {
                    log_warn!("exact alarm refused for {key}; falling back to inexact");
                }
                Err(err) => return Err(err),
            }
        } else {
            log_debug!("exact alarms unavailable; registering {key} inexact");
        }

        self.facility.register_inexact(key, at, payload)?;
        Ok(Precision::Inexact)
    }

    pub fn cancel(&self, key: AlarmKey) -> Result<()> {
        let _guard = match self.serial.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.facility.cancel(key)
    }

    pub fn registered(&self) -> Vec<(AlarmKey, DateTime<Utc>)> {
        self.facility.registered()
    }
}
