use std::sync::Arc;

use crate::{
    focus::{FocusMonitor, StartOutcome},
    jobs::{JobKind, JobQueue},
    platform::{AlertSurface, FiredAlarm, ReminderAlert},
};

use super::payload::{AlarmPayload, AlertChannel, ReminderPayload};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "studyguard::fire";

use crate::{log_error, log_info};

/// What one fired alarm led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireReport {
    pub alerted: bool,
    pub focus: Option<StartOutcome>,
    pub enqueued: bool,
}

/// Alarm callback. Renders from the embedded payload only and never touches
/// the activity store; re-arming is left to the job queue.
pub struct FireHandler {
    surface: Arc<dyn AlertSurface>,
    focus: Arc<FocusMonitor>,
    queue: Arc<dyn JobQueue>,
}

impl FireHandler {
    pub fn new(
        surface: Arc<dyn AlertSurface>,
        focus: Arc<FocusMonitor>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            surface,
            focus,
            queue,
        }
    }

    pub fn on_fire(&self, fired: FiredAlarm) -> FireReport {
        let mut report = FireReport {
            alerted: false,
            focus: None,
            enqueued: false,
        };

        match &fired.payload {
            AlarmPayload::Reminder(payload) => {
                report.alerted = self.show_reminder(payload);
            }
            AlarmPayload::FocusGuard(payload) => {
                report.focus = Some(self.focus.start(payload.window_end, payload.title()));
            }
        }

        match self.queue.enqueue(JobKind::Reschedule(fired.key)) {
            Ok(()) => report.enqueued = true,
            Err(err) => log_error!("failed to enqueue re-arm of {}: {err:#}", fired.key),
        }
        report
    }

    fn show_reminder(&self, payload: &ReminderPayload) -> bool {
        let channel = payload.channel();
        let alert = ReminderAlert {
            activity_id: payload.activity_id,
            channel,
            heading: payload.heading().to_string(),
            title: payload.title.clone(),
            body: payload.body.clone(),
        };

        if let Err(err) = self.surface.show_reminder(&alert) {
            log_error!("failed to show reminder for activity {}: {err:#}", payload.activity_id);
            return false;
        }

        if channel == AlertChannel::SilentAnnounce {
            if let Some(message) = payload.announce_message.as_deref() {
                if let Err(err) = self.surface.announce(message) {
                    log_error!("failed to announce for activity {}: {err:#}", payload.activity_id);
                }
            }
        }
        log_info!("reminder shown for activity {} ({channel:?})", payload.activity_id);
        true
    }
}
