use anyhow::Result;

use crate::reminders::AlertChannel;

use super::{AlertSurface, FocusNudge, ReminderAlert};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "studyguard::alerts";

use crate::{log_info, log_warn};

/// Alert surface for headless hosts: every alert becomes a log record, with
/// urgent reminders raised to warnings so they stand out.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSurface;

impl AlertSurface for LogAlertSurface {
    fn show_reminder(&self, alert: &ReminderAlert) -> Result<()> {
        match alert.channel {
            AlertChannel::Urgent => {
                log_warn!("[{}] {}: {}", alert.heading, alert.title, alert.body);
            }
            AlertChannel::Default | AlertChannel::SilentAnnounce => {
                log_info!("[{}] {}: {}", alert.heading, alert.title, alert.body);
            }
        }
        Ok(())
    }

    fn announce(&self, message: &str) -> Result<()> {
        log_info!("announce: {message}");
        Ok(())
    }

    fn show_focus_nudge(&self, nudge: &FocusNudge) -> Result<()> {
        log_info!(
            "{} is open during {}. Back to it?",
            nudge.app_name,
            nudge.activity_title
        );
        Ok(())
    }
}
