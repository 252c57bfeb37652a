//! Host integrations: what the engine needs from the operating system, and
//! the desktop implementations of it.

pub mod alerts;
pub mod timer_table;

#[cfg(target_os = "linux")]
pub mod linux;

use std::sync::Arc;

use crate::reminders::AlertChannel;

pub use alerts::LogAlertSurface;
pub use timer_table::{FiredAlarm, TimerTable};

/// Foreground application introspection.
pub trait ForegroundProbe: Send + Sync {
    fn has_introspection_permission(&self) -> bool;

    /// Identifier of the application in front, if one can be determined.
    fn current_foreground_app(&self) -> Option<String>;

    /// Human-readable name for `app_id`, when the platform knows one.
    fn display_name(&self, _app_id: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderAlert {
    pub activity_id: i64,
    pub channel: AlertChannel,
    pub heading: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusNudge {
    pub app_id: String,
    pub app_name: String,
    pub activity_title: String,
}

/// Where alerts are shown. The focus nudge is low priority.
pub trait AlertSurface: Send + Sync {
    fn show_reminder(&self, alert: &ReminderAlert) -> anyhow::Result<()>;

    /// Speaks `message`. Only used with [`AlertChannel::SilentAnnounce`].
    fn announce(&self, message: &str) -> anyhow::Result<()>;

    fn show_focus_nudge(&self, nudge: &FocusNudge) -> anyhow::Result<()>;
}

/// Probe for hosts without foreground introspection. Reports no permission,
/// so focus sessions never start.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedProbe;

impl ForegroundProbe for UnsupportedProbe {
    fn has_introspection_permission(&self) -> bool {
        false
    }

    fn current_foreground_app(&self) -> Option<String> {
        None
    }
}

/// Best probe available on this host.
pub fn native_probe() -> Arc<dyn ForegroundProbe> {
    #[cfg(target_os = "linux")]
    {
        if let Some(probe) = linux::X11ForegroundProbe::connect() {
            return Arc::new(probe);
        }
    }
    Arc::new(UnsupportedProbe)
}
