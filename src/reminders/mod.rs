//! Turning a weekly timetable into armed one-shot alarms, and re-arming them
//! after they fire or the machine restarts.

pub mod boot;
pub mod fire;
pub mod payload;
pub mod registry;
pub mod scheduler;
pub mod trigger;

pub use boot::{current_boot_time, detect_cold_boot, BootRecovery};
pub use fire::{FireHandler, FireReport};
pub use payload::{AlarmKey, AlarmPayload, AlertChannel, FocusGuardPayload, ReminderPayload};
pub use registry::{AlarmFacility, AlarmRegistry, Precision};
pub use scheduler::{
    ActiveTimetableRef, ActivitySource, Armed, ReminderOptions, ReminderScheduler,
    RescheduleSummary, ScheduleZone,
};
pub use trigger::next_trigger;
