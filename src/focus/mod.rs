//! Focus guard: while a study block runs, watch the foreground app and nudge
//! when a distracting one is in front.

pub mod controller;
pub mod loop_worker;
pub mod restricted;
pub mod throttle;

pub use controller::{FocusMonitor, FocusState, StartOutcome};
pub use loop_worker::{focus_loop, FocusDeps};
pub use restricted::{effective_restricted, RestrictedApps, BUILTIN_RESTRICTED_APPS};
pub use throttle::FocusAlertThrottle;
