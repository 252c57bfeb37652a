//! Per-module switchable logging macros.
//!
//! Every module that logs through these defines two constants:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! const LOG_TARGET: &str = "studyguard::focus";
//!
//! use crate::{log_info, log_warn};
//! log_info!("focus session started");
//! ```
//! The target lets `RUST_LOG=studyguard::focus=debug` single out one component
//! while `ENABLE_LOGS = false` silences a module without touching call sites.

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!(target: LOG_TARGET, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!(target: LOG_TARGET, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Errors are never silenced by `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        log::error!(target: LOG_TARGET, $($arg)*);
    }};
}

/// Installs the process-wide logger. Reads `RUST_LOG`; falls back to `Info`,
/// or `Debug` when `debug` is set.
pub fn init(debug: bool) {
    let default_level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(default_level);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    // A second init (tests, embedded hosts) keeps the first logger.
    let _ = builder.try_init();
}
