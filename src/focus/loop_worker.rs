use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    platform::{AlertSurface, FocusNudge, ForegroundProbe},
    utils::Clock,
};

use super::{restricted::RestrictedApps, throttle::FocusAlertThrottle};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "studyguard::focus";

use crate::{log_debug, log_error, log_info};

/// Everything a focus session needs from the outside.
#[derive(Clone)]
pub struct FocusDeps {
    pub probe: Arc<dyn ForegroundProbe>,
    pub restricted: Arc<dyn RestrictedApps>,
    pub surface: Arc<dyn AlertSurface>,
    pub clock: Arc<dyn Clock>,
    pub poll_interval: Duration,
    pub cooldown: Duration,
    pub host_app_id: String,
}

/// Samples the foreground app every `poll_interval` until `window_end` or
/// cancellation. The first sample is taken one interval after start.
pub async fn focus_loop(
    window_end: DateTime<Utc>,
    activity_title: String,
    deps: FocusDeps,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + deps.poll_interval, deps.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let cooldown = TimeDelta::from_std(deps.cooldown).unwrap_or(TimeDelta::minutes(2));
    let mut throttle = FocusAlertThrottle::new(cooldown);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("focus session for '{activity_title}' stopped");
                break;
            }
            _ = ticker.tick() => {}
        }

        if cancel_token.is_cancelled() {
            break;
        }

        let now = deps.clock.now();
        if now >= window_end {
            log_info!("focus window for '{activity_title}' ended");
            break;
        }

        check_foreground(&deps, &activity_title, &mut throttle, now);
    }
}

fn check_foreground(
    deps: &FocusDeps,
    activity_title: &str,
    throttle: &mut FocusAlertThrottle,
    now: DateTime<Utc>,
) {
    let Some(app_id) = deps.probe.current_foreground_app() else {
        return;
    };
    let app_key = app_id.to_lowercase();

    if app_key == deps.host_app_id.to_lowercase() {
        return;
    }
    if !deps.restricted.is_restricted(&app_key) {
        return;
    }
    if !throttle.can_alert(&app_key, now) {
        log_debug!("{app_key} still within nudge cooldown");
        return;
    }

    let app_name = deps.probe.display_name(&app_id).unwrap_or_else(|| app_id.clone());
    let nudge = FocusNudge {
        app_id: app_key,
        app_name,
        activity_title: activity_title.to_string(),
    };
    log_info!("nudging: {} during '{activity_title}'", nudge.app_name);
    match deps.surface.show_focus_nudge(&nudge) {
        Ok(()) => throttle.record_alert(&nudge.app_id, now),
        // Not recorded, so the next tick tries again.
        Err(err) => log_error!("failed to show focus nudge: {err:#}"),
    }
}
