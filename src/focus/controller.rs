use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{focus_loop, FocusDeps};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "studyguard::focus";

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    WindowPassed,
    PermissionMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum FocusState {
    Idle,
    #[serde(rename_all = "camelCase")]
    Active {
        window_end: DateTime<Utc>,
        activity_title: String,
    },
}

struct ActiveSession {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
    window_end: DateTime<Utc>,
    activity_title: String,
}

/// Owns at most one focus session at a time.
pub struct FocusMonitor {
    deps: FocusDeps,
    session: Mutex<Option<ActiveSession>>,
}

impl FocusMonitor {
    pub fn new(deps: FocusDeps) -> Self {
        Self {
            deps,
            session: Mutex::new(None),
        }
    }

    fn session(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Begins watching the foreground app until `window_end`. A running
    /// session is cancelled and replaced. Must be called inside a runtime.
    pub fn start(&self, window_end: DateTime<Utc>, activity_title: &str) -> StartOutcome {
        if self.deps.clock.now() >= window_end {
            log_info!("focus window for '{activity_title}' already over");
            return StartOutcome::WindowPassed;
        }
        if !self.deps.probe.has_introspection_permission() {
            log_warn!("cannot watch foreground apps; focus guard for '{activity_title}' skipped");
            return StartOutcome::PermissionMissing;
        }

        let mut session = self.session();
        if let Some(previous) = session.take() {
            log_info!("replacing focus session for '{}'", previous.activity_title);
            previous.cancel_token.cancel();
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(focus_loop(
            window_end,
            activity_title.to_string(),
            self.deps.clone(),
            cancel_token.clone(),
        ));

        log_info!("focus session for '{activity_title}' until {window_end}");
        *session = Some(ActiveSession {
            cancel_token,
            handle,
            window_end,
            activity_title: activity_title.to_string(),
        });
        StartOutcome::Started
    }

    /// Cancels the running session and waits for it. Returns whether one was running.
    pub async fn stop(&self) -> Result<bool> {
        let Some(active) = self.session().take() else {
            return Ok(false);
        };
        let was_running = !active.handle.is_finished();
        active.cancel_token.cancel();
        active
            .handle
            .await
            .context("focus loop task failed to join")?;
        Ok(was_running)
    }

    pub fn state(&self) -> FocusState {
        let mut session = self.session();
        match session.as_ref() {
            Some(active) if !active.handle.is_finished() => FocusState::Active {
                window_end: active.window_end,
                activity_title: active.activity_title.clone(),
            },
            Some(_) => {
                *session = None;
                FocusState::Idle
            }
            None => FocusState::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state(), FocusState::Active { .. })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeDelta;
    use tokio::time::Duration;

    use super::*;
    use crate::{
        test_utils::{utc, FakeProbe, FakeSettings, RecordingAlerts, TokioClock},
        utils::Clock,
    };

    struct Harness {
        monitor: FocusMonitor,
        probe: Arc<FakeProbe>,
        alerts: Arc<RecordingAlerts>,
        clock: Arc<TokioClock>,
    }

    fn harness(permission: bool) -> Harness {
        let probe = Arc::new(FakeProbe::new(permission));
        let alerts = Arc::new(RecordingAlerts::default());
        let clock = Arc::new(TokioClock::starting_at(utc(2024, 1, 1, 16, 0)));
        let deps = FocusDeps {
            probe: probe.clone(),
            restricted: Arc::new(FakeSettings::default()),
            surface: alerts.clone(),
            clock: clock.clone(),
            poll_interval: Duration::from_secs(5),
            cooldown: Duration::from_secs(120),
            host_app_id: "studyguard".into(),
        };
        Harness {
            monitor: FocusMonitor::new(deps),
            probe,
            alerts,
            clock,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn nudges_once_per_cooldown_until_window_ends() {
        let h = harness(true);
        h.probe.set_foreground(Some("discord"));
        let window_end = h.clock.now() + TimeDelta::seconds(600);

        assert_eq!(h.monitor.start(window_end, "Math"), StartOutcome::Started);
        assert!(h.monitor.is_active());

        tokio::time::sleep(Duration::from_secs(700)).await;

        let nudges = h.alerts.nudges();
        assert_eq!(nudges.len(), 5);
        assert!(nudges.iter().all(|n| n.app_id == "discord" && n.activity_title == "Math"));
        assert_eq!(h.monitor.state(), FocusState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_nudge_is_retried_on_next_tick() {
        let h = harness(true);
        h.probe.set_foreground(Some("discord"));
        h.alerts.fail_next_nudges(1);
        let window_end = h.clock.now() + TimeDelta::seconds(600);

        assert_eq!(h.monitor.start(window_end, "Math"), StartOutcome::Started);
        // Ticks at 5s (fails) and 10s.
        tokio::time::sleep(Duration::from_secs(12)).await;

        assert_eq!(h.alerts.nudges().len(), 1);
        assert!(h.monitor.stop().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn past_window_does_not_poll() {
        let h = harness(true);
        h.probe.set_foreground(Some("discord"));
        let window_end = h.clock.now() - TimeDelta::seconds(1);

        assert_eq!(h.monitor.start(window_end, "Math"), StartOutcome::WindowPassed);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(h.alerts.nudges().is_empty());
        assert!(!h.monitor.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_permission_is_reported() {
        let h = harness(false);
        let window_end = h.clock.now() + TimeDelta::seconds(600);

        assert_eq!(
            h.monitor.start(window_end, "Math"),
            StartOutcome::PermissionMissing
        );
        assert!(!h.monitor.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn host_app_and_unrestricted_apps_are_ignored() {
        let h = harness(true);
        let window_end = h.clock.now() + TimeDelta::seconds(600);
        h.monitor.start(window_end, "Math");

        h.probe.set_foreground(Some("StudyGuard"));
        tokio::time::sleep(Duration::from_secs(30)).await;
        h.probe.set_foreground(Some("code"));
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(h.alerts.nudges().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_session_and_new_start_replaces_old() {
        let h = harness(true);
        h.probe.set_foreground(Some("steam"));
        let window_end = h.clock.now() + TimeDelta::seconds(600);

        h.monitor.start(window_end, "Math");
        h.monitor.start(window_end, "Physics");
        assert_eq!(
            h.monitor.state(),
            FocusState::Active {
                window_end,
                activity_title: "Physics".into()
            }
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(h.monitor.stop().await.unwrap());
        assert!(!h.monitor.stop().await.unwrap());

        tokio::time::sleep(Duration::from_secs(300)).await;
        let nudges = h.alerts.nudges();
        assert_eq!(nudges.len(), 1);
        assert_eq!(nudges[0].activity_title, "Physics");
    }
}
