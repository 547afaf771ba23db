//! Timer Coordinator - expiry countdown, auto-refresh and forced logout
//!
//! Every activity runs as a cancellable background task. Starting an activity
//! always cancels the previous instance of the same kind first, so at most one
//! of each is alive per coordinator.

use super::ActiveTimers;
use adportal_core::{
    auth_error, AsyncCallback, CancelSignal, ExpiresIn, PortalError, RefreshResponse, SessionApi,
    TaskHandle,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Whole minutes left, rounded up
pub fn minutes_left(remaining: Duration) -> u64 {
    let millis = remaining.as_millis();
    millis.div_ceil(60_000) as u64
}

/// Owner of the session's scheduled activities
#[derive(Debug)]
pub struct TimerCoordinator {
    tick_interval: Duration,
    warning_threshold: Duration,
    countdown: Option<TaskHandle>,
    refresh: Option<TaskHandle>,
    forced_logout: Option<TaskHandle>,
}

impl TimerCoordinator {
    /// `tick_interval` must be non-zero
    pub fn new(tick_interval: Duration, warning_threshold: Duration) -> Self {
        Self {
            tick_interval,
            warning_threshold,
            countdown: None,
            refresh: None,
            forced_logout: None,
        }
    }

    /// Arm the expiry countdown.
    ///
    /// `on_warning` runs on every tick while the remaining time is inside the
    /// warning window. `on_expire` runs exactly once when the deadline is
    /// reached, after which the countdown stops. A zero `expires_in` expires
    /// on the first tick; one too large to schedule arms nothing.
    pub fn start_countdown(
        &mut self,
        expires_in: ExpiresIn,
        on_warning: AsyncCallback<u64>,
        on_expire: AsyncCallback<()>,
    ) {
        self.stop_countdown();

        let start = Instant::now();
        let Some(deadline) = start.checked_add(expires_in.as_duration()) else {
            warn!(
                expires_in_secs = expires_in.as_secs(),
                "Session expiry is beyond the clock range, running without a countdown"
            );
            return;
        };
        let tick = self.tick_interval;
        let warning_threshold = self.warning_threshold;

        info!(expires_in_secs = expires_in.as_secs(), "Starting session countdown");

        self.countdown = Some(TaskHandle::spawn(
            "session_countdown",
            move |mut signal: CancelSignal| async move {
                let mut interval = tokio::time::interval_at(start, tick);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = signal.cancelled() => break,
                        _ = interval.tick() => {}
                    }
                    if signal.is_cancelled() {
                        break;
                    }

                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        info!("Session countdown reached zero");
                        on_expire(()).await;
                        break;
                    }

                    if remaining <= warning_threshold {
                        on_warning(minutes_left(remaining)).await;
                    }
                }
            },
        ));
    }

    /// Arm the periodic auto-refresh.
    ///
    /// The first refresh happens one `period` from now. A failed refresh is
    /// reported through `on_error` and the loop waits for the next tick.
    pub fn start_auto_refresh(
        &mut self,
        api: Arc<dyn SessionApi>,
        session_id: String,
        period: Duration,
        on_success: AsyncCallback<RefreshResponse>,
        on_error: AsyncCallback<PortalError>,
    ) {
        self.stop_auto_refresh();

        info!(period_secs = period.as_secs(), "Starting session auto-refresh");

        self.refresh = Some(TaskHandle::spawn(
            "session_auto_refresh",
            move |mut signal: CancelSignal| async move {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = signal.cancelled() => break,
                        _ = interval.tick() => {}
                    }
                    if signal.is_cancelled() {
                        break;
                    }

                    debug!("Refreshing session");
                    let result = tokio::select! {
                        _ = signal.cancelled() => break,
                        result = api.refresh_session(&session_id) => result,
                    };
                    if signal.is_cancelled() {
                        break;
                    }

                    match result {
                        Ok(response) if response.success => on_success(response).await,
                        Ok(response) => {
                            let message = response.message.unwrap_or_default();
                            warn!("Session refresh was refused: {}", message);
                            on_error(auth_error!(message, "timer_coordinator")).await;
                        }
                        Err(e) => {
                            e.log();
                            on_error(e).await;
                        }
                    }
                }
            },
        ));
    }

    /// Run `on_fire` once after `delay`, replacing any pending forced logout
    pub fn schedule_forced_logout(&mut self, delay: Duration, on_fire: AsyncCallback<()>) {
        if let Some(mut previous) = self.forced_logout.take() {
            debug!("Replacing pending forced logout");
            previous.cancel();
        }

        info!(delay_ms = delay.as_millis() as u64, "Scheduling forced logout");

        self.forced_logout = Some(TaskHandle::spawn(
            "forced_logout",
            move |mut signal: CancelSignal| async move {
                tokio::select! {
                    _ = signal.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                if !signal.is_cancelled() {
                    on_fire(()).await;
                }
            },
        ));
    }

    pub fn stop_countdown(&mut self) {
        if let Some(mut handle) = self.countdown.take() {
            handle.cancel();
        }
    }

    pub fn stop_auto_refresh(&mut self) {
        if let Some(mut handle) = self.refresh.take() {
            handle.cancel();
        }
    }

    /// Cancel every activity. No callback fires after this returns.
    pub fn cancel_all(&mut self) {
        self.stop_countdown();
        self.stop_auto_refresh();
        if let Some(mut handle) = self.forced_logout.take() {
            handle.cancel();
        }
    }

    pub fn active(&self) -> ActiveTimers {
        let is_active = |handle: &Option<TaskHandle>| handle.as_ref().is_some_and(TaskHandle::is_active);
        ActiveTimers {
            countdown: is_active(&self.countdown),
            auto_refresh: is_active(&self.refresh),
            forced_logout: is_active(&self.forced_logout),
        }
    }
}
