//! Session Lifecycle Controller
//!
//! Orchestrates login, logout, validation and refresh against the injected
//! [`SessionApi`], keeps the [`SessionStore`] in sync and drives the
//! [`TimerCoordinator`]. State changes and notices are published on a
//! broadcast channel for the presentation layer.
//!
//! Lock order is always `timers` before `state`. Timer callbacks hold a weak
//! reference plus the generation they were armed for; a callback whose
//! generation is no longer current is a no-op.

use super::{
    ActiveTimers, Notification, SessionEvent, SessionState, SessionStore, TimerCoordinator,
    TransitionReason,
};
use crate::validation::{validate_login_form, validate_password_change};
use adportal_core::{
    async_callback, auth_error, log_operation_error, log_operation_start, log_operation_success,
    state_error, AccountStatus, AsyncCallback, ChangePasswordRequest, ErrorKind, ExpiresIn,
    LoginRequest, PortalError, PortalResult, RefreshResponse, Session, SessionApi,
    SessionSettings, User,
};
use chrono::Utc;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

const COMPONENT: &str = "session_controller";

/// Capacity of the event channel; warnings are sent on every tick
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Mutable lifecycle state
#[derive(Debug)]
struct ControllerState {
    phase: SessionState,
    session: Option<Session>,
    /// Bumped whenever a session is armed or torn down
    generation: u64,
}

struct ControllerInner {
    api: Arc<dyn SessionApi>,
    store: SessionStore,
    settings: SessionSettings,
    timers: Mutex<TimerCoordinator>,
    state: RwLock<ControllerState>,
    events: broadcast::Sender<SessionEvent>,
}

/// Owned session lifecycle controller.
///
/// Create one per application shell. Clones share the same session. Dropping
/// the last clone cancels every timer.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

impl SessionController {
    /// Build a controller; fails on settings the timers cannot run with
    pub fn new(
        api: Arc<dyn SessionApi>,
        store: SessionStore,
        settings: SessionSettings,
    ) -> PortalResult<Self> {
        settings.validate()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let timers = TimerCoordinator::new(settings.tick_interval(), settings.warning_threshold());

        Ok(Self {
            inner: Arc::new(ControllerInner {
                api,
                store,
                settings,
                timers: Mutex::new(timers),
                state: RwLock::new(ControllerState {
                    phase: SessionState::Unauthenticated,
                    session: None,
                    generation: 0,
                }),
                events,
            }),
        })
    }

    /// Receive state changes, notices and warnings
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.state.read().await.phase
    }

    pub async fn session(&self) -> Option<Session> {
        self.inner.state.read().await.session.clone()
    }

    pub async fn current_user(&self) -> Option<User> {
        let state = self.inner.state.read().await;
        state.session.as_ref().and_then(|session| session.user.clone())
    }

    pub async fn active_timers(&self) -> ActiveTimers {
        self.inner.timers.lock().await.active()
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    /// Sign in and arm the session timers.
    ///
    /// Expiry comes from the login response when present, else from a
    /// follow-up validate call. Without either the session runs without a
    /// countdown. Nothing is persisted unless the whole sign-in succeeds and
    /// no logout ran in the meantime.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        remember_me: bool,
    ) -> PortalResult<Session> {
        validate_login_form(username, password)?;
        let inner = &self.inner;
        let generation = inner.begin_sign_in("login").await?;

        log_operation_start!("login", username = %username);
        let request = LoginRequest::new(username.trim(), password, remember_me);

        let response = match inner.api.login(&request).await {
            Ok(response) => response,
            Err(e) => {
                inner.abort_sign_in(generation).await;
                log_operation_error!("login", e);
                return Err(e);
            }
        };

        let session_id = match response.session_id.as_deref() {
            Some(session_id) if response.success && !session_id.is_empty() => session_id.to_string(),
            _ => {
                inner.abort_sign_in(generation).await;
                let error = auth_error!(response.message.unwrap_or_default(), COMPONENT);
                log_operation_error!("login", error);
                return Err(error);
            }
        };

        let mut user = response.user;
        let mut expires_in = response.expiry.resolve(Utc::now());
        if expires_in.is_none() {
            debug!("Login response carried no expiry, asking the validate endpoint");
            match inner.api.validate_session(&session_id).await {
                Ok(validated) if validated.success => {
                    expires_in = validated.expiry().and_then(|expiry| expiry.resolve(Utc::now()));
                    if user.is_none() {
                        user = validated.user().cloned();
                    }
                }
                Ok(validated) => warn!(
                    "Validate after login was refused: {}",
                    validated.message.unwrap_or_default()
                ),
                Err(e) => warn!("Validate after login failed: {}", e),
            }
        }

        let session = inner
            .complete_sign_in(generation, session_id, user, expires_in, TransitionReason::Login)
            .await
            .map_err(|e| {
                log_operation_error!("login", e);
                e
            })?;

        log_operation_success!("login", session = %session.redacted_id());
        Ok(session)
    }

    /// Sign out. Local cleanup always happens, whatever the remote call does.
    pub async fn logout(&self) {
        self.inner.logout(TransitionReason::Logout).await;
    }

    /// Probe the stored session against the backend.
    ///
    /// Returns `true` and refreshes the user record when the backend confirms
    /// the session with a user payload. Anything else clears the local
    /// session and returns `false`.
    pub async fn validate_session(&self) -> bool {
        let inner = &self.inner;

        let (session_id, phase, generation) = {
            let state = inner.state.read().await;
            let session_id = state.session.as_ref().map(|session| session.session_id.clone());
            (session_id, state.phase, state.generation)
        };

        if phase == SessionState::Transitioning {
            debug!("Skipping validation while a transition is in flight");
            return false;
        }

        let Some(session_id) = session_id.or_else(|| inner.store.get_session().map(|s| s.session_id))
        else {
            return false;
        };

        match inner.api.validate_session(&session_id).await {
            Ok(response) if response.success => {
                if let Some(user) = response.user() {
                    inner.update_user(&session_id, user).await;
                    return true;
                }
                warn!("Validate response carried no user record");
            }
            Ok(response) => info!(
                "Session rejected by the backend: {}",
                response.message.unwrap_or_default()
            ),
            Err(e) => e.log(),
        }

        inner
            .tear_down(Some(generation), TransitionReason::Invalidated, None)
            .await;
        false
    }

    /// Resume a persisted session on startup.
    ///
    /// Returns `Ok(false)` when nothing is stored or the backend no longer
    /// accepts the stored session, which is then cleared.
    pub async fn restore(&self) -> PortalResult<bool> {
        let inner = &self.inner;
        if inner.state.read().await.phase.is_authenticated() {
            return Ok(true);
        }

        let Some(stored) = inner.store.get_session() else {
            return Ok(false);
        };

        let generation = inner.begin_sign_in("restore").await?;
        let session_id = stored.session_id;

        let validated = match inner.api.validate_session(&session_id).await {
            Ok(response) if response.success && response.user().is_some() => response,
            Ok(response) => {
                info!(
                    "Stored session rejected: {}",
                    response.message.unwrap_or_default()
                );
                inner.abort_restore(generation).await;
                return Ok(false);
            }
            Err(e) => {
                e.log();
                inner.abort_restore(generation).await;
                return Ok(false);
            }
        };

        let user = validated.user().cloned();
        let expires_in = match validated.expiry().and_then(|expiry| expiry.resolve(Utc::now())) {
            Some(expires_in) => Some(expires_in),
            None => inner.fetch_session_expiry(&session_id).await,
        };

        inner
            .complete_sign_in(generation, session_id, user, expires_in, TransitionReason::Restored)
            .await?;
        Ok(true)
    }

    /// Change the password, then sign out after the configured delay
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> PortalResult<()> {
        let inner = &self.inner;
        let (session_id, generation) = inner
            .require_session("You must be signed in to change your password")
            .await?;

        validate_password_change(
            current_password,
            new_password,
            confirm_password,
            inner.settings.min_password_length,
        )?;

        log_operation_start!("change_password");
        let request = ChangePasswordRequest {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
        };

        let ack = inner
            .api
            .change_password(&session_id, &request)
            .await
            .map_err(|e| {
                log_operation_error!("change_password", e);
                e
            })?;

        if !ack.success {
            let error = auth_error!(ack.message.unwrap_or_default(), COMPONENT);
            log_operation_error!("change_password", error);
            return Err(error);
        }

        {
            let mut timers = inner.timers.lock().await;
            if inner.state.read().await.generation != generation {
                // Signed out while the request was in flight
                return Ok(());
            }
            timers.schedule_forced_logout(
                inner.settings.forced_logout_delay(),
                inner.forced_logout_callback(generation),
            );
        }

        inner.emit(SessionEvent::Notification(Notification::password_changed()));
        log_operation_success!("change_password");
        Ok(())
    }

    /// Profile of the signed-in user; also refreshes the stored record
    pub async fn profile(&self) -> PortalResult<User> {
        let inner = &self.inner;
        let (session_id, generation) = inner
            .require_session("You must be signed in to view your profile")
            .await?;

        let response = match inner.api.get_profile(&session_id).await {
            Ok(response) => response,
            Err(e) => return Err(inner.session_call_failed(generation, e).await),
        };

        match response.data {
            Some(user) if response.success => {
                inner.update_user(&session_id, &user).await;
                Ok(user)
            }
            _ => Err(auth_error!(response.message.unwrap_or_default(), COMPONENT)),
        }
    }

    /// Directory account status of the signed-in user
    pub async fn account_status(&self) -> PortalResult<AccountStatus> {
        let inner = &self.inner;
        let (session_id, generation) = inner
            .require_session("You must be signed in to view your account status")
            .await?;

        let response = match inner.api.get_account_status(&session_id).await {
            Ok(response) => response,
            Err(e) => return Err(inner.session_call_failed(generation, e).await),
        };

        match response.data {
            Some(status) if response.success => Ok(status),
            _ => Err(auth_error!(response.message.unwrap_or_default(), COMPONENT)),
        }
    }

    /// Cancel every timer and detach pending callbacks.
    ///
    /// The controller drops back to `Unauthenticated` without emitting events.
    /// Persisted state is left alone, so `restore` can resume the session.
    /// An in-flight sign-in fails with a `StateError`.
    pub async fn shutdown(&self) {
        let mut timers = self.inner.timers.lock().await;
        timers.cancel_all();
        let mut state = self.inner.state.write().await;
        state.generation += 1;
        state.phase = SessionState::Unauthenticated;
        state.session = None;
        info!("Session controller shut down");
    }
}

impl ControllerInner {
    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn persist_user(&self, user: &User) {
        if let Err(e) = self.store.set_user(user) {
            warn!("Failed to persist user record: {}", e);
        }
    }

    /// Enter `Transitioning` from `Unauthenticated`
    async fn begin_sign_in(&self, operation: &str) -> PortalResult<u64> {
        let mut state = self.state.write().await;
        match state.phase {
            SessionState::Unauthenticated => {
                state.phase = SessionState::Transitioning;
                state.generation += 1;
                Ok(state.generation)
            }
            SessionState::Transitioning => Err(state_error!(
                "Another sign-in or sign-out is already in progress",
                COMPONENT
            )),
            SessionState::Authenticated => Err(state_error!(
                format!("Cannot {} while already signed in", operation),
                COMPONENT
            )),
        }
    }

    /// Leave `Transitioning` after a failed sign-in, unless a logout took over
    async fn abort_sign_in(&self, generation: u64) {
        let mut state = self.state.write().await;
        if state.generation == generation {
            state.phase = SessionState::Unauthenticated;
            state.session = None;
        }
    }

    /// Drop a rejected stored session, unless a logout took over
    async fn abort_restore(&self, generation: u64) {
        let _timers = self.timers.lock().await;
        let mut state = self.state.write().await;
        if state.generation != generation {
            return;
        }
        if let Err(e) = self.store.clear_session() {
            warn!("Failed to clear rejected session: {}", e);
        }
        state.phase = SessionState::Unauthenticated;
        state.session = None;
    }

    /// Best-effort remote logout of a session nobody will use
    async fn release_orphan(&self, session_id: &str) {
        debug!("Releasing session from a cancelled sign-in");
        if let Err(e) = self.api.logout(session_id).await {
            warn!("Failed to release cancelled session: {}", e);
        }
    }

    /// Commit a sign-in: persist, set `Authenticated`, arm timers, notify.
    ///
    /// The store is only written once the generation is confirmed under the
    /// locks, so a stale sign-in never touches a newer session's claim.
    async fn complete_sign_in(
        self: &Arc<Self>,
        generation: u64,
        session_id: String,
        user: Option<User>,
        expires_in: Option<ExpiresIn>,
        reason: TransitionReason,
    ) -> PortalResult<Session> {
        let now = Utc::now();
        let session = Session {
            session_id,
            user,
            expires_at: expires_in.map(|expires_in| expires_in.deadline_from(now)),
        };

        {
            let mut timers = self.timers.lock().await;
            let mut state = self.state.write().await;

            if state.generation != generation {
                drop(state);
                drop(timers);
                // A logout ran while the sign-in was in flight
                self.release_orphan(&session.session_id).await;
                return Err(state_error!("Sign-in was cancelled", COMPONENT));
            }

            if let Err(e) = self.store.set_session(&session.session_id, session.user.as_ref()) {
                if let Err(clear_error) = self.store.clear_session() {
                    clear_error.log();
                }
                state.phase = SessionState::Unauthenticated;
                state.session = None;
                return Err(e);
            }

            state.phase = SessionState::Authenticated;
            state.session = Some(session.clone());
            drop(state);

            match expires_in {
                Some(expires_in) => self.arm_countdown(&mut timers, generation, expires_in),
                None => info!("Session expiry unknown, relying on server-side enforcement"),
            }
            self.arm_auto_refresh(&mut timers, generation, session.session_id.clone());
        }

        info!(session = %session.redacted_id(), ?reason, "Session established");
        self.emit(SessionEvent::StateChanged {
            state: SessionState::Authenticated,
            user: session.user.clone(),
            reason,
        });
        if reason == TransitionReason::Login {
            self.emit(SessionEvent::Notification(Notification::signed_in(
                session.user.as_ref(),
            )));
        }

        Ok(session)
    }

    fn arm_countdown(
        self: &Arc<Self>,
        timers: &mut TimerCoordinator,
        generation: u64,
        expires_in: ExpiresIn,
    ) {
        let weak = Arc::downgrade(self);
        let on_warning = {
            let weak = Weak::clone(&weak);
            async_callback(move |minutes_left: u64| {
                let weak = Weak::clone(&weak);
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_warning(generation, minutes_left).await;
                    }
                }
            })
        };
        let on_expire = async_callback(move |_: ()| {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.on_expired(generation).await;
                }
            }
        });

        timers.start_countdown(expires_in, on_warning, on_expire);
    }

    fn arm_auto_refresh(
        self: &Arc<Self>,
        timers: &mut TimerCoordinator,
        generation: u64,
        session_id: String,
    ) {
        let weak = Arc::downgrade(self);
        let on_success = {
            let weak = Weak::clone(&weak);
            async_callback(move |response: RefreshResponse| {
                let weak = Weak::clone(&weak);
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_refreshed(generation, response).await;
                    }
                }
            })
        };
        let on_error = async_callback(move |error: PortalError| {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.on_refresh_failed(generation, error).await;
                }
            }
        });

        timers.start_auto_refresh(
            Arc::clone(&self.api),
            session_id,
            self.settings.refresh_interval(),
            on_success,
            on_error,
        );
    }

    fn forced_logout_callback(self: &Arc<Self>, generation: u64) -> AsyncCallback<()> {
        let weak = Arc::downgrade(self);
        async_callback(move |_: ()| {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(inner) = weak.upgrade() {
                    if inner.is_current(generation).await {
                        info!("Signing out after password change");
                        inner.logout(TransitionReason::PasswordChanged).await;
                    }
                }
            }
        })
    }

    /// Authenticated and armed for `generation`
    async fn is_current(&self, generation: u64) -> bool {
        let state = self.state.read().await;
        state.phase.is_authenticated() && state.generation == generation
    }

    async fn require_session(&self, message: &str) -> PortalResult<(String, u64)> {
        let state = self.state.read().await;
        match (&state.phase, &state.session) {
            (SessionState::Authenticated, Some(session)) => {
                Ok((session.session_id.clone(), state.generation))
            }
            _ => Err(state_error!(message, COMPONENT)),
        }
    }

    async fn on_warning(&self, generation: u64, minutes_left: u64) {
        if !self.is_current(generation).await {
            return;
        }
        debug!(minutes_left, "Session expiring soon");
        self.emit(SessionEvent::SessionWarning { minutes_left });
    }

    async fn on_expired(&self, generation: u64) {
        if !self.is_current(generation).await {
            return;
        }
        info!("Session expired");
        self.tear_down(
            Some(generation),
            TransitionReason::Expired,
            Some(Notification::session_expired()),
        )
        .await;
    }

    async fn on_refreshed(self: &Arc<Self>, generation: u64, response: RefreshResponse) {
        let Some(session_id) = self.current_session_id(generation).await else {
            return;
        };

        let expires_in = match response.expiry.resolve(Utc::now()) {
            Some(expires_in) => Some(expires_in),
            None => self.fetch_session_expiry(&session_id).await,
        };

        if let Some(expires_in) = expires_in {
            let mut timers = self.timers.lock().await;
            let mut state = self.state.write().await;
            if !state.phase.is_authenticated() || state.generation != generation {
                return;
            }
            if let Some(session) = state.session.as_mut() {
                session.expires_at = Some(expires_in.deadline_from(Utc::now()));
            }
            drop(state);
            self.arm_countdown(&mut timers, generation, expires_in);
        } else if !self.is_current(generation).await {
            return;
        }

        info!(
            expires_in_secs = expires_in.map(|e| e.as_secs()),
            "Session refreshed"
        );
        self.emit(SessionEvent::Refreshed {
            expires_in: expires_in.map(|e| e.as_secs()),
        });
    }

    async fn on_refresh_failed(&self, generation: u64, error: PortalError) {
        if !self.is_current(generation).await {
            return;
        }
        warn!("Session refresh failed: {}", error);
        self.emit(SessionEvent::Notification(Notification::refresh_failed(
            error.user_message(),
        )));
    }

    async fn current_session_id(&self, generation: u64) -> Option<String> {
        let state = self.state.read().await;
        if !state.phase.is_authenticated() || state.generation != generation {
            return None;
        }
        state.session.as_ref().map(|session| session.session_id.clone())
    }

    /// Expiry from the session metadata endpoint, if it discloses one
    async fn fetch_session_expiry(&self, session_id: &str) -> Option<ExpiresIn> {
        match self.api.session_info(session_id).await {
            Ok(info) if info.success => info.expiry.resolve(Utc::now()),
            Ok(info) => {
                debug!(
                    "Session info refused: {}",
                    info.message.unwrap_or_default()
                );
                None
            }
            Err(e) => {
                warn!("Failed to fetch session info: {}", e);
                None
            }
        }
    }

    async fn update_user(&self, session_id: &str, user: &User) {
        self.persist_user(user);
        let mut state = self.state.write().await;
        if let Some(session) = state.session.as_mut() {
            if session.session_id == session_id {
                session.user = Some(user.clone());
            }
        }
    }

    /// An `AuthError` means the backend dropped the session
    async fn session_call_failed(&self, generation: u64, error: PortalError) -> PortalError {
        if error.kind() == ErrorKind::Auth && self.is_current(generation).await {
            info!("Backend rejected the session, signing out locally");
            self.tear_down(
                Some(generation),
                TransitionReason::Invalidated,
                Some(Notification::session_rejected()),
            )
            .await;
        } else {
            error.log();
        }
        error
    }

    /// Full logout: stop timers, best-effort remote call, local cleanup
    async fn logout(&self, reason: TransitionReason) {
        let session_id = {
            let mut timers = self.timers.lock().await;
            let mut state = self.state.write().await;
            let stored = self.store.get_session().map(|s| s.session_id);
            if state.phase == SessionState::Unauthenticated
                && state.session.is_none()
                && stored.is_none()
            {
                debug!("Nothing to sign out");
                return;
            }

            timers.cancel_all();
            state.generation += 1;
            state.phase = SessionState::Transitioning;
            state
                .session
                .take()
                .map(|session| session.session_id)
                .or(stored)
        };
        log_operation_start!("logout");

        if let Some(session_id) = session_id {
            match self.api.logout(&session_id).await {
                Ok(ack) if ack.success => debug!("Remote logout acknowledged"),
                Ok(ack) => warn!(
                    "Remote logout refused: {}",
                    ack.message.unwrap_or_default()
                ),
                Err(e) => warn!("Remote logout failed, signing out locally: {}", e),
            }
        }

        let notice = match reason {
            TransitionReason::PasswordChanged => Notification::signed_out_after_password_change(),
            _ => Notification::signed_out(),
        };
        self.tear_down(None, reason, Some(notice)).await;
        log_operation_success!("logout");
    }

    /// Local half of every sign-out.
    ///
    /// With `Some(generation)` nothing happens unless that generation is still
    /// current, which turns stray timer callbacks into no-ops.
    async fn tear_down(
        &self,
        generation: Option<u64>,
        reason: TransitionReason,
        notice: Option<Notification>,
    ) {
        {
            let mut timers = self.timers.lock().await;
            let mut state = self.state.write().await;
            if let Some(generation) = generation {
                if state.generation != generation {
                    return;
                }
            }
            timers.cancel_all();
            state.generation += 1;
            state.phase = SessionState::Unauthenticated;
            state.session = None;

            if let Err(e) = self.store.clear_session() {
                e.log();
            }
        }

        info!(?reason, "Session ended");
        self.emit(SessionEvent::StateChanged {
            state: SessionState::Unauthenticated,
            user: None,
            reason,
        });
        if let Some(notice) = notice {
            self.emit(SessionEvent::Notification(notice));
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}
