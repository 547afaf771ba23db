//! Shared fixtures for the session integration tests

#![allow(dead_code)]

use adportal_core::{
    auth_error, network_error, AccountStatus, AccountStatusResponse, ApiAck,
    ChangePasswordRequest, ExpiryMetadata, LoginRequest, LoginResponse, PortalResult,
    ProfileResponse, RefreshResponse, SessionApi, SessionInfoResponse, SessionSettings, User,
    ValidatePayload, ValidateResponse,
};
use adportal_session::{SessionController, SessionEvent, SessionStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SESSION_ID: &str = "session-alice-0001";
pub const NEWER_SESSION_ID: &str = "session-alice-0002";

/// Scripted outcome of a mock call
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    AuthError(&'static str),
    NetworkError,
}

impl<T: Clone> Reply<T> {
    fn result(&self) -> PortalResult<T> {
        match self {
            Reply::Ok(value) => Ok(value.clone()),
            Reply::AuthError(message) => Err(auth_error!(message, "mock_api")),
            Reply::NetworkError => Err(network_error!("connection refused", "mock_api")),
        }
    }
}

pub fn alice() -> User {
    User::new("alice").with_display_name("Alice Liddell")
}

pub fn login_ok(expiry: ExpiryMetadata) -> LoginResponse {
    login_as(SESSION_ID, expiry)
}

pub fn login_as(session_id: &str, expiry: ExpiryMetadata) -> LoginResponse {
    LoginResponse {
        success: true,
        session_id: Some(session_id.to_string()),
        user: Some(alice()),
        expiry,
        message: None,
    }
}

pub fn validate_ok(user: Option<User>, expiry: ExpiryMetadata) -> ValidateResponse {
    ValidateResponse {
        success: true,
        data: Some(ValidatePayload { user, expiry }),
        message: None,
    }
}

/// Session API double with per-operation replies and call counters.
///
/// A reply is picked when the call starts; a delay set with
/// [`MockSessionApi::delay_next`] holds only the next call of that operation.
pub struct MockSessionApi {
    login: Mutex<Reply<LoginResponse>>,
    logout: Mutex<Reply<ApiAck>>,
    validate: Mutex<Reply<ValidateResponse>>,
    refresh: Mutex<Reply<RefreshResponse>>,
    session_info: Mutex<Reply<SessionInfoResponse>>,
    profile: Mutex<Reply<ProfileResponse>>,
    account_status: Mutex<Reply<AccountStatusResponse>>,
    change_password: Mutex<Reply<ApiAck>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
}

impl Default for MockSessionApi {
    fn default() -> Self {
        Self {
            login: Mutex::new(Reply::Ok(login_ok(ExpiryMetadata::from_secs(1800.0)))),
            logout: Mutex::new(Reply::Ok(ApiAck::ok())),
            validate: Mutex::new(Reply::Ok(validate_ok(Some(alice()), ExpiryMetadata::default()))),
            refresh: Mutex::new(Reply::Ok(RefreshResponse {
                success: true,
                ..Default::default()
            })),
            session_info: Mutex::new(Reply::Ok(SessionInfoResponse {
                success: true,
                ..Default::default()
            })),
            profile: Mutex::new(Reply::Ok(ProfileResponse::ok(
                alice().with_attribute("department", serde_json::json!("R&D")),
            ))),
            account_status: Mutex::new(Reply::Ok(AccountStatusResponse::ok(AccountStatus {
                enabled: true,
                locked: false,
                password_expired: false,
                password_last_set: Some("2026-09-01T08:00:00Z".to_string()),
                password_expires_at: None,
                last_logon: None,
                attributes: Default::default(),
            }))),
            change_password: Mutex::new(Reply::Ok(ApiAck::ok())),
            calls: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
        }
    }
}

impl MockSessionApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_login(&self, reply: Reply<LoginResponse>) {
        *self.login.lock().unwrap() = reply;
    }

    pub fn on_logout(&self, reply: Reply<ApiAck>) {
        *self.logout.lock().unwrap() = reply;
    }

    pub fn on_validate(&self, reply: Reply<ValidateResponse>) {
        *self.validate.lock().unwrap() = reply;
    }

    pub fn on_refresh(&self, reply: Reply<RefreshResponse>) {
        *self.refresh.lock().unwrap() = reply;
    }

    pub fn on_session_info(&self, reply: Reply<SessionInfoResponse>) {
        *self.session_info.lock().unwrap() = reply;
    }

    pub fn on_profile(&self, reply: Reply<ProfileResponse>) {
        *self.profile.lock().unwrap() = reply;
    }

    pub fn on_change_password(&self, reply: Reply<ApiAck>) {
        *self.change_password.lock().unwrap() = reply;
    }

    /// Hold the next `operation` call for `delay` before it returns
    pub fn delay_next(&self, operation: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(operation, delay);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    async fn record<T: Clone>(
        &self,
        operation: &'static str,
        reply: &Mutex<Reply<T>>,
    ) -> PortalResult<T> {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
        let result = reply.lock().unwrap().result();
        let delay = self.delays.lock().unwrap().remove(operation);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[async_trait]
impl SessionApi for MockSessionApi {
    async fn login(&self, _request: &LoginRequest) -> PortalResult<LoginResponse> {
        self.record("login", &self.login).await
    }

    async fn logout(&self, _session_id: &str) -> PortalResult<ApiAck> {
        self.record("logout", &self.logout).await
    }

    async fn validate_session(&self, _session_id: &str) -> PortalResult<ValidateResponse> {
        self.record("validate", &self.validate).await
    }

    async fn refresh_session(&self, _session_id: &str) -> PortalResult<RefreshResponse> {
        self.record("refresh", &self.refresh).await
    }

    async fn session_info(&self, _session_id: &str) -> PortalResult<SessionInfoResponse> {
        self.record("session_info", &self.session_info).await
    }

    async fn get_profile(&self, _session_id: &str) -> PortalResult<ProfileResponse> {
        self.record("profile", &self.profile).await
    }

    async fn get_account_status(&self, _session_id: &str) -> PortalResult<AccountStatusResponse> {
        self.record("account_status", &self.account_status).await
    }

    async fn change_password(
        &self,
        _session_id: &str,
        _request: &ChangePasswordRequest,
    ) -> PortalResult<ApiAck> {
        self.record("change_password", &self.change_password).await
    }
}

/// Controller wired to `api` with the default timings and an in-memory store
pub fn controller(api: &Arc<MockSessionApi>) -> SessionController {
    controller_with_store(api, SessionStore::in_memory())
}

pub fn controller_with_store(api: &Arc<MockSessionApi>, store: SessionStore) -> SessionController {
    let api: Arc<dyn SessionApi> = api.clone();
    SessionController::new(api, store, SessionSettings::default()).unwrap()
}

/// Run a login on its own task so the caller can act while it is in flight
pub fn spawn_login(
    controller: &SessionController,
) -> tokio::task::JoinHandle<PortalResult<adportal_core::Session>> {
    let controller = controller.clone();
    tokio::spawn(async move { controller.login("alice", "pw", false).await })
}

/// Collects every event published by a controller
pub struct EventLog {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl EventLog {
    pub fn attach(controller: &SessionController) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut receiver = controller.subscribe();
        let sink = Arc::clone(&events);

        tokio::spawn(async move {
            while let Ok(event) = receiver.recv().await {
                sink.lock().unwrap().push(event);
            }
        });

        Self { events }
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::SessionWarning { minutes_left } => Some(minutes_left),
                _ => None,
            })
            .collect()
    }

    pub fn notification_titles(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Notification(notification) => Some(notification.title),
                _ => None,
            })
            .collect()
    }

    pub fn transitions(&self) -> Vec<SessionEvent> {
        self.events()
            .into_iter()
            .filter(|event| matches!(event, SessionEvent::StateChanged { .. }))
            .collect()
    }
}
