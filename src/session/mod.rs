//! Authenticated transport with coordinated token refresh.
//!
//! Every request goes out with the stored bearer token. A 401 on a request
//! that has not been retried yet parks the request behind a single token
//! refresh shared by all requests that fail in the same window:
//! - refresh succeeds: the new token is persisted and every parked request
//!   is replayed with it
//! - refresh fails: every parked request fails with
//!   [`ApiError::SessionExpired`], the session is cleared, the backend is
//!   told to log out and a [`SessionEvent::Reload`] follows after a delay
//!
//! Timeouts and other transport failures never trigger a refresh.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{Mutex, broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::config::Config;

mod error;
pub use error::{ApiError, RefreshError, StoreError, TransportError};

mod store;
pub use store::{FileStore, MemoryStore, Session, SessionStore};

mod transport;
pub use transport::{ApiRequest, ApiResponse, FormPart, HttpTransport, RequestBody, Transport};

pub mod login;

/// Notifications for the UI shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    Refreshed,
    /// Refresh failed; show the "session expired" notice.
    Expired,
    LoggedOut,
    /// Reload the client at the unauthenticated entry point.
    Reload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    auth_token: Option<String>,
}

type RefreshOutcome = Result<String, RefreshError>;

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    /// Requests parked until the in-flight refresh settles
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

struct Inner<T, S> {
    transport: T,
    store: S,
    auth_prefix: String,
    reload_delay: Duration,
    refresh: Mutex<RefreshState>,
    events: broadcast::Sender<SessionEvent>,
}

/// Authenticated API client shared by everything that talks to the backend.
pub struct SessionClient<T, S> {
    inner: Arc<Inner<T, S>>,
}

impl<T, S> Clone for SessionClient<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Public API
impl<T: Transport, S: SessionStore> SessionClient<T, S> {
    pub fn new(transport: T, store: S, config: &Config) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                auth_prefix: config.auth_prefix.trim_end_matches('/').to_string(),
                reload_delay: config.reload_delay,
                refresh: Mutex::new(RefreshState::default()),
                events,
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Path of an auth endpoint (`login`, `refresh`, `logout`).
    pub fn auth_path(&self, endpoint: &str) -> String {
        self.inner.auth_path(endpoint)
    }

    /// Set the stored token as bearer credential; no token leaves the
    /// request unauthenticated.
    pub fn attach_token(&self, request: &mut ApiRequest) {
        if let Some(token) = self.inner.store.token() {
            request.bearer = Some(token);
        }
    }

    /// Send a request, recovering once from an expired token.
    ///
    /// Non-2xx statuses come back as classified [`ApiError`]s.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.attach_token(&mut request);
        let response = self.inner.transport.send(request.clone()).await?;

        if response.status != 401 || request.is_retry() {
            return response.into_result();
        }

        request.retried = true;
        debug!(path = %request.path, "authentication expired, awaiting token refresh");
        let token = self
            .refreshed_token()
            .await
            .map_err(ApiError::SessionExpired)?;

        request.bearer = Some(token);
        debug!(path = %request.path, "replaying request with refreshed token");
        self.inner.transport.send(request).await?.into_result()
    }

    /// Store a freshly authenticated session.
    pub fn begin_session(&self, session: Session) -> Result<(), StoreError> {
        self.inner.store.set(Some(session))?;
        let _ = self.inner.events.send(SessionEvent::LoggedIn);
        Ok(())
    }

    /// Log out: tell the backend (best effort) and clear the stored session.
    pub async fn logout(&self) -> Result<(), StoreError> {
        let token = self.inner.store.token();
        self.inner.backend_logout(token).await;
        self.inner.store.clear()?;
        let _ = self.inner.events.send(SessionEvent::LoggedOut);
        info!("logged out");
        Ok(())
    }
}

/// Private API
impl<T: Transport, S: SessionStore> SessionClient<T, S> {
    /// Wait for the outcome of the current refresh, starting one if none is
    /// in flight.
    async fn refreshed_token(&self) -> RefreshOutcome {
        let (tx, rx) = oneshot::channel();
        let lead = {
            let mut state = self.inner.refresh.lock().await;
            state.waiters.push(tx);
            !std::mem::replace(&mut state.in_flight, true)
        };

        if lead {
            // Runs on its own task so a dropped caller cannot strand the
            // other waiters.
            let inner = Arc::clone(&self.inner);
            tokio::spawn(inner.run_refresh());
        } else {
            debug!("refresh already in flight, queued");
        }

        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }
}

impl<T: Transport, S: SessionStore> Inner<T, S> {
    fn auth_path(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.auth_prefix)
    }

    async fn run_refresh(self: Arc<Self>) {
        let outcome = self.exchange_token().await;
        match &outcome {
            Ok(_) => {
                info!("auth token refreshed");
                let _ = self.events.send(SessionEvent::Refreshed);
            }
            Err(e) => {
                warn!(reason = %e, "token refresh failed, ending session");
                self.expire_session();
            }
        }

        let waiters = {
            let mut state = self.refresh.lock().await;
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };
        debug!(waiters = waiters.len(), "refresh settled");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Call the refresh endpoint and persist the new token.
    async fn exchange_token(&self) -> RefreshOutcome {
        let mut request = ApiRequest::post(self.auth_path("refresh"));
        request.bearer = self.store.token();

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(RefreshError::Rejected {
                status: response.status,
                message: response.message(),
            });
        }

        let token = response
            .json::<RefreshResponse>()
            .ok()
            .and_then(|body| body.auth_token)
            .filter(|token| !token.is_empty())
            .ok_or(RefreshError::MissingToken)?;

        match self.store.replace_token(token.clone()) {
            Ok(true) => Ok(token),
            Ok(false) => Err(RefreshError::SessionCleared),
            Err(e) => Err(RefreshError::Store(e.to_string())),
        }
    }

    /// Terminal refresh failure: notify, log out, clear, schedule reload.
    fn expire_session(self: &Arc<Self>) {
        let _ = self.events.send(SessionEvent::Expired);

        let token = self.store.token();
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.backend_logout(token).await });

        if let Err(e) = self.store.clear() {
            warn!(error = %e, "could not clear expired session");
        }

        let events = self.events.clone();
        let delay = self.reload_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SessionEvent::Reload);
        });
    }

    async fn backend_logout(&self, token: Option<String>) {
        let mut request = ApiRequest::post(self.auth_path("logout"));
        request.bearer = token;
        match self.transport.send(request).await {
            Ok(response) if response.is_success() => debug!("backend logout acknowledged"),
            Ok(response) => warn!(status = response.status, "backend logout rejected"),
            Err(e) => warn!(error = %e, "backend logout failed"),
        }
    }
}
