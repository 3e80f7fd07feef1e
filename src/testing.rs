//! Scripted backend shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde_json::json;

use crate::config::Config;
use crate::model::{Customer, User};
use crate::session::{
    ApiRequest, ApiResponse, MemoryStore, Session, SessionClient, Transport, TransportError,
};

struct Route {
    status: u16,
    body: String,
    public: bool,
}

enum Refresh {
    Grant(String),
    Reply(u16, String),
}

#[derive(Default)]
struct Calls {
    valid_token: String,
    reject_all: bool,
    refresh: usize,
    logout: usize,
    requests: Vec<ApiRequest>,
}

/// In-process stand-in for the admin backend.
///
/// Protected routes answer 401 unless the bearer matches the currently valid
/// token. `/admin/refresh` and `/admin/logout` are built in.
pub(crate) struct FakeBackend {
    routes: HashMap<(String, String), Route>,
    timeouts: Vec<String>,
    refresh: Refresh,
    refresh_delay: Duration,
    logout_status: u16,
    calls: Mutex<Calls>,
}

impl FakeBackend {
    pub fn new(valid_token: &str) -> Self {
        Self {
            routes: HashMap::new(),
            timeouts: Vec::new(),
            refresh: Refresh::Reply(401, r#"{"message":"Refresh token expired"}"#.into()),
            refresh_delay: Duration::from_millis(50),
            logout_status: 200,
            calls: Mutex::new(Calls {
                valid_token: valid_token.into(),
                ..Calls::default()
            }),
        }
    }

    /// Token-protected route.
    pub fn route(mut self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.routes.insert(
            (method.into(), path.into()),
            Route {
                status,
                body: body.into(),
                public: false,
            },
        );
        self
    }

    /// Route that answers regardless of credentials.
    pub fn public(mut self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.routes.insert(
            (method.into(), path.into()),
            Route {
                status,
                body: body.into(),
                public: true,
            },
        );
        self
    }

    pub fn timeout(mut self, path: &str) -> Self {
        self.timeouts.push(path.into());
        self
    }

    /// Refresh hands out `token` and makes it the valid one.
    pub fn refresh_grants(mut self, token: &str) -> Self {
        self.refresh = Refresh::Grant(token.into());
        self
    }

    pub fn refresh_fails(self, status: u16) -> Self {
        self.refresh_replies(status, r#"{"message":"Refresh token expired"}"#)
    }

    pub fn refresh_replies(mut self, status: u16, body: &str) -> Self {
        self.refresh = Refresh::Reply(status, body.into());
        self
    }

    pub fn logout_status(mut self, status: u16) -> Self {
        self.logout_status = status;
        self
    }

    /// Protected routes answer 401 whatever the token.
    pub fn reject_all_tokens(self) -> Self {
        self.calls().reject_all = true;
        self
    }

    /// Invalidate the current token, as the backend does when it expires.
    pub fn expire_token(&self) {
        self.calls().valid_token = "expired".into();
    }

    pub fn refresh_calls(&self) -> usize {
        self.calls().refresh
    }

    pub fn logout_calls(&self) -> usize {
        self.calls().logout
    }

    /// Every request received, in arrival order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.calls().requests.clone()
    }

    /// Last request received for `path`.
    pub fn last_request(&self, path: &str) -> Option<ApiRequest> {
        self.requests().into_iter().rev().find(|r| r.path == path)
    }

    fn calls(&self) -> MutexGuard<'_, Calls> {
        self.calls.lock().unwrap()
    }

    fn respond(&self, request: &ApiRequest) -> ApiResponse {
        let key = (request.method.as_str().to_string(), request.path.clone());
        let Some(route) = self.routes.get(&key) else {
            return ApiResponse::new(404, r#"{"message":"Route not found"}"#);
        };
        if !route.public {
            let calls = self.calls();
            if calls.reject_all || request.bearer.as_deref() != Some(calls.valid_token.as_str()) {
                return ApiResponse::new(401, r#"{"message":"Token expired"}"#);
            }
        }
        ApiResponse::new(route.status, route.body.clone())
    }
}

impl Transport for FakeBackend {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.calls().requests.push(request.clone());

        if self.timeouts.contains(&request.path) {
            return Err(TransportError::Timeout);
        }

        match request.path.as_str() {
            "/admin/refresh" => {
                self.calls().refresh += 1;
                tokio::time::sleep(self.refresh_delay).await;
                Ok(match &self.refresh {
                    Refresh::Grant(token) => {
                        self.calls().valid_token = token.clone();
                        ApiResponse::new(200, json!({ "authToken": token }).to_string())
                    }
                    Refresh::Reply(status, body) => ApiResponse::new(*status, body.clone()),
                })
            }
            "/admin/logout" => {
                self.calls().logout += 1;
                Ok(ApiResponse::new(self.logout_status, Vec::new()))
            }
            _ => Ok(self.respond(&request)),
        }
    }
}

pub(crate) fn admin_user() -> User {
    User {
        id: Some("admin-1".into()),
        firstname: Some("Meera".into()),
        role: Some("admin".into()),
        mobile: Some("9876543210".into()),
        ..User::default()
    }
}

pub(crate) fn admin_session(token: &str) -> Session {
    Session {
        auth_token: token.into(),
        user: admin_user(),
        message: None,
    }
}

pub(crate) fn session_client(
    backend: FakeBackend,
    session: Option<Session>,
) -> SessionClient<FakeBackend, MemoryStore> {
    SessionClient::new(backend, MemoryStore::new(session), &Config::default())
}

pub(crate) fn customer(id: &str) -> Customer {
    Customer {
        id: id.into(),
        firstname: Some("Asha".into()),
        lastname: None,
        mobile: Some("9123456780".into()),
    }
}
