//! Mobile + OTP login for admins.
//!
//! The backend's login endpoint trusts the caller, so the mobile number is
//! first proven through a one-time password sent by an external
//! [`OtpProvider`]:
//! 1. look the mobile up with the login endpoint; it must belong to an admin
//! 2. send an OTP to `91<mobile>`
//! 3. verify the OTP, log in again and store the returned session

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use super::{ApiError, ApiRequest, Session, SessionClient, SessionStore, StoreError, Transport};
use crate::config::Config;
use crate::model::User;

const COUNTRY_CODE: &str = "91";

/// Failure reported by the OTP service, with its message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct OtpError(pub String);

/// Sends and verifies one-time passwords.
pub trait OtpProvider: Send + Sync {
    /// Send an OTP to `identifier`; returns the request id to verify against.
    fn send_otp(&self, identifier: &str) -> impl Future<Output = Result<String, OtpError>> + Send;

    fn verify_otp(
        &self,
        request_id: &str,
        otp: &str,
    ) -> impl Future<Output = Result<(), OtpError>> + Send;
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("please enter a valid 10-digit mobile number")]
    InvalidMobile,
    #[error("user not found, please check your mobile number")]
    UserNotFound,
    #[error("access denied, admin privileges required")]
    AccessDenied,
    #[error("please enter a valid OTP")]
    InvalidOtp,
    #[error("no OTP request pending, please resend the OTP")]
    NoPendingOtp,
    #[error("OTP failed: {0}")]
    Otp(#[from] OtpError),
    #[error("login response carried no token")]
    MissingToken,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    message: Option<String>,
}

/// Normalize a typed mobile number to its ten digits.
pub fn normalize_mobile(input: &str) -> Result<String, LoginError> {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 10 {
        Ok(digits)
    } else {
        Err(LoginError::InvalidMobile)
    }
}

/// Two-step login: [`send_otp`](Self::send_otp) then [`verify`](Self::verify).
pub struct LoginFlow<'a, T, S, P> {
    client: &'a SessionClient<T, S>,
    otp: &'a P,
    pending: Option<Pending>,
}

struct Pending {
    mobile: String,
    request_id: String,
}

impl<'a, T: Transport, S: SessionStore, P: OtpProvider> LoginFlow<'a, T, S, P> {
    pub fn new(client: &'a SessionClient<T, S>, otp: &'a P) -> Self {
        Self {
            client,
            otp,
            pending: None,
        }
    }

    /// Mobile awaiting OTP verification, if any.
    pub fn pending_mobile(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.mobile.as_str())
    }

    /// Confirm the mobile belongs to an admin, then send the OTP.
    ///
    /// Calling it again resends a fresh OTP.
    pub async fn send_otp(&mut self, mobile: &str) -> Result<(), LoginError> {
        self.pending = None;
        let mobile = normalize_mobile(mobile)?;

        self.lookup_admin(&mobile).await?;

        let request_id = self
            .otp
            .send_otp(&format!("{COUNTRY_CODE}{mobile}"))
            .await?;
        info!(mobile = %mobile, "otp sent");
        self.pending = Some(Pending { mobile, request_id });
        Ok(())
    }

    /// Verify the OTP and start the session.
    pub async fn verify(&mut self, otp: &str) -> Result<Session, LoginError> {
        let otp = otp.trim();
        if otp.len() < 4 || !otp.chars().all(|c| c.is_ascii_digit()) {
            return Err(LoginError::InvalidOtp);
        }
        let pending = self.pending.as_ref().ok_or(LoginError::NoPendingOtp)?;

        self.otp.verify_otp(&pending.request_id, otp).await?;
        debug!("otp verified");

        let response = self.lookup_admin(&pending.mobile).await?;
        let auth_token = response
            .auth_token
            .filter(|t| !t.is_empty())
            .ok_or(LoginError::MissingToken)?;
        let session = Session {
            auth_token,
            user: response.user.unwrap_or_default(),
            message: response.message,
        };

        self.client.begin_session(session.clone())?;
        self.pending = None;
        info!(user = %session.user.display_name(), "logged in");
        Ok(session)
    }

    /// Abandon the pending OTP and return to the mobile step.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Call the login endpoint, bypassing token refresh.
    async fn lookup_admin(&self, mobile: &str) -> Result<LoginResponse, LoginError> {
        let request = ApiRequest::post(self.client.auth_path("login"))
            .json(&json!({ "mobile": mobile }))
            .map_err(ApiError::from)?;
        let response = self
            .client
            .transport()
            .send(request)
            .await
            .map_err(ApiError::from)?;

        match response.status {
            200 => {}
            401 | 404 => return Err(LoginError::UserNotFound),
            403 => return Err(LoginError::AccessDenied),
            status => return Err(ApiError::from_status(status, response.message()).into()),
        }

        let body: LoginResponse = response.json().map_err(ApiError::from)?;
        match &body.user {
            None => Err(LoginError::UserNotFound),
            Some(user) if !user.is_admin() => Err(LoginError::AccessDenied),
            Some(_) => Ok(body),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Msg91Request<'a> {
    widget_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    identifier: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    req_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    otp: Option<&'a str>,
}

#[derive(Deserialize)]
struct Msg91Response {
    r#type: Option<String>,
    message: Option<String>,
}

/// MSG91 OTP widget over HTTP.
#[derive(Debug, Clone)]
pub struct Msg91Otp {
    client: reqwest::Client,
    base_url: String,
    widget_id: String,
    auth_key: String,
}

impl Msg91Otp {
    /// Client for the widget, bounded by the configured request timeout.
    pub fn new(
        widget_id: impl Into<String>,
        auth_key: impl Into<String>,
        config: &Config,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: "https://control.msg91.com/api/v5/widget".to_string(),
            widget_id: widget_id.into(),
            auth_key: auth_key.into(),
        })
    }

    async fn call(&self, endpoint: &str, body: &Msg91Request<'_>) -> Result<String, OtpError> {
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.base_url))
            .header("authkey", &self.auth_key)
            .json(body)
            .send()
            .await
            .map_err(|e| OtpError(e.to_string()))?
            .json::<Msg91Response>()
            .await
            .map_err(|e| OtpError(e.to_string()))?;

        let message = response.message.unwrap_or_default();
        if response.r#type.as_deref() == Some("success") {
            Ok(message)
        } else if message.is_empty() {
            Err(OtpError(format!("{endpoint} failed")))
        } else {
            Err(OtpError(message))
        }
    }
}

impl OtpProvider for Msg91Otp {
    async fn send_otp(&self, identifier: &str) -> Result<String, OtpError> {
        let body = Msg91Request {
            widget_id: &self.widget_id,
            identifier: Some(identifier),
            req_id: None,
            otp: None,
        };
        self.call("sendOtp", &body).await
    }

    async fn verify_otp(&self, request_id: &str, otp: &str) -> Result<(), OtpError> {
        let body = Msg91Request {
            widget_id: &self.widget_id,
            identifier: None,
            req_id: Some(request_id),
            otp: Some(otp),
        };
        self.call("verifyOtp", &body).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, session_client};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeOtp {
        sent_to: Mutex<Vec<String>>,
        reject_code: bool,
    }

    impl OtpProvider for FakeOtp {
        async fn send_otp(&self, identifier: &str) -> Result<String, OtpError> {
            self.sent_to.lock().unwrap().push(identifier.to_string());
            Ok("req-1".into())
        }

        async fn verify_otp(&self, request_id: &str, otp: &str) -> Result<(), OtpError> {
            assert_eq!(request_id, "req-1");
            if self.reject_code || otp != "1234" {
                return Err(OtpError("OTP not match".into()));
            }
            Ok(())
        }
    }

    const ADMIN_LOGIN: &str = r#"{
        "authToken": "tok-1",
        "user": {"_id": "admin-1", "firstname": "Meera", "role": "admin"},
        "message": "Login successful"
    }"#;

    fn backend(status: u16, body: &str) -> FakeBackend {
        FakeBackend::new("tok-1").public("POST", "/admin/login", status, body)
    }

    #[test]
    fn mobile_is_normalized() {
        assert_eq!(normalize_mobile("98765 43210").unwrap(), "9876543210");
        assert!(matches!(
            normalize_mobile("12345"),
            Err(LoginError::InvalidMobile)
        ));
    }

    #[tokio::test]
    async fn full_login_stores_session() {
        let client = session_client(backend(200, ADMIN_LOGIN), None);
        let otp = FakeOtp::default();
        let mut flow = LoginFlow::new(&client, &otp);

        flow.send_otp("9876543210").await.unwrap();
        assert_eq!(*otp.sent_to.lock().unwrap(), vec!["919876543210"]);
        assert_eq!(flow.pending_mobile(), Some("9876543210"));

        let session = flow.verify("1234").await.unwrap();
        assert_eq!(session.auth_token, "tok-1");
        assert_eq!(client.store().get(), Some(session));
        assert_eq!(client.transport().refresh_calls(), 0);
    }

    #[tokio::test]
    async fn non_admin_is_denied_before_otp() {
        let body = r#"{"authToken":"t","user":{"_id":"c1","role":"customer"}}"#;
        let client = session_client(backend(200, body), None);
        let otp = FakeOtp::default();
        let mut flow = LoginFlow::new(&client, &otp);

        let err = flow.send_otp("9876543210").await.unwrap_err();
        assert!(matches!(err, LoginError::AccessDenied));
        assert!(otp.sent_to.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_mobile_is_not_found() {
        let client = session_client(backend(404, r#"{"message":"User not found"}"#), None);
        let otp = FakeOtp::default();
        let mut flow = LoginFlow::new(&client, &otp);

        let err = flow.send_otp("9876543210").await.unwrap_err();
        assert!(matches!(err, LoginError::UserNotFound));
    }

    #[tokio::test]
    async fn wrong_otp_keeps_user_logged_out() {
        let client = session_client(backend(200, ADMIN_LOGIN), None);
        let otp = FakeOtp::default();
        let mut flow = LoginFlow::new(&client, &otp);

        flow.send_otp("9876543210").await.unwrap();
        let err = flow.verify("9999").await.unwrap_err();

        assert!(matches!(err, LoginError::Otp(_)));
        assert!(client.store().get().is_none());
        // can retry with the same request
        assert!(flow.verify("1234").await.is_ok());
    }

    #[tokio::test]
    async fn verify_requires_pending_request() {
        let client = session_client(backend(200, ADMIN_LOGIN), None);
        let otp = FakeOtp::default();
        let mut flow = LoginFlow::new(&client, &otp);

        assert!(matches!(
            flow.verify("1234").await,
            Err(LoginError::NoPendingOtp)
        ));
        assert!(matches!(flow.verify("12").await, Err(LoginError::InvalidOtp)));
    }

    #[tokio::test]
    async fn msg91_gives_up_after_configured_timeout() {
        // accepts connections into the backlog but never answers
        let silent = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = Config {
            timeout: std::time::Duration::from_millis(100),
            ..Config::default()
        };
        let mut otp = Msg91Otp::new("widget", "key", &config).unwrap();
        otp.base_url = format!("http://{}", silent.local_addr().unwrap());

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            otp.send_otp("919876543210"),
        )
        .await
        .expect("request outlived the configured timeout");

        assert!(result.is_err());
    }
}
