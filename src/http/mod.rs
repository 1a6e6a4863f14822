//! Authenticated HTTP pipeline
//!
//! Every outgoing call is stamped with the current bearer token and
//! identity headers. When the backend reports the token expired (401 on a
//! non-excluded endpoint), the request is handed to the refresh
//! coordinator: exactly one refresh runs no matter how many requests are
//! failing concurrently, and each failed request is transparently replayed
//! once against the new token.
//!
//! The login/register endpoints legitimately answer 401 for bad
//! credentials and are excluded from the refresh trigger, as is the
//! refresh endpoint itself.

pub mod authenticator;
pub mod refresh;
pub mod retry;

use std::sync::Arc;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ClientError;
use crate::session::{Identity, SessionStore};

use refresh::RefreshCoordinator;

/// Login endpoint (public, refresh-excluded).
pub const LOGIN_PATH: &str = "/api/v1/user/public/login";
/// Registration endpoint (public, refresh-excluded).
pub const REGISTER_PATH: &str = "/api/v1/user/public/register";
/// Token refresh endpoint (credential carried by cookie).
pub const REFRESH_PATH: &str = "/api/v1/user/public/refresh";
/// Logout endpoint (authenticated, best-effort).
pub const LOGOUT_PATH: &str = "/api/v1/user/logout";

/// Endpoints whose 401 responses must never trigger a token refresh.
const REFRESH_EXEMPT: &[&str] = &[LOGIN_PATH, REGISTER_PATH, REFRESH_PATH];

/// Whether a 401 from this path is a legitimate business answer rather
/// than a stale-token signal.
pub(crate) fn is_refresh_exempt(path: &str) -> bool {
    REFRESH_EXEMPT.contains(&path)
}

/// A captured outgoing request: enough to issue it, and to replay it once
/// through the retry dispatcher should the token turn out stale.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Path relative to the configured base URL
    pub path: String,
    /// Optional JSON body
    pub body: Option<serde_json::Value>,
    /// Extra headers beyond the auth headers
    pub headers: Vec<(String, String)>,
    /// Set when the request has already been replayed once; a 401 on a
    /// retried request is terminal and never triggers another refresh.
    pub retried: bool,
}

impl ApiRequest {
    /// Create a request with no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            retried: false,
        }
    }

    /// GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST request with a JSON body.
    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        let mut request = Self::new(Method::POST, path);
        request.body = Some(body);
        request
    }

    /// PUT request with a JSON body.
    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        let mut request = Self::new(Method::PUT, path);
        request.body = Some(body);
        request
    }

    /// DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach an extra header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A completed HTTP exchange.
#[derive(Debug)]
pub struct ApiResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw response body
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as lossy text, for error messages.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Issue a captured request once: build the URL, stamp auth headers from
/// the current session snapshot, send, and collect the response. Shared by
/// the client, the retry dispatcher and nothing else.
pub(crate) async fn send_request(
    http: &reqwest::Client,
    config: &Config,
    session: &SessionStore,
    request: &ApiRequest,
) -> Result<ApiResponse, ClientError> {
    let url = config.api_url(&request.path);
    let mut builder = http.request(request.method.clone(), &url);

    let token = session.token();
    let identity = session.identity();
    builder = authenticator::authenticate(builder, token.as_deref(), identity.as_ref());

    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }

    let response = builder.send().await?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();
    Ok(ApiResponse {
        status,
        headers,
        body,
    })
}

/// Map a completed exchange to a result: success passes through, 401 maps
/// to `Unauthorized`, anything else to a status error.
pub(crate) fn into_result(response: ApiResponse) -> Result<ApiResponse, ClientError> {
    if response.status.is_success() {
        Ok(response)
    } else if response.status == StatusCode::UNAUTHORIZED {
        Err(ClientError::Unauthorized)
    } else {
        Err(ClientError::status(
            response.status.as_u16(),
            response.text(),
        ))
    }
}

/// Extract a bearer token from an `Authorization` response header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers
        .get(reqwest::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Login credentials.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Registration payload.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub nickname: String,
}

/// Profile fields returned by the auth endpoints.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: i64,
    pub nickname: String,
}

/// Authenticated HTTP client for the marketplace backend.
///
/// Cheap to clone; clones share the session store and the refresh
/// coordinator, so the single-flight guarantee holds across all of them.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<Config>,
    session: SessionStore,
    refresh: RefreshCoordinator,
}

impl ApiClient {
    /// Build a client over the given configuration and session store.
    ///
    /// The underlying HTTP client keeps a cookie store: the refresh
    /// credential issued at login travels as a cookie.
    pub fn new(config: Config, session: SessionStore) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.http_timeout())
            .build()?;
        let config = Arc::new(config);
        let refresh = RefreshCoordinator::new(http.clone(), config.clone(), session.clone());
        Ok(Self {
            http,
            config,
            session,
            refresh,
        })
    }

    /// The session store this client reads tokens from.
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute a request through the authenticated pipeline.
    ///
    /// A 401 from a non-excluded, not-yet-retried request enters the
    /// refresh coordinator; every other outcome is surfaced directly.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let response = send_request(&self.http, &self.config, &self.session, &request).await?;

        if response.status != StatusCode::UNAUTHORIZED
            || request.retried
            || is_refresh_exempt(&request.path)
        {
            return into_result(response);
        }

        tracing::debug!(
            "[Auth] 401 on {} {}, entering refresh pipeline",
            request.method,
            request.path
        );
        self.refresh.recover(request).await
    }

    /// GET a JSON resource.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.execute(ApiRequest::get(path)).await?.json()
    }

    /// POST a JSON body, decoding a JSON response.
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, ClientError> {
        self.execute(ApiRequest::post(path, serde_json::to_value(body)?))
            .await?
            .json()
    }

    /// PUT a JSON body, decoding a JSON response.
    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, ClientError> {
        self.execute(ApiRequest::put(path, serde_json::to_value(body)?))
            .await?
            .json()
    }

    /// DELETE a resource.
    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.execute(ApiRequest::delete(path)).await?;
        Ok(())
    }

    /// Log in. On success the access token (from the `Authorization`
    /// response header) and the identity are written to the session store.
    ///
    /// A 401 here means bad credentials and is surfaced immediately; the
    /// login endpoint never triggers a refresh.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<UserProfile, ClientError> {
        let request = ApiRequest::post(LOGIN_PATH, serde_json::to_value(credentials)?);
        let response = send_request(&self.http, &self.config, &self.session, &request).await?;
        let response = into_result(response)?;

        let token = bearer_token(&response.headers).ok_or_else(|| {
            ClientError::protocol("login response missing Authorization header")
        })?;
        let profile: UserProfile = response.json()?;

        self.session.set_token(token);
        self.session.set_identity(Identity {
            user_id: profile.user_id,
            nickname: profile.nickname.clone(),
        });
        tracing::info!("[Auth] logged in as user {}", profile.user_id);
        Ok(profile)
    }

    /// Register a new account. Does not log in.
    pub async fn register(&self, registration: &RegisterRequest) -> Result<(), ClientError> {
        let request = ApiRequest::post(REGISTER_PATH, serde_json::to_value(registration)?);
        let response = send_request(&self.http, &self.config, &self.session, &request).await?;
        into_result(response)?;
        Ok(())
    }

    /// Log out: best-effort notification to the backend, then clear the
    /// local session unconditionally.
    pub async fn logout(&self) {
        let request = ApiRequest::new(Method::POST, LOGOUT_PATH);
        if let Err(err) = send_request(&self.http, &self.config, &self.session, &request).await {
            tracing::debug!("[Auth] logout call failed (ignored): {}", err);
        }
        self.session.clear();
        tracing::info!("[Auth] logged out, session cleared");
    }
}
