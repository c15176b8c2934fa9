//! HTTP client for the platform's authentication endpoints.
//!
//! Two calls, in order:
//!
//! 1. `POST /hopsworks-api/api/auth/service` with a form-encoded
//!    `email`/`password`. The response sets session cookies and echoes a
//!    bearer token in its `Authorization` header; both become a [`Session`].
//! 2. `POST /hopsworks-api/api/users/apiKey?name=..&scope=..` carrying the
//!    session's cookies and token. The JSON response holds the new key.
//!
//! Neither call is retried. Both reuse one pooled connection.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use hopsflow_models::{ApiKey, ApiKeyName, ApiKeyScope, PlatformScheme, ServiceCredentials, ServiceEndpoint, REDACTED};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cookies::CookieStore;
use crate::error::SdkError;

/// Service login endpoint.
pub const LOGIN_PATH: &str = "/hopsworks-api/api/auth/service";

/// API key issuance endpoint.
pub const API_KEY_PATH: &str = "/hopsworks-api/api/users/apiKey";

/// Read timeout applied to every platform connection.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How the platform's TLS certificate is checked.
///
/// Platform hosts present certificates from the cluster's internal CA and
/// are reached over the cluster network, so deployments historically skip
/// verification. That remains the default, but it is an explicit choice here
/// and every client built with it logs a warning.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum PlatformTrust {
    /// Accept any certificate; trust comes from network placement.
    #[default]
    NetworkPlacement,
    /// Verify against the default root store.
    SystemRoots,
    /// Verify against an additional PEM-encoded root.
    CaCertificate {
        /// Path of the PEM file.
        path: PathBuf,
    },
}

/// Connection settings shared by every platform client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformOptions {
    /// `https` in deployments.
    pub scheme: PlatformScheme,
    /// Certificate verification policy.
    pub trust: PlatformTrust,
    /// Read timeout per request.
    pub read_timeout: Duration,
}

impl Default for PlatformOptions {
    fn default() -> Self {
        Self {
            scheme: PlatformScheme::Https,
            trust: PlatformTrust::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Build the pooled HTTP client used for all platform calls.
pub fn build_http_client(options: &PlatformOptions) -> Result<reqwest::Client, SdkError> {
    let mut builder = reqwest::Client::builder().read_timeout(options.read_timeout);

    match &options.trust {
        PlatformTrust::NetworkPlacement => {
            warn!("TLS certificate verification disabled for platform calls (trust mode: network_placement)");
            builder = builder.danger_accept_invalid_certs(true);
        }
        PlatformTrust::SystemRoots => {}
        PlatformTrust::CaCertificate { path } => {
            let pem = std::fs::read(path).map_err(|e| {
                SdkError::Config(format!("cannot read CA certificate {}: {e}", path.display()))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                SdkError::Config(format!("invalid CA certificate {}: {e}", path.display()))
            })?;
            builder = builder.add_root_certificate(cert);
        }
    }

    Ok(builder.build()?)
}

/// `scheme://host:port` joined with an absolute path.
pub(crate) fn endpoint_url(
    endpoint: &ServiceEndpoint,
    scheme: PlatformScheme,
    path: &str,
) -> Result<Url, SdkError> {
    let origin = Url::parse(&endpoint.origin(scheme))
        .map_err(|e| SdkError::Config(format!("invalid platform endpoint {endpoint}: {e}")))?;
    origin
        .join(path)
        .map_err(|e| SdkError::Config(format!("invalid platform path {path}: {e}")))
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Cookies and bearer token obtained from a successful login.
///
/// Lives only as long as the bootstrap run; never persisted.
#[derive(Clone, Default)]
pub struct Session {
    cookies: CookieStore,
    authorization: Option<String>,
}

impl Session {
    /// Session cookies.
    pub fn cookies(&self) -> &CookieStore {
        &self.cookies
    }

    /// The login response's `Authorization` header, verbatim.
    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("cookies", &self.cookies.len())
            .field("authorization", &self.authorization.as_ref().map(|_| REDACTED))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for the login and API key endpoints of one platform endpoint.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    http: reqwest::Client,
    endpoint: ServiceEndpoint,
    scheme: PlatformScheme,
}

impl PlatformClient {
    /// Client for `endpoint` with its own connection pool.
    pub fn new(endpoint: ServiceEndpoint, options: &PlatformOptions) -> Result<Self, SdkError> {
        let http = build_http_client(options)?;
        Ok(Self {
            http,
            endpoint,
            scheme: options.scheme,
        })
    }

    /// The endpoint this client talks to.
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Full URL of the login endpoint.
    pub fn login_url(&self) -> Result<Url, SdkError> {
        endpoint_url(&self.endpoint, self.scheme, LOGIN_PATH)
    }

    /// Full URL of the key endpoint, query included.
    pub fn api_key_url(&self, name: &ApiKeyName, scope: ApiKeyScope) -> Result<Url, SdkError> {
        let mut url = endpoint_url(&self.endpoint, self.scheme, API_KEY_PATH)?;
        url.query_pairs_mut()
            .append_pair("name", &name.to_string())
            .append_pair("scope", &scope.to_string());
        Ok(url)
    }

    /// Log in as the service user.
    ///
    /// Fails with [`SdkError::AuthenticationFailed`] on any non-success
    /// status, carrying the response body.
    pub async fn login(&self, credentials: &ServiceCredentials) -> Result<Session, SdkError> {
        let url = self.login_url()?;
        debug!(%url, email = %credentials.email, "logging in to platform");

        let res = self
            .http
            .post(url.clone())
            .form(&[
                ("email", credentials.email.as_str()),
                ("password", credentials.password()),
            ])
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SdkError::AuthenticationFailed { status, body });
        }

        let mut cookies = CookieStore::new();
        for value in res.headers().get_all(SET_COOKIE) {
            cookies.store_set_cookie(&String::from_utf8_lossy(value.as_bytes()), &url);
        }

        let authorization = res
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        if authorization.is_none() {
            warn!("login response carried no Authorization header");
        }

        info!(
            endpoint = %self.endpoint,
            cookies = cookies.len(),
            "platform login successful"
        );

        Ok(Session {
            cookies,
            authorization,
        })
    }

    /// Ask the platform to mint a key named `name` with `scope`.
    ///
    /// Fails with [`SdkError::KeyIssuanceFailed`] on a non-success status
    /// and with [`SdkError::ResponseMalformed`] when the body has no `key`.
    pub async fn create_api_key(
        &self,
        session: &Session,
        name: &ApiKeyName,
        scope: ApiKeyScope,
    ) -> Result<ApiKey, SdkError> {
        let url = self.api_key_url(name, scope)?;
        debug!(%url, "requesting API key");

        let mut req = self
            .http
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json");
        if let Some(cookie) = session.cookies.cookie_header(&url) {
            req = req.header(COOKIE, cookie);
        }
        if let Some(token) = session.authorization() {
            req = req.header(AUTHORIZATION, token);
        }

        let res = req.send().await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SdkError::KeyIssuanceFailed {
                uri: url.to_string(),
                status,
                body,
            });
        }

        let body = res.text().await?;
        let key = extract_key(&body)?;
        info!(key_name = %name, %scope, "API key issued");
        Ok(key)
    }
}

/// Pull the `key` string out of an API key response body.
fn extract_key(body: &str) -> Result<ApiKey, SdkError> {
    let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| SdkError::ResponseMalformed(format!("API key response is not JSON: {e}")))?;

    json.get("key")
        .and_then(serde_json::Value::as_str)
        .filter(|k| !k.is_empty())
        .map(ApiKey::new)
        .ok_or_else(|| SdkError::ResponseMalformed("missing `key` in API key response".into()))
}
