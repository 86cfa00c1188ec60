//! HTTP transport to a single BMC
//!
//! The transport owns the connection settings (TLS, base URL, timeouts) and
//! knows how to put one request on the wire. It holds no session state: the
//! caller hands it the [`Auth`] to attach to every request.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client as HttpClient, Method, RequestBuilder};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{FailureClass, RedfishError, Result};
use crate::response::RedfishResponse;
use crate::types::RedfishConfig;

/// Header carrying the session token
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Path of the Redfish service root
pub const SERVICE_ROOT: &str = "/redfish/v1";

/// Username/password pair. `Debug` never prints the password.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authentication attached to one request
#[derive(Debug, Clone)]
pub enum Auth {
    /// No credentials (service root reads, anonymous login strategy)
    None,
    /// Session token header
    Token(String),
    /// HTTP Basic
    Basic(Credentials),
}

/// Request payload
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// Per-call knobs
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Replaces the transport's default request timeout for this call only
    pub timeout: Option<Duration>,
    /// Extra headers
    pub headers: HeaderMap,
}

impl RequestOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A request as issued by a caller. The executor replays the same value on
/// every attempt.
#[derive(Debug, Clone)]
pub struct RedfishRequest {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
    pub options: RequestOptions,
}

impl RedfishRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
            options: RequestOptions::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// A transport-level failure, already classified
#[derive(Debug)]
pub struct SendError {
    pub class: FailureClass,
    pub message: String,
}

impl SendError {
    fn from_reqwest(err: &reqwest::Error) -> Self {
        let class = if err.is_connect() || err.is_timeout() {
            FailureClass::Connection
        } else {
            FailureClass::Transient
        };
        Self {
            class,
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.class)
    }
}

/// Connection to one BMC
#[derive(Debug, Clone)]
pub struct TransportSession {
    http: HttpClient,
    base_url: Url,
    default_timeout: Duration,
}

impl TransportSession {
    /// Build the HTTP client from config
    pub fn new(config: &RedfishConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| RedfishError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: parse_base_url(&config.base_url)?,
            default_timeout: config.request_timeout,
        })
    }

    /// Same connection settings pointed at another address
    pub fn with_base_url(&self, base_url: &str) -> Result<Self> {
        Ok(Self {
            http: self.http.clone(),
            base_url: parse_base_url(base_url)?,
            default_timeout: self.default_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn set_base_url(&mut self, base_url: Url) {
        self.base_url = base_url;
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Resolve a resource path (or an absolute URL handed back by the
    /// service) against the base URL
    pub fn url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path)
                .map_err(|e| RedfishError::ProtocolViolation(format!("bad URL {}: {}", path, e)));
        }
        self.base_url
            .join(path)
            .map_err(|e| RedfishError::InvalidConfig(format!("bad path {}: {}", path, e)))
    }

    fn build(&self, request: &RedfishRequest, auth: &Auth) -> Result<RequestBuilder> {
        let url = self.url(&request.path)?;
        let timeout = request.options.timeout.unwrap_or(self.default_timeout);

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .timeout(timeout)
            .header(reqwest::header::ACCEPT, "application/json")
            .headers(request.options.headers.clone());

        builder = match auth {
            Auth::None => builder,
            Auth::Token(token) => builder.header(AUTH_TOKEN_HEADER, token),
            Auth::Basic(creds) => builder.basic_auth(&creds.username, Some(&creds.password)),
        };

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
        };

        Ok(builder)
    }

    /// Send one request and buffer the whole response.
    ///
    /// The outer `Result` carries configuration errors (unresolvable paths);
    /// the inner one carries classified transport failures.
    pub async fn send(
        &self,
        request: &RedfishRequest,
        auth: &Auth,
    ) -> Result<std::result::Result<RedfishResponse, SendError>> {
        let builder = self.build(request, auth)?;
        debug!(method = %request.method, path = %request.path, "sending Redfish request");

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Ok(Err(SendError::from_reqwest(&e))),
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Ok(Err(SendError::from_reqwest(&e))),
        };

        debug!(method = %request.method, path = %request.path, %status, "received Redfish response");
        Ok(Ok(RedfishResponse::new(status, headers, body)))
    }

    /// Unauthenticated service root ping used for reachability checks
    pub async fn ping(&self, timeout: Duration) -> bool {
        let request = RedfishRequest::get(SERVICE_ROOT)
            .options(RequestOptions::default().with_timeout(timeout));
        matches!(self.send(&request, &Auth::None).await, Ok(Ok(resp)) if resp.is_success())
    }
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    Url::parse(base_url)
        .map_err(|e| RedfishError::InvalidConfig(format!("base URL {}: {}", base_url, e)))
}
