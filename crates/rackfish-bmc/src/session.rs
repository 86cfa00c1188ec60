//! Session negotiation and lifecycle
//!
//! A BMC usually accepts token sessions, but firmware generations disagree on
//! where the session collection lives and on how the login POST must look.
//! [`SessionManager::create`] reads the service root for the collection
//! path, then walks [`LOGIN_STRATEGIES`] in order until one of them yields a
//! token or a session location. When the service reports that its session
//! quota is used up, stale sessions are evicted over Basic Auth and the chain
//! is walked once more. If nothing works the manager falls back to sending
//! Basic Auth on every request, for the rest of the client's life.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::transport::{
    Auth, Credentials, RedfishRequest, RequestBody, TransportSession, AUTH_TOKEN_HEADER,
    SERVICE_ROOT,
};

/// Session collection for Redfish 1.6.0 and later
pub const SESSIONS_PATH: &str = "/redfish/v1/SessionService/Sessions";

/// Session collection for older firmware
pub const LEGACY_SESSIONS_PATH: &str = "/redfish/v1/Sessions";

/// Substring of the 400 body returned when no session slot is free
pub const SESSION_LIMIT_MARKER: &str = "maximum number of user sessions";

const MODERN_SESSIONS_VERSION: (u32, u32, u32) = (1, 6, 0);

/// How requests are authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Session token in `X-Auth-Token`
    TokenAuth,
    /// Basic Auth on every request; no more session attempts
    BasicAuthDirect,
}

/// Local view of the current session
#[derive(Debug, Clone)]
pub struct Session {
    pub token: Option<String>,
    pub location: Option<String>,
    pub mode: AuthMode,
    pub sessions_maxed: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            token: None,
            location: None,
            mode: AuthMode::TokenAuth,
            sessions_maxed: false,
        }
    }
}

impl Session {
    fn clear(&mut self) {
        self.token = None;
        self.location = None;
    }
}

/// Subset of the service root document we care about
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceRoot {
    #[serde(rename = "RedfishVersion", default)]
    pub redfish_version: Option<String>,
    #[serde(rename = "Vendor", default)]
    pub vendor: Option<String>,
    #[serde(rename = "Product", default)]
    pub product: Option<String>,
}

impl ServiceRoot {
    /// Pick the session collection for this protocol version
    pub fn sessions_path(&self) -> &'static str {
        match self.redfish_version.as_deref().and_then(parse_version) {
            Some(version) if version < MODERN_SESSIONS_VERSION => LEGACY_SESSIONS_PATH,
            _ => SESSIONS_PATH,
        }
    }
}

fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.trim().split('.').map(|p| p.parse::<u32>().ok());
    let major = parts.next()??;
    let minor = parts.next().flatten().unwrap_or(0);
    let patch = parts.next().flatten().unwrap_or(0);
    Some((major, minor, patch))
}

/// One way of POSTing credentials to the session collection
pub struct LoginStrategy {
    pub name: &'static str,
    build: fn(&str, &Credentials) -> (RedfishRequest, Auth),
}

fn credentials_json(creds: &Credentials) -> Value {
    json!({ "UserName": creds.username, "Password": creds.password })
}

fn credentials_form(creds: &Credentials) -> RequestBody {
    RequestBody::Form(vec![
        ("UserName".to_string(), creds.username.clone()),
        ("Password".to_string(), creds.password.clone()),
    ])
}

fn json_post(path: &str, creds: &Credentials) -> (RedfishRequest, Auth) {
    let request = RedfishRequest::new(Method::POST, path).json(credentials_json(creds));
    (request, Auth::None)
}

fn basic_json_post(path: &str, creds: &Credentials) -> (RedfishRequest, Auth) {
    let request = RedfishRequest::new(Method::POST, path).json(credentials_json(creds));
    (request, Auth::Basic(creds.clone()))
}

fn basic_form_post(path: &str, creds: &Credentials) -> (RedfishRequest, Auth) {
    let mut request = RedfishRequest::new(Method::POST, path);
    request.body = credentials_form(creds);
    (request, Auth::Basic(creds.clone()))
}

fn anonymous_form_post(path: &str, creds: &Credentials) -> (RedfishRequest, Auth) {
    let mut request = RedfishRequest::new(Method::POST, path);
    request.body = credentials_form(creds);
    (request, Auth::None)
}

/// Login strategies, in priority order
pub const LOGIN_STRATEGIES: [LoginStrategy; 4] = [
    LoginStrategy {
        name: "json",
        build: json_post,
    },
    LoginStrategy {
        name: "basic-json",
        build: basic_json_post,
    },
    LoginStrategy {
        name: "basic-form",
        build: basic_form_post,
    },
    LoginStrategy {
        name: "anonymous-form",
        build: anonymous_form_post,
    },
];

/// Result of walking the strategy chain once
#[derive(Debug, PartialEq, Eq)]
enum ChainOutcome {
    Established {
        token: Option<String>,
        location: Option<String>,
    },
    QuotaExceeded,
    /// Every strategy got an answer and every answer was a refusal
    Rejected,
    /// No strategy got an answer at all
    Unreachable,
}

/// Owns the [`Session`] and drives login, eviction and logout
#[derive(Debug)]
pub struct SessionManager {
    session: Session,
    credentials: Credentials,
    sessions_path: Option<String>,
    eviction_delay: Duration,
    eviction_settle: Duration,
}

impl SessionManager {
    pub fn new(credentials: Credentials, eviction_delay: Duration, eviction_settle: Duration) -> Self {
        Self {
            session: Session::default(),
            credentials,
            sessions_path: None,
            eviction_delay,
            eviction_settle,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn mode(&self) -> AuthMode {
        self.session.mode
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Auth to attach to the next request
    pub fn auth(&self) -> Auth {
        match (&self.session.mode, &self.session.token) {
            (AuthMode::TokenAuth, Some(token)) => Auth::Token(token.clone()),
            _ => Auth::Basic(self.credentials.clone()),
        }
    }

    /// Forget the session locally without talking to the service
    pub(crate) fn forget(&mut self) {
        self.session.clear();
    }

    /// Session collection path, probing the service root on first use
    pub async fn sessions_path(&mut self, transport: &TransportSession) -> String {
        if let Some(path) = &self.sessions_path {
            return path.clone();
        }

        let (path, learned) = match transport.send(&RedfishRequest::get(SERVICE_ROOT), &Auth::None).await {
            Ok(Ok(resp)) if resp.is_success() => match resp.json::<ServiceRoot>() {
                Ok(root) => {
                    debug!(
                        version = root.redfish_version.as_deref().unwrap_or("unknown"),
                        vendor = root.vendor.as_deref().unwrap_or("unknown"),
                        "read Redfish service root"
                    );
                    (root.sessions_path(), true)
                }
                Err(e) => {
                    warn!(error = %e, "unreadable service root, assuming modern session path");
                    (SESSIONS_PATH, true)
                }
            },
            Ok(Ok(resp)) => {
                warn!(status = %resp.status, "service root request refused, assuming modern session path");
                (SESSIONS_PATH, false)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "service root unreachable, assuming modern session path");
                (SESSIONS_PATH, false)
            }
            Err(e) => {
                warn!(error = %e, "service root request failed, assuming modern session path");
                (SESSIONS_PATH, false)
            }
        };

        // Only cache a path learned from a readable service root
        if learned {
            self.sessions_path = Some(path.to_string());
        }
        path.to_string()
    }

    /// Establish a token session. Returns `false` when no session could be
    /// created; after a definitive refusal the mode becomes
    /// [`AuthMode::BasicAuthDirect`] and this never tries again.
    pub async fn create(&mut self, transport: &TransportSession) -> bool {
        if self.session.mode == AuthMode::BasicAuthDirect {
            return false;
        }

        let path = self.sessions_path(transport).await;
        let mut outcome = self.walk_strategies(transport, &path).await;

        if outcome == ChainOutcome::QuotaExceeded {
            self.session.sessions_maxed = true;
            warn!("BMC session quota exhausted, evicting active sessions");
            outcome = if self.evict(transport, &path).await {
                self.walk_strategies(transport, &path).await
            } else {
                ChainOutcome::Rejected
            };
        }

        match outcome {
            ChainOutcome::Established { token, location } => {
                info!(
                    location = location.as_deref().unwrap_or("none"),
                    token = token.is_some(),
                    "Redfish session established"
                );
                self.session.token = token;
                self.session.location = location;
                self.session.sessions_maxed = false;
                true
            }
            ChainOutcome::Unreachable => {
                warn!("BMC unreachable during login, keeping token mode");
                self.session.clear();
                false
            }
            ChainOutcome::QuotaExceeded | ChainOutcome::Rejected => {
                warn!("all login strategies failed, falling back to Basic Auth for every request");
                self.session.clear();
                self.session.mode = AuthMode::BasicAuthDirect;
                false
            }
        }
    }

    async fn walk_strategies(&self, transport: &TransportSession, path: &str) -> ChainOutcome {
        let mut answered = false;

        for strategy in LOGIN_STRATEGIES.iter() {
            let (request, auth) = (strategy.build)(path, &self.credentials);
            let response = match transport.send(&request, &auth).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    debug!(strategy = strategy.name, error = %e, "login strategy got no answer");
                    continue;
                }
                Err(e) => {
                    debug!(strategy = strategy.name, error = %e, "login strategy could not be built");
                    continue;
                }
            };
            answered = true;

            if response.status == StatusCode::BAD_REQUEST
                && response.body.to_lowercase().contains(SESSION_LIMIT_MARKER)
            {
                return ChainOutcome::QuotaExceeded;
            }

            if matches!(response.status, StatusCode::OK | StatusCode::CREATED) {
                let token = response.header(AUTH_TOKEN_HEADER).map(str::to_string);
                let location = response.location().map(str::to_string).or_else(|| {
                    response
                        .json_value()
                        .and_then(|v| v.get("@odata.id").and_then(Value::as_str).map(str::to_string))
                });
                if token.is_some() || location.is_some() {
                    debug!(strategy = strategy.name, "login strategy succeeded");
                    return ChainOutcome::Established { token, location };
                }
            }

            debug!(strategy = strategy.name, status = %response.status, "login strategy refused");
        }

        if answered {
            ChainOutcome::Rejected
        } else {
            ChainOutcome::Unreachable
        }
    }

    /// Delete every session in the collection over Basic Auth
    async fn evict(&self, transport: &TransportSession, path: &str) -> bool {
        let basic = Auth::Basic(self.credentials.clone());
        let listing = match transport.send(&RedfishRequest::get(path), &basic).await {
            Ok(Ok(resp)) if resp.is_success() => resp,
            Ok(Ok(resp)) => {
                warn!(status = %resp.status, "could not list sessions for eviction");
                return false;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "could not list sessions for eviction");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "could not list sessions for eviction");
                return false;
            }
        };

        let members: Vec<String> = listing
            .json_value()
            .and_then(|v| v.get("Members").and_then(Value::as_array).cloned())
            .unwrap_or_default()
            .iter()
            .filter_map(|m| m.get("@odata.id").and_then(Value::as_str).map(str::to_string))
            .collect();

        info!(count = members.len(), "evicting BMC sessions");
        for (i, member) in members.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.eviction_delay).await;
            }
            let request = RedfishRequest::new(Method::DELETE, member.as_str());
            match transport.send(&request, &basic).await {
                Ok(Ok(resp)) if resp.is_success() => debug!(session = %member, "evicted session"),
                Ok(Ok(resp)) => warn!(session = %member, status = %resp.status, "session eviction refused"),
                Ok(Err(e)) => warn!(session = %member, error = %e, "session eviction failed"),
                Err(e) => warn!(session = %member, error = %e, "session eviction failed"),
            }
        }

        tokio::time::sleep(self.eviction_settle).await;
        true
    }

    /// Best-effort logout. Never fails; local token state is always cleared.
    pub async fn delete(&mut self, transport: &TransportSession) -> bool {
        let token = self.session.token.take();
        let location = self.session.location.take();

        let Some(location) = location else {
            return token.is_none();
        };

        if let Some(token) = token {
            let request = RedfishRequest::new(Method::DELETE, location.as_str());
            match transport.send(&request, &Auth::Token(token)).await {
                Ok(Ok(resp)) if resp.is_success() => {
                    debug!("Redfish session deleted");
                    return true;
                }
                Ok(Ok(resp)) => debug!(status = %resp.status, "token logout refused"),
                Ok(Err(e)) => debug!(error = %e, "token logout failed"),
                Err(e) => debug!(error = %e, "token logout failed"),
            }
        }

        let Some(id) = session_id(&location) else {
            warn!(location = %location, "could not derive session id, dropping session locally");
            return false;
        };

        let path = self
            .sessions_path
            .clone()
            .unwrap_or_else(|| SESSIONS_PATH.to_string());
        let request = RedfishRequest::new(Method::DELETE, format!("{}/{}", path, id));
        match transport.send(&request, &Auth::Basic(self.credentials.clone())).await {
            Ok(Ok(resp)) if resp.is_success() => {
                debug!(session = id, "Redfish session deleted over Basic Auth");
                true
            }
            Ok(Ok(resp)) => {
                warn!(session = id, status = %resp.status, "session delete refused, dropping locally");
                false
            }
            Ok(Err(e)) => {
                warn!(session = id, error = %e, "session delete failed, dropping locally");
                false
            }
            Err(e) => {
                warn!(session = id, error = %e, "session delete failed, dropping locally");
                false
            }
        }
    }
}

/// Trailing numeric segment of a session location
fn session_id(location: &str) -> Option<u64> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
}
