//! Authenticated request execution with bounded retry
//!
//! Every failure class (stale auth, dropped connections, other transport
//! faults) draws from one attempt budget per call, so a request either
//! produces a response or ends in [`RedfishError::RetriesExhausted`] after at
//! most `max_attempts` round trips.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::{FailureClass, RedfishError, Result};
use crate::response::RedfishResponse;
use crate::session::{AuthMode, SessionManager};
use crate::transport::{RedfishRequest, TransportSession};

/// Backoff never grows past `base_delay * 2^MAX_BACKOFF_SHIFT`
const MAX_BACKOFF_SHIFT: u32 = 6;

/// Attempt bookkeeping for one executor call
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub attempt: u32,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub last_failure: Option<FailureClass>,
}

impl RetryContext {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempt: 0,
            max_attempts: max_attempts.max(1),
            base_delay,
            last_failure: None,
        }
    }

    /// Claim the next attempt; `false` once the budget is spent
    pub fn next_attempt(&mut self) -> bool {
        if self.attempt >= self.max_attempts {
            return false;
        }
        self.attempt += 1;
        true
    }

    pub fn record(&mut self, class: FailureClass) {
        self.last_failure = Some(class);
    }

    pub fn has_remaining(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Exponential backoff for the current attempt
    pub fn backoff(&self) -> Duration {
        let shift = self.attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        self.base_delay.saturating_mul(1u32 << shift)
    }
}

/// Runs requests against a transport on behalf of a session
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    max_attempts: u32,
    base_delay: Duration,
    auth_retry_delay: Duration,
}

impl RequestExecutor {
    pub fn new(max_attempts: u32, base_delay: Duration, auth_retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            auth_retry_delay,
        }
    }

    /// Issue `request` with the session's current auth, retrying per failure
    /// class until a response arrives or the attempt budget runs out.
    ///
    /// Any status other than 401/403 is handed back unchanged, including
    /// 4xx/5xx; callers decide what those mean.
    pub async fn execute(
        &self,
        transport: &TransportSession,
        sessions: &mut SessionManager,
        request: &RedfishRequest,
    ) -> Result<RedfishResponse> {
        let mut ctx = RetryContext::new(self.max_attempts, self.base_delay);

        while ctx.next_attempt() {
            let auth = sessions.auth();
            let outcome = transport.send(request, &auth).await?;

            match outcome {
                Ok(response)
                    if matches!(response.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) =>
                {
                    ctx.record(FailureClass::AuthExpired);
                    warn!(
                        status = %response.status,
                        path = %request.path,
                        attempt = ctx.attempt,
                        max = ctx.max_attempts,
                        "request rejected as unauthenticated"
                    );
                    if !ctx.has_remaining() {
                        break;
                    }
                    match sessions.mode() {
                        AuthMode::TokenAuth => {
                            sessions.delete(transport).await;
                            if !sessions.create(transport).await {
                                debug!(mode = ?sessions.mode(), "session recreation failed, retrying anyway");
                            }
                        }
                        AuthMode::BasicAuthDirect => {
                            tokio::time::sleep(self.auth_retry_delay).await;
                        }
                    }
                }
                Ok(response) => return Ok(response),
                Err(e) if e.class == FailureClass::Connection => {
                    ctx.record(FailureClass::Connection);
                    warn!(
                        error = %e.message,
                        path = %request.path,
                        attempt = ctx.attempt,
                        max = ctx.max_attempts,
                        "connection to BMC failed"
                    );
                    if !ctx.has_remaining() {
                        break;
                    }
                    let backoff = ctx.backoff();
                    debug!(backoff_ms = backoff.as_millis() as u64, "backing off before retry");
                    tokio::time::sleep(backoff).await;
                    if sessions.mode() == AuthMode::TokenAuth {
                        // Release the old slot before taking a new one
                        sessions.delete(transport).await;
                        sessions.create(transport).await;
                    }
                }
                Err(e) => {
                    if sessions.mode() == AuthMode::BasicAuthDirect {
                        ctx.record(FailureClass::Fatal);
                        return Err(RedfishError::Transport(format!(
                            "{} {}: {}",
                            request.method, request.path, e.message
                        )));
                    }
                    ctx.record(FailureClass::Transient);
                    warn!(
                        error = %e.message,
                        path = %request.path,
                        attempt = ctx.attempt,
                        max = ctx.max_attempts,
                        "request failed, recreating session"
                    );
                    if !ctx.has_remaining() {
                        break;
                    }
                    sessions.delete(transport).await;
                    sessions.create(transport).await;
                }
            }
        }

        Err(RedfishError::RetriesExhausted {
            method: request.method.to_string(),
            path: request.path.clone(),
            attempts: ctx.attempt,
            last: ctx.last_failure.unwrap_or(FailureClass::Fatal),
        })
    }
}
