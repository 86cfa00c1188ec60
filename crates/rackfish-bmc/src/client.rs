//! Client facade: one BMC, one session, one request at a time

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{RedfishError, Result};
use crate::executor::RequestExecutor;
use crate::response::RedfishResponse;
use crate::session::{AuthMode, Session, SessionManager};
use crate::tracker::{
    AsyncOperationTracker, OperationHandle, OperationKind, OperationStatus, ResourceReader,
    TaskOutcome,
};
use crate::transport::{Credentials, RedfishRequest, TransportSession};
use crate::types::{PollPolicy, RedfishConfig};

/// Authenticated Redfish client for a single BMC.
///
/// Methods take `&mut self`: the session and its auth mode are mutated along
/// the single call path. Share a client between tasks behind a mutex.
/// Call [`Client::close`] to log out; dropping a client does not.
#[derive(Debug)]
pub struct Client {
    config: RedfishConfig,
    transport: TransportSession,
    sessions: SessionManager,
    executor: RequestExecutor,
}

impl Client {
    /// Validate `config`, build the transport and negotiate a session.
    ///
    /// A failed negotiation is not an error: the client then runs with
    /// Basic Auth on every request.
    pub async fn connect(config: RedfishConfig) -> Result<Self> {
        let mut client = Self::new(config)?;
        if !client.sessions.create(&client.transport).await {
            warn!(
                base_url = %client.transport.base_url(),
                mode = ?client.sessions.mode(),
                "no Redfish session, continuing without one"
            );
        }
        Ok(client)
    }

    /// Build a client without logging in
    pub fn new(config: RedfishConfig) -> Result<Self> {
        config.validate()?;
        let transport = TransportSession::new(&config)?;
        let sessions = SessionManager::new(
            Credentials::new(config.username.clone(), config.password.clone()),
            config.eviction_delay,
            config.eviction_settle,
        );
        let executor = RequestExecutor::new(
            config.max_retries,
            config.retry_base_delay,
            config.auth_retry_delay,
        );
        Ok(Self {
            config,
            transport,
            sessions,
            executor,
        })
    }

    pub fn config(&self) -> &RedfishConfig {
        &self.config
    }

    pub fn base_url(&self) -> &url::Url {
        self.transport.base_url()
    }

    pub fn manager_path(&self) -> &str {
        &self.config.manager_path
    }

    pub fn session(&self) -> &Session {
        self.sessions.session()
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.sessions.mode()
    }

    pub(crate) fn transport(&self) -> &TransportSession {
        &self.transport
    }

    pub(crate) fn transport_and_sessions(&mut self) -> (&mut TransportSession, &mut SessionManager) {
        (&mut self.transport, &mut self.sessions)
    }

    /// (Re)negotiate a token session
    pub async fn login(&mut self) -> bool {
        self.sessions.create(&self.transport).await
    }

    /// Like [`Client::login`], but explains a failure
    pub async fn require_session(&mut self) -> Result<()> {
        if self.login().await {
            return Ok(());
        }
        let session = self.sessions.session();
        Err(match session.mode {
            AuthMode::BasicAuthDirect if session.sessions_maxed => RedfishError::SessionLimitExceeded(
                "no session slot left after evicting active sessions".to_string(),
            ),
            AuthMode::BasicAuthDirect => {
                RedfishError::AuthenticationFailed("every login strategy was refused".to_string())
            }
            AuthMode::TokenAuth => RedfishError::TransientConnection(format!(
                "{} did not answer any login attempt",
                self.transport.base_url()
            )),
        })
    }

    /// Best-effort logout; never fails
    pub async fn logout(&mut self) -> bool {
        self.sessions.delete(&self.transport).await
    }

    /// Log out and consume the client
    pub async fn close(mut self) {
        if self.logout().await {
            info!(base_url = %self.transport.base_url(), "Redfish session closed");
        }
    }

    /// Issue one authenticated request through the retrying executor
    pub async fn execute_authenticated(&mut self, request: &RedfishRequest) -> Result<RedfishResponse> {
        self.executor
            .execute(&self.transport, &mut self.sessions, request)
            .await
    }

    pub async fn get(&mut self, path: &str) -> Result<RedfishResponse> {
        self.execute_authenticated(&RedfishRequest::get(path)).await
    }

    pub async fn post_json(&mut self, path: &str, body: Value) -> Result<RedfishResponse> {
        self.execute_authenticated(&RedfishRequest::new(Method::POST, path).json(body))
            .await
    }

    pub async fn patch_json(&mut self, path: &str, body: Value) -> Result<RedfishResponse> {
        self.execute_authenticated(&RedfishRequest::new(Method::PATCH, path).json(body))
            .await
    }

    pub async fn delete(&mut self, path: &str) -> Result<RedfishResponse> {
        self.execute_authenticated(&RedfishRequest::new(Method::DELETE, path))
            .await
    }

    /// Wait for a job given its id, path or `Location`. Task-service
    /// locations are polled as tasks.
    pub async fn await_job(&mut self, reference: &str) -> Result<OperationStatus> {
        let handle = OperationHandle::resolve(reference, OperationKind::Job, self.manager_path())?;
        self.await_job_handle(&handle).await
    }

    /// Wait for a job with an explicit poll policy
    pub async fn await_job_with(&mut self, reference: &str, policy: PollPolicy) -> Result<OperationStatus> {
        let handle = OperationHandle::resolve(reference, OperationKind::Job, self.manager_path())?;
        AsyncOperationTracker::new(policy).await_job(self, &handle).await
    }

    /// Wait for a task given its id, path or `Location`
    pub async fn await_task(&mut self, reference: &str) -> Result<TaskOutcome> {
        let handle = OperationHandle::resolve(reference, OperationKind::Task, self.manager_path())?;
        self.await_task_handle(&handle).await
    }

    /// Wait for a task with an explicit poll policy
    pub async fn await_task_with(&mut self, reference: &str, policy: PollPolicy) -> Result<TaskOutcome> {
        let handle = OperationHandle::resolve(reference, OperationKind::Task, self.manager_path())?;
        AsyncOperationTracker::new(policy).await_task(self, &handle).await
    }

    /// Wait on a handle with the configured budget for its kind
    pub(crate) async fn await_job_handle(&mut self, handle: &OperationHandle) -> Result<OperationStatus> {
        let policy = match handle.kind {
            OperationKind::Job => self.config.job_poll,
            OperationKind::Task => self.config.task_poll,
        };
        AsyncOperationTracker::new(policy).await_job(self, handle).await
    }

    pub(crate) async fn await_task_handle(&mut self, handle: &OperationHandle) -> Result<TaskOutcome> {
        AsyncOperationTracker::new(self.config.task_poll)
            .await_task(self, handle)
            .await
    }
}

#[async_trait]
impl ResourceReader for Client {
    async fn read_resource(&mut self, path: &str) -> Result<RedfishResponse> {
        self.get(path).await
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if self.sessions.session().token.is_some() {
            warn!(
                base_url = %self.transport.base_url(),
                "Redfish client dropped with a live session; call close() to log out"
            );
        }
    }
}
