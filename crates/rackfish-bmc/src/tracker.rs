//! Job and task completion tracking
//!
//! Long-running BMC operations answer with a `Location` pointing at either a
//! Job (manager job queue) or a Task (task service). Both are polled the same
//! way, with a fixed interval and a hard poll ceiling, but they terminate
//! differently: a Task may finish by returning the operation's *payload*
//! (an exported configuration profile) instead of a state document. That is
//! modelled as [`TaskOutcome::Payload`] next to [`TaskOutcome::Status`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{RedfishError, Result};
use crate::response::{ExtendedInfo, RedfishResponse};
use crate::types::PollPolicy;

/// Task service collection
pub const TASKS_PATH: &str = "/redfish/v1/TaskService/Tasks";

/// Something that can GET a resource with authentication and retry.
///
/// [`crate::Client`] is the production implementation.
#[async_trait]
pub trait ResourceReader: Send {
    async fn read_resource(&mut self, path: &str) -> Result<RedfishResponse>;
}

/// Kind of asynchronous resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Job,
    Task,
}

/// Handle to one asynchronous operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    pub id: String,
    pub kind: OperationKind,
    pub path: String,
}

impl OperationHandle {
    /// Build a handle from a `Location` header, a resource path or a bare id.
    ///
    /// Bare ids resolve to `default_kind`: jobs live under `manager_path`,
    /// tasks under the task service.
    pub fn resolve(input: &str, default_kind: OperationKind, manager_path: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(RedfishError::ProtocolViolation(
                "empty operation reference".to_string(),
            ));
        }

        let path = match url::Url::parse(input) {
            Ok(url) if url.has_host() => url.path().to_string(),
            _ => input.to_string(),
        };

        if !path.contains('/') {
            let path = match default_kind {
                OperationKind::Job => format!("{}/Jobs/{}", manager_path.trim_end_matches('/'), path),
                OperationKind::Task => format!("{}/{}", TASKS_PATH, path),
            };
            return Self::resolve(&path, default_kind, manager_path);
        }

        let id = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                RedfishError::ProtocolViolation(format!("no operation id in {}", input))
            })?
            .to_string();

        let kind = if path.contains("/TaskService/Tasks/") {
            OperationKind::Task
        } else if path.contains("/Jobs/") {
            OperationKind::Job
        } else {
            default_kind
        };

        Ok(Self { id, kind, path })
    }

    /// Handle from a response's `Location` header
    pub fn from_response(
        response: &RedfishResponse,
        default_kind: OperationKind,
        manager_path: &str,
    ) -> Result<Self> {
        let location = response.location().ok_or_else(|| {
            RedfishError::ProtocolViolation(format!(
                "HTTP {} response carries no Location header",
                response.status
            ))
        })?;
        Self::resolve(location, default_kind, manager_path)
    }
}

/// Normalized operation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    Unknown,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Completed | OperationState::CompletedWithErrors | OperationState::Failed
        )
    }

    /// Map a vendor `JobState` or Redfish `TaskState` string
    pub fn from_vendor(state: &str) -> Self {
        match state {
            "Completed" => OperationState::Completed,
            "CompletedWithErrors" => OperationState::CompletedWithErrors,
            "Failed" | "Killed" | "Exception" | "Cancelled" | "Canceled" => OperationState::Failed,
            "Running" | "Downloading" | "Stopping" | "Cancelling" => OperationState::Running,
            "New" | "Scheduled" | "Scheduling" | "Starting" | "Pending" | "Waiting"
            | "Suspended" | "Interrupted" | "ReadyForExecution" => OperationState::Pending,
            _ => OperationState::Unknown,
        }
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationState::Pending => "pending",
            OperationState::Running => "running",
            OperationState::Completed => "completed",
            OperationState::CompletedWithErrors => "completed-with-errors",
            OperationState::Failed => "failed",
            OperationState::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Snapshot of one poll. Never merged with earlier polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStatus {
    pub state: OperationState,
    pub percent_complete: Option<u8>,
    pub messages: Vec<String>,
    /// Full `Messages` entries, as the service sent them
    pub details: Vec<ExtendedInfo>,
}

impl OperationStatus {
    fn unknown() -> Self {
        Self {
            state: OperationState::Unknown,
            percent_complete: None,
            messages: Vec::new(),
            details: Vec::new(),
        }
    }
}

/// Terminal result of a task poll
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The task document reached a terminal success state
    Status(OperationStatus),
    /// The task resource answered with the operation's payload itself
    Payload(Value),
}

#[derive(Debug, Deserialize)]
struct JobDocument {
    #[serde(rename = "JobState")]
    job_state: Option<String>,
    #[serde(rename = "PercentComplete")]
    percent_complete: Option<Value>,
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "Messages", default)]
    messages: Vec<ExtendedInfo>,
}

#[derive(Debug, Deserialize)]
struct TaskDocument {
    #[serde(rename = "TaskState")]
    task_state: Option<String>,
    #[serde(rename = "TaskStatus")]
    task_status: Option<String>,
    #[serde(rename = "PercentComplete")]
    percent_complete: Option<Value>,
    #[serde(rename = "Messages", default)]
    messages: Vec<ExtendedInfo>,
}

fn percent(value: Option<&Value>) -> Option<u8> {
    let value = value?;
    let n = value
        .as_u64()
        .or_else(|| value.as_f64().map(|f| f as u64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))?;
    Some(n.min(100) as u8)
}

fn collect_messages(single: Option<String>, entries: &[ExtendedInfo]) -> Vec<String> {
    single
        .into_iter()
        .chain(entries.iter().map(|m| m.message.clone()))
        .filter(|m| !m.is_empty())
        .collect()
}

/// Interpret one Job poll
pub fn parse_job_status(response: &RedfishResponse) -> OperationStatus {
    if !response.is_success() {
        return OperationStatus::unknown();
    }
    match response.json::<JobDocument>() {
        Ok(doc) => OperationStatus {
            state: doc
                .job_state
                .as_deref()
                .map_or(OperationState::Unknown, OperationState::from_vendor),
            percent_complete: percent(doc.percent_complete.as_ref()),
            messages: collect_messages(doc.message, &doc.messages),
            details: doc.messages,
        },
        Err(_) => OperationStatus::unknown(),
    }
}

fn job_poll(response: &RedfishResponse) -> TaskOutcome {
    TaskOutcome::Status(parse_job_status(response))
}

/// Interpret one Task poll: either a payload or a state document.
///
/// A successful answer that is a JSON object with neither `TaskState` nor
/// `JobState` is the operation's payload; this check runs before any state
/// interpretation.
pub fn parse_task_poll(response: &RedfishResponse) -> TaskOutcome {
    if !response.is_success() {
        return TaskOutcome::Status(OperationStatus::unknown());
    }
    let Some(value) = response.json_value() else {
        return TaskOutcome::Status(OperationStatus::unknown());
    };
    if response.status == reqwest::StatusCode::OK
        && value.is_object()
        && value.get("TaskState").is_none()
        && value.get("JobState").is_none()
    {
        return TaskOutcome::Payload(value);
    }

    match serde_json::from_value::<TaskDocument>(value) {
        Ok(doc) => {
            let mut state = doc
                .task_state
                .as_deref()
                .map_or(OperationState::Unknown, OperationState::from_vendor);
            if state == OperationState::Completed
                && matches!(doc.task_status.as_deref(), Some("Warning") | Some("Critical"))
            {
                state = OperationState::CompletedWithErrors;
            }
            TaskOutcome::Status(OperationStatus {
                state,
                percent_complete: percent(doc.percent_complete.as_ref()),
                messages: collect_messages(None, &doc.messages),
                details: doc.messages,
            })
        }
        Err(_) => TaskOutcome::Status(OperationStatus::unknown()),
    }
}

/// Polls one operation to a terminal state
#[derive(Debug, Clone, Copy)]
pub struct AsyncOperationTracker {
    policy: PollPolicy,
}

impl AsyncOperationTracker {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Poll a job until it completes, fails, or the poll budget runs out.
    ///
    /// A handle that points into the task service is polled as a task;
    /// iDRAC hands out task locations for its jobs.
    pub async fn await_job<R: ResourceReader + ?Sized>(
        &self,
        reader: &mut R,
        handle: &OperationHandle,
    ) -> Result<OperationStatus> {
        match self.poll(reader, handle).await? {
            TaskOutcome::Status(status) => Ok(status),
            TaskOutcome::Payload(_) => Err(RedfishError::ProtocolViolation(format!(
                "job {} answered with a payload instead of a job document",
                handle.id
            ))),
        }
    }

    /// Poll a task until it completes, fails, returns its payload, or the
    /// poll budget runs out. Only task-service resources can yield a payload.
    pub async fn await_task<R: ResourceReader + ?Sized>(
        &self,
        reader: &mut R,
        handle: &OperationHandle,
    ) -> Result<TaskOutcome> {
        self.poll(reader, handle).await
    }

    async fn poll<R>(&self, reader: &mut R, handle: &OperationHandle) -> Result<TaskOutcome>
    where
        R: ResourceReader + ?Sized,
    {
        let interpret: fn(&RedfishResponse) -> TaskOutcome = match handle.kind {
            OperationKind::Job => job_poll,
            OperationKind::Task => parse_task_poll,
        };
        let max_polls = self.policy.max_polls.max(1);

        for poll in 1..=max_polls {
            let response = reader.read_resource(&handle.path).await?;

            let status = match interpret(&response) {
                TaskOutcome::Payload(payload) => {
                    info!(operation = %handle.id, polls = poll, "operation returned its payload");
                    return Ok(TaskOutcome::Payload(payload));
                }
                TaskOutcome::Status(status) => status,
            };

            match status.state {
                OperationState::Completed => {
                    info!(operation = %handle.id, polls = poll, "operation completed");
                    return Ok(TaskOutcome::Status(status));
                }
                OperationState::CompletedWithErrors => {
                    warn!(
                        operation = %handle.id,
                        messages = ?status.messages,
                        "operation completed with errors"
                    );
                    return Ok(TaskOutcome::Status(status));
                }
                OperationState::Failed => {
                    warn!(operation = %handle.id, messages = ?status.messages, "operation failed");
                    return Err(RedfishError::OperationFailed {
                        id: handle.id.clone(),
                        messages: status.messages,
                        details: status.details,
                    });
                }
                OperationState::Pending | OperationState::Running | OperationState::Unknown => {
                    info!(
                        operation = %handle.id,
                        state = %status.state,
                        percent = status.percent_complete.unwrap_or(0),
                        poll = poll,
                        max = max_polls,
                        "operation in progress"
                    );
                }
            }

            if poll < max_polls {
                tokio::time::sleep(self.policy.interval).await;
            }
        }

        debug!(operation = %handle.id, polls = max_polls, "poll budget exhausted");
        Err(RedfishError::OperationTimeout {
            id: handle.id.clone(),
            polls: max_polls,
        })
    }
}
