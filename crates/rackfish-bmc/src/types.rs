//! Common types for BMC operations

use std::time::Duration;

use url::Url;

use crate::error::{RedfishError, Result};

/// Manager resource of an embedded iDRAC
pub const DEFAULT_MANAGER_PATH: &str = "/redfish/v1/Managers/iDRAC.Embedded.1";

/// Power state of a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Machine is powered on
    On,
    /// Machine is powered off
    Off,
    /// Power state is unknown
    Unknown,
}

impl PowerState {
    /// Parse the Redfish `PowerState` property
    pub fn from_redfish(value: &str) -> Self {
        match value {
            "On" | "PoweringOn" => PowerState::On,
            "Off" | "PoweringOff" => PowerState::Off,
            _ => PowerState::Unknown,
        }
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
            PowerState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Boot device selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootDevice {
    /// Boot from network (PXE)
    Pxe,
    /// Boot from local disk
    Disk,
    /// Boot from CD/DVD
    Cdrom,
    /// Boot from BIOS setup
    BiosSetup,
    /// No override (use default)
    None,
}

impl BootDevice {
    /// Redfish `BootSourceOverrideTarget` value
    pub fn redfish_target(&self) -> &'static str {
        match self {
            BootDevice::Pxe => "Pxe",
            BootDevice::Disk => "Hdd",
            BootDevice::Cdrom => "Cd",
            BootDevice::BiosSetup => "BiosSetup",
            BootDevice::None => "None",
        }
    }
}

impl std::fmt::Display for BootDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootDevice::Pxe => write!(f, "pxe"),
            BootDevice::Disk => write!(f, "disk"),
            BootDevice::Cdrom => write!(f, "cdrom"),
            BootDevice::BiosSetup => write!(f, "bios"),
            BootDevice::None => write!(f, "none"),
        }
    }
}

/// How often, and how many times, to poll an asynchronous resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between two polls
    pub interval: Duration,
    /// Hard ceiling on the number of polls
    pub max_polls: u32,
}

impl PollPolicy {
    /// Create a new poll policy
    pub fn new(interval: Duration, max_polls: u32) -> Self {
        Self {
            interval,
            max_polls,
        }
    }

    /// Jobs: 36 polls at 10s, roughly six minutes
    pub fn jobs() -> Self {
        Self::new(Duration::from_secs(10), 36)
    }

    /// Tasks (configuration export/import run longer than jobs)
    pub fn tasks() -> Self {
        Self::new(Duration::from_secs(10), 60)
    }

    /// Address cutover probing
    pub fn cutover() -> Self {
        Self::new(Duration::from_secs(5), 60)
    }
}

/// Redfish REST API configuration
#[derive(Clone)]
pub struct RedfishConfig {
    /// Base URL (e.g., https://bmc.example.com)
    pub base_url: String,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
    /// Skip TLS verification (for self-signed certs)
    pub insecure: bool,
    /// Manager resource owning the job queue and configuration actions
    pub manager_path: String,
    /// TCP/TLS connect timeout
    pub connect_timeout: Duration,
    /// Default whole-request timeout, overridable per call
    pub request_timeout: Duration,
    /// Attempts shared by every retry path of a single request
    pub max_retries: u32,
    /// Base delay for exponential backoff after connection failures
    pub retry_base_delay: Duration,
    /// Delay before retrying an auth failure in direct (Basic) mode
    pub auth_retry_delay: Duration,
    /// Pause between two deletions while evicting stale sessions
    pub eviction_delay: Duration,
    /// Wait after eviction before logging in again
    pub eviction_settle: Duration,
    /// Poll policy for jobs
    pub job_poll: PollPolicy,
    /// Poll policy for tasks
    pub task_poll: PollPolicy,
    /// Poll policy for address cutover monitoring
    pub cutover_poll: PollPolicy,
}

impl std::fmt::Debug for RedfishConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedfishConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("insecure", &self.insecure)
            .field("manager_path", &self.manager_path)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl Default for RedfishConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            insecure: false,
            manager_path: DEFAULT_MANAGER_PATH.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            max_retries: 5,
            retry_base_delay: Duration::from_secs(1),
            auth_retry_delay: Duration::from_secs(2),
            eviction_delay: Duration::from_secs(1),
            eviction_settle: Duration::from_secs(5),
            job_poll: PollPolicy::jobs(),
            task_poll: PollPolicy::tasks(),
            cutover_poll: PollPolicy::cutover(),
        }
    }
}

impl RedfishConfig {
    /// Create new Redfish config
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// Allow insecure TLS (self-signed certs)
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Point at a different manager resource
    pub fn with_manager_path(mut self, path: impl Into<String>) -> Self {
        self.manager_path = path.into();
        self
    }

    /// Set the connect and default request timeouts
    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    /// Set the per-request retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff base delay and the direct-mode auth retry delay
    pub fn with_retry_delays(mut self, base: Duration, auth: Duration) -> Self {
        self.retry_base_delay = base;
        self.auth_retry_delay = auth;
        self
    }

    /// Set the session eviction pacing
    pub fn with_eviction_delays(mut self, between: Duration, settle: Duration) -> Self {
        self.eviction_delay = between;
        self.eviction_settle = settle;
        self
    }

    /// Set the job poll policy
    pub fn with_job_poll(mut self, policy: PollPolicy) -> Self {
        self.job_poll = policy;
        self
    }

    /// Set the task poll policy
    pub fn with_task_poll(mut self, policy: PollPolicy) -> Self {
        self.task_poll = policy;
        self
    }

    /// Set the address cutover poll policy
    pub fn with_cutover_poll(mut self, policy: PollPolicy) -> Self {
        self.cutover_poll = policy;
        self
    }

    /// Check the configuration before any connection is attempted
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| RedfishError::InvalidConfig(format!("base URL {}: {}", self.base_url, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(RedfishError::InvalidConfig(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(RedfishError::InvalidConfig("base URL has no host".to_string()));
        }
        if self.username.is_empty() {
            return Err(RedfishError::InvalidConfig("username is empty".to_string()));
        }
        if !self.manager_path.starts_with('/') {
            return Err(RedfishError::InvalidConfig(format!(
                "manager path must be absolute: {}",
                self.manager_path
            )));
        }
        if self.max_retries == 0 {
            return Err(RedfishError::InvalidConfig(
                "max_retries must be at least 1".to_string(),
            ));
        }
        for (name, policy) in [
            ("job", self.job_poll),
            ("task", self.task_poll),
            ("cutover", self.cutover_poll),
        ] {
            if policy.max_polls == 0 {
                return Err(RedfishError::InvalidConfig(format!(
                    "{} poll budget must be at least 1",
                    name
                )));
            }
        }
        Ok(())
    }
}
