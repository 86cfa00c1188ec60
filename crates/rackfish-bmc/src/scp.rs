//! System Configuration Profile (SCP) export and import
//!
//! An SCP is a tree of components keyed by FQDD, each holding a flat list of
//! `Name`/`Value` attributes. The same name may appear several times in one
//! component (list-valued settings), so attributes are kept as a sequence.

use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::{RedfishError, Result};
use crate::tracker::{OperationHandle, OperationKind, OperationStatus, TaskOutcome};
use crate::transport::{RedfishRequest, RequestOptions};

/// Top-level key of an exported profile document
pub const PROFILE_DOCUMENT_KEY: &str = "SystemConfiguration";

const EXPORT_ACTION: &str = "Actions/Oem/EID_674_Manager.ExportSystemConfiguration";
const IMPORT_ACTION: &str = "Actions/Oem/EID_674_Manager.ImportSystemConfiguration";

/// Which part of the configuration to export or import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScpTarget {
    #[default]
    All,
    Idrac,
    Bios,
    Nic,
    Raid,
    Fc,
    LifecycleController,
    System,
    EventFilters,
}

impl ScpTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScpTarget::All => "ALL",
            ScpTarget::Idrac => "IDRAC",
            ScpTarget::Bios => "BIOS",
            ScpTarget::Nic => "NIC",
            ScpTarget::Raid => "RAID",
            ScpTarget::Fc => "FC",
            ScpTarget::LifecycleController => "LifecycleController",
            ScpTarget::System => "System",
            ScpTarget::EventFilters => "EventFilters",
        }
    }
}

/// How the host is taken down to apply an import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownType {
    #[default]
    Graceful,
    Forced,
    NoReboot,
}

impl ShutdownType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownType::Graceful => "Graceful",
            ShutdownType::Forced => "Forced",
            ShutdownType::NoReboot => "NoReboot",
        }
    }
}

/// Host power state once the import is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostPowerState {
    #[default]
    On,
    Off,
}

impl HostPowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostPowerState::On => "On",
            HostPowerState::Off => "Off",
        }
    }
}

/// Power directives sent with an import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RebootPolicy {
    pub shutdown: ShutdownType,
    pub host_power: HostPowerState,
}

impl RebootPolicy {
    pub fn new(shutdown: ShutdownType, host_power: HostPowerState) -> Self {
        Self {
            shutdown,
            host_power,
        }
    }
}

fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

fn flag_text<S>(value: &bool, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(if *value { "True" } else { "False" })
}

fn default_true() -> bool {
    true
}

/// One `Name`/`Value` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigAttribute {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", deserialize_with = "scalar_string", default)]
    pub value: String,
    #[serde(
        rename = "Set On Import",
        deserialize_with = "flag",
        serialize_with = "flag_text",
        default = "default_true"
    )]
    pub set_on_import: bool,
    #[serde(rename = "Comment", default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ConfigAttribute {
    /// Attribute tagged to be applied on import
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            set_on_import: true,
            comment: None,
        }
    }
}

/// One FQDD-keyed component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigComponent {
    #[serde(rename = "FQDD")]
    pub fqdd: String,
    #[serde(rename = "Attributes", default)]
    pub attributes: Vec<ConfigAttribute>,
    #[serde(rename = "Components", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ConfigComponent>,
}

impl ConfigComponent {
    /// First attribute with this name
    pub fn attribute(&self, name: &str) -> Option<&ConfigAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Every value recorded under this name, in document order
    pub fn attribute_values(&self, name: &str) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|a| a.name == name)
            .map(|a| a.value.as_str())
            .collect()
    }

    /// This component or a descendant with the given FQDD
    pub fn find(&self, fqdd: &str) -> Option<&ConfigComponent> {
        if self.fqdd == fqdd {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(fqdd))
    }
}

/// Flatten a value tree into a component.
///
/// Scalars are stringified, arrays become one sibling attribute per element
/// under the same name, and nested objects become child components keyed by
/// their attribute name. Every synthesized attribute is set on import.
pub fn make(fqdd: &str, attributes: &Map<String, Value>, children: Vec<ConfigComponent>) -> ConfigComponent {
    let mut component = ConfigComponent {
        fqdd: fqdd.to_string(),
        attributes: Vec::new(),
        children,
    };
    for (name, value) in attributes {
        flatten_into(&mut component, name, value);
    }
    component
}

fn flatten_into(component: &mut ConfigComponent, name: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => component.attributes.push(ConfigAttribute::new(name, s.as_str())),
        Value::Number(n) => component.attributes.push(ConfigAttribute::new(name, n.to_string())),
        Value::Bool(b) => component.attributes.push(ConfigAttribute::new(name, b.to_string())),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Array(_) => component
                        .attributes
                        .push(ConfigAttribute::new(name, item.to_string())),
                    other => flatten_into(component, name, other),
                }
            }
        }
        Value::Object(map) => component.children.push(make(name, map, Vec::new())),
    }
}

/// An exported (or to-be-imported) profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigProfile {
    #[serde(rename = "Model", default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(rename = "ServiceTag", default, skip_serializing_if = "Option::is_none")]
    pub service_tag: Option<String>,
    #[serde(rename = "TimeStamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(rename = "Components", default)]
    pub components: Vec<ConfigComponent>,
}

impl ConfigProfile {
    pub fn new(components: Vec<ConfigComponent>) -> Self {
        Self {
            model: None,
            service_tag: None,
            timestamp: None,
            components,
        }
    }

    /// Parse a terminal export payload. A payload without the profile
    /// document key means incompatible firmware and is never retried.
    pub fn from_payload(payload: Value) -> Result<Self> {
        let Value::Object(mut map) = payload else {
            return Err(RedfishError::ProtocolViolation(
                "configuration payload is not a JSON object".to_string(),
            ));
        };
        let document = map.remove(PROFILE_DOCUMENT_KEY).ok_or_else(|| {
            RedfishError::ProtocolViolation(format!(
                "configuration payload has no {} document",
                PROFILE_DOCUMENT_KEY
            ))
        })?;
        serde_json::from_value(document).map_err(|e| {
            RedfishError::ProtocolViolation(format!("malformed {}: {}", PROFILE_DOCUMENT_KEY, e))
        })
    }

    /// Wrap back into the vendor document
    pub fn to_payload(&self) -> Result<Value> {
        let mut document = Map::new();
        document.insert(PROFILE_DOCUMENT_KEY.to_string(), serde_json::to_value(self)?);
        Ok(Value::Object(document))
    }

    /// Serialized document for `ImportBuffer`
    pub fn to_import_buffer(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_payload()?)?)
    }

    /// Component with this FQDD anywhere in the tree
    pub fn component(&self, fqdd: &str) -> Option<&ConfigComponent> {
        self.components.iter().find_map(|c| c.find(fqdd))
    }
}

impl Client {
    fn action_path(&self, action: &str) -> String {
        format!("{}/{}", self.manager_path().trim_end_matches('/'), action)
    }

    /// Export the configuration of `target` and wait for the profile.
    pub async fn export_configuration(&mut self, target: ScpTarget) -> Result<ConfigProfile> {
        let body = json!({
            "ExportFormat": "JSON",
            "ShareParameters": { "Target": target.as_str() },
        });
        let request = RedfishRequest::new(Method::POST, self.action_path(EXPORT_ACTION)).json(body);
        let response = self.execute_authenticated(&request).await?.error_for_status()?;

        let mut handle = OperationHandle::from_response(&response, OperationKind::Task, self.manager_path())?;
        if handle.kind == OperationKind::Job {
            // The exported document is only served by the task service
            handle = OperationHandle::resolve(&handle.id, OperationKind::Task, self.manager_path())?;
            debug!(operation = %handle.id, path = %handle.path, "export answered with a job location");
        }
        info!(operation = %handle.id, target = target.as_str(), "configuration export started");

        match self.await_task_handle(&handle).await? {
            TaskOutcome::Payload(payload) => ConfigProfile::from_payload(payload),
            TaskOutcome::Status(status) => Err(RedfishError::ProtocolViolation(format!(
                "export {} finished as {} without a configuration payload",
                handle.id, status.state
            ))),
        }
    }

    /// Import `profile` into `target`, rebooting the host per `reboot`.
    ///
    /// A response with a body but no `Location` means the service rejected
    /// the buffer outright; that surfaces as [`RedfishError::OperationFailed`].
    pub async fn import_configuration(
        &mut self,
        profile: &ConfigProfile,
        target: ScpTarget,
        reboot: RebootPolicy,
    ) -> Result<OperationStatus> {
        self.import_configuration_with(profile, target, reboot, RequestOptions::default())
            .await
    }

    /// [`Client::import_configuration`] with per-call request options
    pub async fn import_configuration_with(
        &mut self,
        profile: &ConfigProfile,
        target: ScpTarget,
        reboot: RebootPolicy,
        options: RequestOptions,
    ) -> Result<OperationStatus> {
        let body = json!({
            "ImportBuffer": profile.to_import_buffer()?,
            "ShareParameters": { "Target": target.as_str() },
            "ShutdownType": reboot.shutdown.as_str(),
            "HostPowerState": reboot.host_power.as_str(),
        });
        let request = RedfishRequest::new(Method::POST, self.action_path(IMPORT_ACTION))
            .json(body)
            .options(options);
        let response = self.execute_authenticated(&request).await?;

        if response.location().is_none() {
            if response.has_body() {
                let messages = response.messages();
                warn!(status = %response.status, messages = ?messages, "configuration import rejected");
                return Err(RedfishError::OperationFailed {
                    id: "import".to_string(),
                    messages,
                    details: response.extended_info(),
                });
            }
            return Err(RedfishError::ProtocolViolation(format!(
                "import answered HTTP {} with neither a body nor a Location",
                response.status
            )));
        }

        let handle = OperationHandle::from_response(&response, OperationKind::Job, self.manager_path())?;
        info!(
            operation = %handle.id,
            target = target.as_str(),
            shutdown = reboot.shutdown.as_str(),
            "configuration import started"
        );

        self.await_job_handle(&handle).await
    }
}
