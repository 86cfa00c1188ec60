//! Buffered Redfish responses and vendor extended info

use reqwest::header::{HeaderMap, LOCATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{RedfishError, Result};

/// One entry of a `@Message.ExtendedInfo` array
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtendedInfo {
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "Resolution", default)]
    pub resolution: Option<String>,
    #[serde(rename = "Severity", default)]
    pub severity: Option<String>,
    #[serde(rename = "MessageId", default)]
    pub message_id: Option<String>,
}

/// A fully read response. The body is buffered so that the executor can
/// classify read failures along with transport failures.
#[derive(Debug, Clone)]
pub struct RedfishResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl RedfishResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: String) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// `Location` header, if present and valid UTF-8
    pub fn location(&self) -> Option<&str> {
        self.header(LOCATION.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    }

    /// True when the body carries something other than whitespace
    pub fn has_body(&self) -> bool {
        !self.body.trim().is_empty()
    }

    /// Deserialize the body
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Body as a JSON value, `None` when empty or not JSON
    pub fn json_value(&self) -> Option<Value> {
        if !self.has_body() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }

    /// Vendor extended info, from either `error.@Message.ExtendedInfo`
    /// or a top-level `@Message.ExtendedInfo`
    pub fn extended_info(&self) -> Vec<ExtendedInfo> {
        let Some(value) = self.json_value() else {
            return Vec::new();
        };
        let entries = value
            .pointer("/error/@Message.ExtendedInfo")
            .or_else(|| value.get("@Message.ExtendedInfo"));

        match entries {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Extended info messages verbatim; falls back to `error.message`
    /// and finally to the raw body
    pub fn messages(&self) -> Vec<String> {
        let info = self.extended_info();
        if !info.is_empty() {
            return info.into_iter().map(|i| i.message).collect();
        }
        if let Some(message) = self
            .json_value()
            .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        {
            return vec![message];
        }
        if self.has_body() {
            vec![self.body.trim().to_string()]
        } else {
            Vec::new()
        }
    }

    /// Turn a non-success status into [`RedfishError::Http`]
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(RedfishError::Http {
                status: self.status,
                messages: self.messages(),
                details: self.extended_info(),
            })
        }
    }
}
