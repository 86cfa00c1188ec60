//! Redfish power and boot control
//!
//! A thin mapping of [`BmcController`] onto `ComputerSystem.Reset` actions
//! and `Boot` PATCHes, issued through the client's authenticated executor.
//! The system resource is discovered from the `Systems` collection once.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{Mutex, OnceCell};
use tracing::info;

use crate::client::Client;
use crate::controller::{BmcController, BmcOperation, ResetType};
use crate::error::{RedfishError, Result};
use crate::types::{BootDevice, PowerState};

const SYSTEMS_PATH: &str = "/redfish/v1/Systems";

/// Redfish REST API controller
#[derive(Debug)]
pub struct RedfishController {
    client: Mutex<Client>,
    system_path: OnceCell<String>,
}

impl RedfishController {
    /// Wrap a connected client
    pub fn new(client: Client) -> Self {
        Self {
            client: Mutex::new(client),
            system_path: OnceCell::new(),
        }
    }

    /// Give the client back, e.g. to close it
    pub fn into_client(self) -> Client {
        self.client.into_inner()
    }

    /// Exclusive access to the underlying client
    pub async fn client(&self) -> tokio::sync::MutexGuard<'_, Client> {
        self.client.lock().await
    }

    async fn system_path(&self) -> Result<String> {
        self.system_path
            .get_or_try_init(|| self.discover_system_path())
            .await
            .cloned()
    }

    async fn discover_system_path(&self) -> Result<String> {
        let response = self.client.lock().await.get(SYSTEMS_PATH).await?.error_for_status()?;
        let collection: Value = response.json()?;
        let path = collection
            .pointer("/Members/0/@odata.id")
            .and_then(Value::as_str)
            .ok_or_else(|| RedfishError::ProtocolViolation("Systems collection has no members".to_string()))?;
        info!(system = path, "discovered computer system");
        Ok(path.to_string())
    }

    async fn get_system(&self) -> Result<Value> {
        let path = self.system_path().await?;
        let response = self.client.lock().await.get(&path).await?.error_for_status()?;
        response.json()
    }
}

#[async_trait]
impl BmcController for RedfishController {
    async fn reset(&self, reset: ResetType) -> Result<()> {
        let path = format!("{}/Actions/ComputerSystem.Reset", self.system_path().await?);
        self.client
            .lock()
            .await
            .post_json(&path, json!({ "ResetType": reset.as_str() }))
            .await?
            .error_for_status()?;
        info!(reset = reset.as_str(), "reset requested");
        Ok(())
    }

    async fn get_power_state(&self) -> Result<PowerState> {
        let system = self.get_system().await?;
        Ok(system
            .get("PowerState")
            .and_then(Value::as_str)
            .map_or(PowerState::Unknown, PowerState::from_redfish))
    }

    async fn set_boot_device(&self, device: BootDevice, persistent: bool) -> Result<()> {
        let path = self.system_path().await?;
        let enabled = if persistent { "Continuous" } else { "Once" };
        let body = json!({
            "Boot": {
                "BootSourceOverrideEnabled": enabled,
                "BootSourceOverrideTarget": device.redfish_target(),
            }
        });
        self.client
            .lock()
            .await
            .patch_json(&path, body)
            .await?
            .error_for_status()?;
        info!(device = %device, persistent, "boot override set");
        Ok(())
    }

    // Every operation maps onto a Reset action or a Boot PATCH
    fn supports_operation(&self, op: BmcOperation) -> bool {
        match op {
            BmcOperation::PowerOn
            | BmcOperation::PowerOff
            | BmcOperation::PowerCycle
            | BmcOperation::SoftShutdown
            | BmcOperation::GetPowerState
            | BmcOperation::SetBootDevice
            | BmcOperation::SetPersistentBootDevice => true,
        }
    }
}
