//! BMC controller trait

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BootDevice, PowerState};

/// Redfish `ResetType` values accepted by `ComputerSystem.Reset`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetType {
    On,
    ForceOff,
    GracefulShutdown,
    GracefulRestart,
    ForceRestart,
    PowerCycle,
    Nmi,
}

impl ResetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetType::On => "On",
            ResetType::ForceOff => "ForceOff",
            ResetType::GracefulShutdown => "GracefulShutdown",
            ResetType::GracefulRestart => "GracefulRestart",
            ResetType::ForceRestart => "ForceRestart",
            ResetType::PowerCycle => "PowerCycle",
            ResetType::Nmi => "Nmi",
        }
    }
}

/// Power and boot control of one machine
///
/// Implementations are thin request/response mappings over a [`crate::Client`].
#[async_trait]
pub trait BmcController: Send + Sync {
    /// Issue a raw reset
    async fn reset(&self, reset: ResetType) -> Result<()>;

    /// Power on the machine
    async fn power_on(&self) -> Result<()> {
        self.reset(ResetType::On).await
    }

    /// Power off the machine (hard shutdown)
    async fn power_off(&self) -> Result<()> {
        self.reset(ResetType::ForceOff).await
    }

    /// Power cycle the machine
    async fn power_cycle(&self) -> Result<()> {
        self.reset(ResetType::ForceRestart).await
    }

    /// Soft shutdown (ACPI shutdown signal)
    async fn soft_shutdown(&self) -> Result<()> {
        self.reset(ResetType::GracefulShutdown).await
    }

    /// Get current power state
    async fn get_power_state(&self) -> Result<PowerState>;

    /// Set the boot device, for the next boot only or until changed
    async fn set_boot_device(&self, device: BootDevice, persistent: bool) -> Result<()>;

    /// Check if the controller supports a specific operation
    fn supports_operation(&self, op: BmcOperation) -> bool;
}

/// BMC operations for capability checking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmcOperation {
    PowerOn,
    PowerOff,
    PowerCycle,
    SoftShutdown,
    GetPowerState,
    SetBootDevice,
    SetPersistentBootDevice,
}
