//! Rackfish BMC client
//!
//! A Redfish client for Dell iDRAC controllers that survives the usual
//! misbehaviour of embedded management stacks: session quotas, expiring
//! tokens, flaky connections and the controller moving to a new address.
//!
//! # Layers
//!
//! - **Transport**: one HTTP client per BMC, per-call timeouts
//! - **Sessions**: token negotiation with four login strategies, falling
//!   back to Basic Auth on every request when none works
//! - **Executor**: a bounded retry loop that re-authenticates on 401/403
//! - **Tracker**: polling of Redfish jobs and tasks to a terminal state
//! - **SCP**: export and import of Server Configuration Profiles
//! - **Cutover**: following the BMC to a new management address
//!
//! # Example
//!
//! ```no_run
//! use rackfish_bmc::{Client, RedfishConfig, ScpTarget};
//!
//! # async fn example() -> rackfish_bmc::Result<()> {
//! let config = RedfishConfig::new("https://10.0.0.5", "root", "calvin").with_insecure(true);
//! let mut client = Client::connect(config).await?;
//!
//! let profile = client.export_configuration(ScpTarget::Bios).await?;
//! if let Some(bios) = profile.component("BIOS.Setup.1-1") {
//!     println!("{} BIOS attributes", bios.attributes.len());
//! }
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Power control
//!
//! ```no_run
//! use rackfish_bmc::{BmcController, BootDevice, Client, RedfishConfig, RedfishController};
//!
//! # async fn example() -> rackfish_bmc::Result<()> {
//! let client = Client::connect(RedfishConfig::new("https://10.0.0.5", "root", "calvin")).await?;
//! let controller = RedfishController::new(client);
//!
//! // Set PXE boot for next reboot
//! controller.set_boot_device(BootDevice::Pxe, false).await?;
//! controller.power_cycle().await?;
//!
//! controller.into_client().close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod controller;
pub mod cutover;
pub mod error;
pub mod executor;
pub mod redfish;
pub mod response;
pub mod scp;
pub mod session;
pub mod tracker;
pub mod transport;
pub mod types;

pub use client::Client;
pub use controller::{BmcController, BmcOperation, ResetType};
pub use error::{FailureClass, RedfishError, Result};
pub use executor::{RequestExecutor, RetryContext};
pub use redfish::RedfishController;
pub use response::{ExtendedInfo, RedfishResponse};
pub use scp::{
    ConfigAttribute, ConfigComponent, ConfigProfile, HostPowerState, RebootPolicy, ScpTarget,
    ShutdownType,
};
pub use session::{AuthMode, ServiceRoot, Session, SessionManager, LOGIN_STRATEGIES};
pub use tracker::{
    AsyncOperationTracker, OperationHandle, OperationKind, OperationState, OperationStatus,
    ResourceReader, TaskOutcome,
};
pub use transport::{Credentials, RedfishRequest, RequestOptions, TransportSession};
pub use types::{BootDevice, PollPolicy, PowerState, RedfishConfig};
