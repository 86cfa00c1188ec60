#![allow(dead_code)]

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rackfish_bmc::{PollPolicy, RedfishConfig};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const USERNAME: &str = "root";
pub const PASSWORD: &str = "calvin";
pub const SESSIONS: &str = "/redfish/v1/SessionService/Sessions";
pub const MANAGER: &str = "/redfish/v1/Managers/iDRAC.Embedded.1";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Config with every delay shrunk to a few milliseconds
pub fn fast_config(base_url: &str) -> RedfishConfig {
    RedfishConfig::new(base_url, USERNAME, PASSWORD)
        .with_timeouts(Duration::from_secs(2), Duration::from_secs(5))
        .with_max_retries(3)
        .with_retry_delays(Duration::from_millis(5), Duration::from_millis(5))
        .with_eviction_delays(Duration::from_millis(5), Duration::from_millis(5))
        .with_job_poll(PollPolicy::new(Duration::from_millis(10), 5))
        .with_task_poll(PollPolicy::new(Duration::from_millis(10), 5))
        .with_cutover_poll(PollPolicy::new(Duration::from_millis(50), 20))
}

pub fn basic_header() -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", USERNAME, PASSWORD)))
}

pub async fn mount_service_root(server: &MockServer, version: &str) {
    Mock::given(method("GET"))
        .and(path("/redfish/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "RedfishVersion": version,
            "Vendor": "Dell",
            "Product": "Integrated Dell Remote Access Controller",
        })))
        .mount(server)
        .await;
}

pub fn session_created(token: &str, id: u32) -> ResponseTemplate {
    ResponseTemplate::new(201)
        .insert_header("X-Auth-Token", token)
        .insert_header("Location", format!("{}/{}", SESSIONS, id).as_str())
        .set_body_json(json!({ "@odata.id": format!("{}/{}", SESSIONS, id) }))
}

/// Service root plus a session collection that always grants `token`
pub async fn mount_bmc(server: &MockServer, token: &str) {
    mount_service_root(server, "1.11.0").await;
    Mock::given(method("POST"))
        .and(path(SESSIONS))
        .respond_with(session_created(token, 1))
        .mount(server)
        .await;
}
