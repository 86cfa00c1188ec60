mod common;

use common::*;
use rackfish_bmc::scp::make;
use rackfish_bmc::{
    Client, ConfigProfile, HostPowerState, OperationState, RebootPolicy, RedfishError, ScpTarget,
    ShutdownType,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn export_action() -> String {
    format!("{}/Actions/Oem/EID_674_Manager.ExportSystemConfiguration", MANAGER)
}

fn import_action() -> String {
    format!("{}/Actions/Oem/EID_674_Manager.ImportSystemConfiguration", MANAGER)
}

fn accepted(location: &str) -> ResponseTemplate {
    ResponseTemplate::new(202).insert_header("Location", location)
}

fn sample_profile() -> ConfigProfile {
    let attributes = json!({ "BootMode": "Uefi", "SysProfile": "PerfOptimized" });
    let Value::Object(attributes) = attributes else {
        unreachable!()
    };
    ConfigProfile::new(vec![make("BIOS.Setup.1-1", &attributes, Vec::new())])
}

#[tokio::test]
async fn test_export_waits_for_task_payload() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(export_action()))
        .and(body_partial_json(json!({
            "ExportFormat": "JSON",
            "ShareParameters": { "Target": "BIOS" }
        })))
        .respond_with(accepted("/redfish/v1/TaskService/Tasks/JID_500"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/redfish/v1/TaskService/Tasks/JID_500"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Id": "JID_500",
            "TaskState": "Running",
            "PercentComplete": 20
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/redfish/v1/TaskService/Tasks/JID_500"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "SystemConfiguration": {
                "Model": "PowerEdge R640",
                "ServiceTag": "ABC1234",
                "Components": [{
                    "FQDD": "BIOS.Setup.1-1",
                    "Attributes": [
                        { "Name": "BootMode", "Value": "Uefi", "Set On Import": "True" },
                        { "Name": "ProcCores", "Value": 8, "Set On Import": "False" }
                    ]
                }]
            }
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    let mut client = Client::new(fast_config(&server.uri())).unwrap();
    let profile = client.export_configuration(ScpTarget::Bios).await.unwrap();

    assert_eq!(profile.service_tag.as_deref(), Some("ABC1234"));
    let bios = profile.component("BIOS.Setup.1-1").unwrap();
    assert_eq!(bios.attribute("BootMode").unwrap().value, "Uefi");
    let cores = bios.attribute("ProcCores").unwrap();
    assert_eq!(cores.value, "8");
    assert!(!cores.set_on_import);
}

#[tokio::test]
async fn test_export_without_profile_document_is_not_retried() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(export_action()))
        .respond_with(accepted("/redfish/v1/TaskService/Tasks/JID_501"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/redfish/v1/TaskService/Tasks/JID_501"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Unexpected": true })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::new(fast_config(&server.uri())).unwrap();
    let err = client.export_configuration(ScpTarget::All).await.unwrap_err();

    assert!(matches!(err, RedfishError::ProtocolViolation(_)), "{err:?}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_export_rejected_surfaces_http_error() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(export_action()))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "@Message.ExtendedInfo": [{ "Message": "Lifecycle Controller is in use." }] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::new(fast_config(&server.uri())).unwrap();
    match client.export_configuration(ScpTarget::Idrac).await.unwrap_err() {
        RedfishError::Http { status, messages, .. } => {
            assert_eq!(status.as_u16(), 400);
            assert_eq!(messages, vec!["Lifecycle Controller is in use.".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_import_rejected_synchronously() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(import_action()))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "@Message.ExtendedInfo": [{
                "Message": "Unable to parse the ImportBuffer.",
                "Resolution": "Correct the buffer and retry.",
                "MessageId": "IDRAC.2.8.SYS405"
            }]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::new(fast_config(&server.uri())).unwrap();
    let err = client
        .import_configuration(&sample_profile(), ScpTarget::Bios, RebootPolicy::default())
        .await
        .unwrap_err();

    match err {
        RedfishError::OperationFailed { id, messages, details } => {
            assert_eq!(id, "import");
            assert_eq!(messages, vec!["Unable to parse the ImportBuffer.".to_string()]);
            assert_eq!(details[0].message_id.as_deref(), Some("IDRAC.2.8.SYS405"));
            assert_eq!(details[0].resolution.as_deref(), Some("Correct the buffer and retry."));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_import_follows_job_to_completion() {
    init_tracing();
    let server = MockServer::start().await;
    let job = format!("{}/Jobs/JID_777", MANAGER);
    Mock::given(method("POST"))
        .and(path(import_action()))
        .and(body_partial_json(json!({
            "ShareParameters": { "Target": "ALL" },
            "ShutdownType": "Forced",
            "HostPowerState": "Off"
        })))
        .respond_with(accepted(&job))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(job.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Id": "JID_777",
            "JobState": "Running",
            "PercentComplete": 40
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(job.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Id": "JID_777",
            "JobState": "Completed",
            "PercentComplete": 100,
            "Message": "Successfully imported and applied Server Configuration Profile."
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    let mut client = Client::new(fast_config(&server.uri())).unwrap();
    let status = client
        .import_configuration(
            &sample_profile(),
            ScpTarget::All,
            RebootPolicy::new(ShutdownType::Forced, HostPowerState::Off),
        )
        .await
        .unwrap();

    assert_eq!(status.state, OperationState::Completed);
    assert_eq!(status.percent_complete, Some(100));
    assert_eq!(
        status.messages,
        vec!["Successfully imported and applied Server Configuration Profile.".to_string()]
    );

    // The buffer is the serialized profile document
    let requests = server.received_requests().await.unwrap();
    let post = requests
        .iter()
        .find(|r| r.method.as_str() == "POST")
        .unwrap();
    let body: Value = serde_json::from_slice(&post.body).unwrap();
    let buffer: Value = serde_json::from_str(body["ImportBuffer"].as_str().unwrap()).unwrap();
    let parsed = ConfigProfile::from_payload(buffer).unwrap();
    assert_eq!(parsed, sample_profile());
}

#[tokio::test]
async fn test_import_job_failure() {
    init_tracing();
    let server = MockServer::start().await;
    let job = format!("{}/Jobs/JID_778", MANAGER);
    Mock::given(method("POST"))
        .and(path(import_action()))
        .respond_with(accepted(&job))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(job.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "JobState": "Failed",
            "Message": "Import of Server Configuration Profile operation failed."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::new(fast_config(&server.uri())).unwrap();
    match client
        .import_configuration(&sample_profile(), ScpTarget::Bios, RebootPolicy::default())
        .await
        .unwrap_err()
    {
        RedfishError::OperationFailed { id, messages, .. } => {
            assert_eq!(id, "JID_778");
            assert_eq!(messages.len(), 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_await_job_by_id_times_out() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/Jobs/JID_900", MANAGER)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "JobState": "Scheduled",
            "PercentComplete": 0
        })))
        .expect(5)
        .mount(&server)
        .await;

    let mut client = Client::new(fast_config(&server.uri())).unwrap();
    match client.await_job("JID_900").await.unwrap_err() {
        RedfishError::OperationTimeout { id, polls } => {
            assert_eq!(id, "JID_900");
            assert_eq!(polls, 5);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_await_job_accepts_task_location() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/redfish/v1/TaskService/Tasks/JID_9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Id": "JID_9",
            "TaskState": "Running",
            "PercentComplete": 50
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/redfish/v1/TaskService/Tasks/JID_9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Id": "JID_9",
            "TaskState": "Completed",
            "TaskStatus": "OK"
        })))
        .with_priority(2)
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::new(fast_config(&server.uri())).unwrap();
    let status = client
        .await_job("/redfish/v1/TaskService/Tasks/JID_9")
        .await
        .unwrap();

    assert_eq!(status.state, OperationState::Completed);
}

#[tokio::test]
async fn test_import_follows_task_location() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(import_action()))
        .respond_with(accepted("/redfish/v1/TaskService/Tasks/JID_780"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/redfish/v1/TaskService/Tasks/JID_780"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "TaskState": "Completed",
            "TaskStatus": "Warning",
            "Messages": [{ "Message": "Some attributes were not applied.", "Severity": "Warning" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::new(fast_config(&server.uri())).unwrap();
    let status = client
        .import_configuration(&sample_profile(), ScpTarget::Bios, RebootPolicy::default())
        .await
        .unwrap();

    assert_eq!(status.state, OperationState::CompletedWithErrors);
    assert_eq!(status.details[0].severity.as_deref(), Some("Warning"));
}

#[tokio::test]
async fn test_export_with_job_location_reads_task_service() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(export_action()))
        .respond_with(accepted(&format!("{}/Jobs/JID_502", MANAGER)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/Jobs/JID_502", MANAGER)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Id": "JID_502",
            "JobState": "Running"
        })))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/redfish/v1/TaskService/Tasks/JID_502"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "SystemConfiguration": {
                "Components": [{
                    "FQDD": "NIC.Integrated.1-1-1",
                    "Attributes": [{ "Name": "LegacyBootProto", "Value": "PXE" }]
                }]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::new(fast_config(&server.uri())).unwrap();
    let profile = client.export_configuration(ScpTarget::Nic).await.unwrap();

    let nic = profile.component("NIC.Integrated.1-1-1").unwrap();
    assert_eq!(nic.attribute("LegacyBootProto").unwrap().value, "PXE");
    assert!(nic.attribute("LegacyBootProto").unwrap().set_on_import);
}
