mod common;

use common::*;
use rackfish_bmc::{AuthMode, Client, RedfishError};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_first_strategy_creates_session() {
    init_tracing();
    let server = MockServer::start().await;
    mount_bmc(&server, "tok-1").await;

    let client = Client::connect(fast_config(&server.uri())).await.unwrap();

    assert_eq!(client.auth_mode(), AuthMode::TokenAuth);
    assert_eq!(client.session().token.as_deref(), Some("tok-1"));
    assert_eq!(
        client.session().location.as_deref(),
        Some("/redfish/v1/SessionService/Sessions/1")
    );
}

#[tokio::test]
async fn test_legacy_service_uses_legacy_session_path() {
    init_tracing();
    let server = MockServer::start().await;
    mount_service_root(&server, "1.4.0").await;
    Mock::given(method("POST"))
        .and(path("/redfish/v1/Sessions"))
        .respond_with(ResponseTemplate::new(201).insert_header("X-Auth-Token", "legacy"))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::connect(fast_config(&server.uri())).await.unwrap();
    assert_eq!(client.session().token.as_deref(), Some("legacy"));
    client.logout().await;
}

#[tokio::test]
async fn test_falls_back_to_basic_json_strategy() {
    init_tracing();
    let server = MockServer::start().await;
    mount_service_root(&server, "1.11.0").await;

    // Only requests carrying Basic credentials get a session
    Mock::given(method("POST"))
        .and(path(SESSIONS))
        .and(header("Authorization", basic_header().as_str()))
        .respond_with(session_created("tok-basic", 4))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SESSIONS))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(2)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/redfish/v1/Systems"))
        .and(header("X-Auth-Token", "tok-basic"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Members": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::connect(fast_config(&server.uri())).await.unwrap();
    assert_eq!(client.session().token.as_deref(), Some("tok-basic"));

    let response = client.get("/redfish/v1/Systems").await.unwrap();
    assert_eq!(response.status.as_u16(), 200);
}

#[tokio::test]
async fn test_all_strategies_refused_switches_to_basic_auth() {
    init_tracing();
    let server = MockServer::start().await;
    mount_service_root(&server, "1.6.0").await;
    Mock::given(method("POST"))
        .and(path(SESSIONS))
        .respond_with(ResponseTemplate::new(401))
        .expect(4)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/redfish/v1/Systems"))
        .and(header("Authorization", basic_header().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Members": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::connect(fast_config(&server.uri())).await.unwrap();
    assert_eq!(client.auth_mode(), AuthMode::BasicAuthDirect);
    assert!(client.session().token.is_none());

    // Permanent: no further session POSTs
    assert!(!client.login().await);
    assert!(matches!(
        client.require_session().await,
        Err(RedfishError::AuthenticationFailed(_))
    ));

    let response = client.get("/redfish/v1/Systems").await.unwrap();
    assert!(response.is_success());
}

#[tokio::test]
async fn test_session_quota_evicts_and_retries() {
    init_tracing();
    let server = MockServer::start().await;
    mount_service_root(&server, "1.11.0").await;

    Mock::given(method("POST"))
        .and(path(SESSIONS))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "@Message.ExtendedInfo": [
                { "Message": "Unable to create a session because the maximum number of user sessions is reached." }
            ]}
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SESSIONS))
        .respond_with(session_created("fresh", 9))
        .with_priority(2)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SESSIONS))
        .and(header("Authorization", basic_header().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Members": [
                { "@odata.id": "/redfish/v1/SessionService/Sessions/7" },
                { "@odata.id": "/redfish/v1/SessionService/Sessions/8" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/redfish/v1/SessionService/Sessions/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/redfish/v1/SessionService/Sessions/8"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::connect(fast_config(&server.uri())).await.unwrap();

    assert_eq!(client.auth_mode(), AuthMode::TokenAuth);
    assert_eq!(client.session().token.as_deref(), Some("fresh"));
    assert!(!client.session().sessions_maxed);
}

fn quota_refusal() -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({
        "error": { "@Message.ExtendedInfo": [
            { "Message": "Unable to create a session because the maximum number of user sessions is reached." }
        ]}
    }))
}

#[tokio::test]
async fn test_quota_after_eviction_falls_back_to_basic_auth() {
    init_tracing();
    let server = MockServer::start().await;
    mount_service_root(&server, "1.11.0").await;

    Mock::given(method("POST"))
        .and(path(SESSIONS))
        .respond_with(quota_refusal())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SESSIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Members": [{ "@odata.id": "/redfish/v1/SessionService/Sessions/3" }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/redfish/v1/SessionService/Sessions/3"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::connect(fast_config(&server.uri())).await.unwrap();

    assert_eq!(client.auth_mode(), AuthMode::BasicAuthDirect);
    assert!(client.session().sessions_maxed);
    assert!(client.session().token.is_none());
    assert!(matches!(
        client.require_session().await,
        Err(RedfishError::SessionLimitExceeded(_))
    ));
}

#[tokio::test]
async fn test_quota_with_unlistable_sessions_falls_back_to_basic_auth() {
    init_tracing();
    let server = MockServer::start().await;
    mount_service_root(&server, "1.11.0").await;

    Mock::given(method("POST"))
        .and(path(SESSIONS))
        .respond_with(quota_refusal())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SESSIONS))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::connect(fast_config(&server.uri())).await.unwrap();

    assert_eq!(client.auth_mode(), AuthMode::BasicAuthDirect);
    assert!(client.session().sessions_maxed);
}

#[tokio::test]
async fn test_logout_never_fails() {
    init_tracing();
    let server = MockServer::start().await;
    mount_bmc(&server, "tok-1").await;
    Mock::given(method("DELETE"))
        .and(path("/redfish/v1/SessionService/Sessions/1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let mut client = Client::connect(fast_config(&server.uri())).await.unwrap();
    assert!(client.session().token.is_some());

    assert!(!client.logout().await);
    assert!(client.session().token.is_none());
    assert!(client.session().location.is_none());

    // Nothing left to delete
    assert!(client.logout().await);
}

#[tokio::test]
async fn test_close_deletes_session_with_token() {
    init_tracing();
    let server = MockServer::start().await;
    mount_bmc(&server, "tok-1").await;
    Mock::given(method("DELETE"))
        .and(path("/redfish/v1/SessionService/Sessions/1"))
        .and(header("X-Auth-Token", "tok-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::connect(fast_config(&server.uri())).await.unwrap();
    client.close().await;
}
