// Integration tests for `TahomaClient` using wiremock.
#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tahoma_api::{CommandRecord, Error, ExecutionEnvelope, TahomaClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, TahomaClient) {
    let server = MockServer::start().await;
    let base = Url::parse(&format!("{}/enduserAPI", server.uri())).unwrap();
    let client = TahomaClient::new(base, &TransportConfig::default()).unwrap();
    (server, client)
}

fn password() -> SecretString {
    SecretString::from("hunter2".to_owned())
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_posts_form_and_keeps_cookie() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/enduserAPI/login"))
        .and(body_string_contains("userId=me%40example.com"))
        .and(body_string_contains("userPassword=hunter2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "JSESSIONID=abc123; Path=/")
                .set_body_json(json!({ "success": true, "roles": [] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/enduserAPI/setup/devices"))
        .and(header("cookie", "JSESSIONID=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    client.login("me@example.com", &password()).await.unwrap();
    let devices = client.list_devices().await.unwrap();
    assert!(devices.is_empty());
}

#[tokio::test]
async fn test_login_rejected_by_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/enduserAPI/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": false, "error": "Bad credentials" })),
        )
        .mount(&server)
        .await;

    let err = client.login("me", &password()).await.unwrap_err();
    match err {
        Error::Authentication { message } => assert_eq!(message, "Bad credentials"),
        other => panic!("expected Authentication, got {other:?}"),
    }
}

#[tokio::test]
async fn test_login_rejected_by_status() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/enduserAPI/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errorCode": "AUTHENTICATION_ERROR",
            "error": "Bad credentials"
        })))
        .mount(&server)
        .await;

    let err = client.login("me", &password()).await.unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }));
}

// ── Events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_register_and_fetch_events() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/enduserAPI/events/register"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "L1" })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/enduserAPI/events/L1/fetch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "name": "DeviceStateChangedEvent",
                "deviceURL": "io://1234/1",
                "deviceStates": [{ "name": "core:ClosureState", "type": 1, "value": 40 }]
            },
            { "name": "ExecutionStateChangedEvent", "execId": "E1", "newState": "IN_PROGRESS" }
        ])))
        .mount(&server)
        .await;

    let id = client.register_listener().await.unwrap();
    assert_eq!(id, "L1");

    let events = client.fetch_events(&id).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].device_url.as_deref(), Some("io://1234/1"));
    let states = events[0].device_states.as_ref().unwrap();
    assert_eq!(states[0].value, json!(40));
    assert_eq!(events[1].exec_id.as_deref(), Some("E1"));
}

#[tokio::test]
async fn test_fetch_with_stale_listener_is_api_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/enduserAPI/events/gone/fetch"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errorCode": "UNSPECIFIED_ERROR",
            "error": "No registered event listener"
        })))
        .mount(&server)
        .await;

    let err = client.fetch_events("gone").await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert_eq!(err.api_error_code(), Some("UNSPECIFIED_ERROR"));
}

#[tokio::test]
async fn test_unregister_ignores_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/enduserAPI/events/L1/unregister"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.unregister_listener("L1").await.unwrap();
}

// ── Setup ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/enduserAPI/setup/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "deviceURL": "io://1234/1",
                "label": "Living room blind",
                "controllableName": "io:RollerShutterGenericIOComponent",
                "definition": { "commands": [{ "commandName": "open", "nparams": 0 }] },
                "states": [
                    { "name": "core:ClosureState", "type": 1, "value": 0 },
                    { "name": "core:OpenClosedState", "type": 3, "value": "open" }
                ],
                "available": true,
                "enabled": true
            }
        ])))
        .mount(&server)
        .await;

    let devices = client.list_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].label, "Living room blind");
    assert_eq!(
        devices[0].controllable_name.as_deref(),
        Some("io:RollerShutterGenericIOComponent")
    );
    assert_eq!(devices[0].states.len(), 2);
    assert_eq!(devices[0].states[1].value, json!("open"));
}

#[tokio::test]
async fn test_refresh_states_is_put() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/enduserAPI/setup/devices/states/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.refresh_states().await.unwrap();
}

#[tokio::test]
async fn test_get_state_encodes_device_url() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path_regex(
            r"^/enduserAPI/setup/devices/io:%2F%2F1234%2F1/states/core:ClosureState$",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "core:ClosureState",
            "type": 1,
            "value": 75
        })))
        .expect(1)
        .mount(&server)
        .await;

    let value = client
        .get_state("io://1234/1", "core:ClosureState")
        .await
        .unwrap();
    assert_eq!(value, json!(75));
}

// ── Executions ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_apply_execution_sends_envelope() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/enduserAPI/exec/apply"))
        .and(body_json(json!({
            "label": "tahoma command",
            "metadata": null,
            "actions": [{
                "deviceURL": "io://1234/1",
                "commands": [{ "name": "setClosure", "type": 1, "parameters": [30] }]
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "execId": "E1" })))
        .expect(1)
        .mount(&server)
        .await;

    let envelope = ExecutionEnvelope::single(
        "tahoma command",
        "io://1234/1",
        CommandRecord::action("setClosure", vec![json!(30)]),
    );
    let exec_id = client.apply_execution(&envelope).await.unwrap();
    assert_eq!(exec_id, "E1");
}

#[tokio::test]
async fn test_current_execution_first_device() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/enduserAPI/exec/current/E7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "E7",
            "state": "IN_PROGRESS",
            "actionGroup": {
                "label": "tahoma command",
                "actions": [{ "deviceURL": "io://1234/9", "commands": [] }]
            }
        })))
        .mount(&server)
        .await;

    let current = client.current_execution("E7").await.unwrap();
    assert_eq!(current.first_device_url(), Some("io://1234/9"));
    assert_eq!(current.state.as_deref(), Some("IN_PROGRESS"));
}

#[tokio::test]
async fn test_cancel_execution_is_delete() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/enduserAPI/exec/current/setup/E1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.cancel_execution("E1").await.unwrap();
}

// ── Error mapping ───────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_maps_to_session_expired() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/enduserAPI/setup/devices"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errorCode": "RESOURCE_ACCESS_DENIED",
            "error": "Not authenticated"
        })))
        .mount(&server)
        .await;

    let err = client.list_devices().await.unwrap_err();
    assert!(err.is_session_expired());
}

#[tokio::test]
async fn test_server_error_without_body() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/enduserAPI/setup/devices/states/refresh"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.refresh_states().await.unwrap_err();
    assert_eq!(err.to_string(), "Error 503");
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/enduserAPI/events/register"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client.register_listener().await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert_eq!(body, "not json"),
        other => panic!("expected Deserialization, got {other:?}"),
    }
}
