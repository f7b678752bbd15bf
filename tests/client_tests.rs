//! Integration tests for the signed client: signing headers, token
//! refresh, rate-limit backoff, and pagination against a mock cloud.

mod common;

use common::tuya_mock::{device_json, envelope, property_json, MockTuyaServer};
use serde_json::json;
use tuya_automation::{SpaceDeviceQuery, TuyaError};
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn signed_requests_carry_signature_headers() {
    let mock = MockTuyaServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2.0/cloud/scene/rule"))
        .and(header("sign_method", "HMAC-SHA256"))
        .and(header("client_id", "test-client-id"))
        .and(header("access_token", "mock-access-token"))
        .and(header_exists("sign"))
        .and(header_exists("t"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({"list": []}))))
        .expect(1)
        .mount(&mock.server)
        .await;

    let scenes = mock.client().list_scenes("space-1").await.unwrap();
    assert!(scenes.is_empty());
}

#[tokio::test]
async fn unauthorized_response_refreshes_token_once_and_retries() {
    let mock = MockTuyaServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2.0/cloud/scene/rule"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"code": 1010, "msg": "token invalid"})),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2.0/cloud/scene/rule"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(json!({"list": [{"id": "rule-1"}]}))),
        )
        .expect(1)
        .mount(&mock.server)
        .await;

    let scenes = mock.client().list_scenes("space-1").await.unwrap();
    assert_eq!(scenes.len(), 1);
    assert_eq!(scenes[0]["id"], "rule-1");
}

#[tokio::test]
async fn second_unauthorized_is_a_hard_failure() {
    let mock = MockTuyaServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2.0/cloud/scene/rule"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token invalid"))
        .expect(2)
        .mount(&mock.server)
        .await;

    let err = mock.client().list_scenes("space-1").await.unwrap_err();
    assert!(matches!(err, TuyaError::Unauthorized(_)));
}

#[tokio::test]
async fn rate_limited_request_backs_off_and_retries() {
    let mock = MockTuyaServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2.0/cloud/scene/rule"))
        .respond_with(ResponseTemplate::new(429).set_body_string("too many requests"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2.0/cloud/scene/rule"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({"list": []}))))
        .expect(1)
        .mount(&mock.server)
        .await;

    assert!(mock.client().list_scenes("space-1").await.is_ok());
}

#[tokio::test]
async fn persistent_rate_limiting_exhausts_the_retry_budget() {
    let mock = MockTuyaServer::start().await;

    // initial attempt plus three retries
    Mock::given(method("GET"))
        .and(path("/v2.0/cloud/scene/rule"))
        .respond_with(ResponseTemplate::new(429).set_body_string("too many requests"))
        .expect(4)
        .mount(&mock.server)
        .await;

    let err = mock.client().list_scenes("space-1").await.unwrap_err();
    assert!(matches!(err, TuyaError::RateLimited(_)));
}

#[tokio::test]
async fn device_listing_follows_pagination_cursors() {
    let mock = MockTuyaServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2.0/cloud/thing/space/device"))
        .and(query_param("last_id", "dev-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "list": [device_json("dev-3", "p3", "cz", "Heater")],
            "has_more": false,
        }))))
        .expect(1)
        .mount(&mock.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2.0/cloud/thing/space/device"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "list": [
                device_json("dev-1", "p1", "qt", "Inverter"),
                device_json("dev-2", "p2", "cz", "Plug"),
            ],
            "has_more": true,
            "last_id": "dev-2",
        }))))
        .expect(1)
        .mount(&mock.server)
        .await;

    let devices = mock
        .client()
        .list_space_devices(&["space-1".to_string()], &SpaceDeviceQuery::default())
        .await
        .unwrap();
    let ids: Vec<&str> = devices.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["dev-1", "dev-2", "dev-3"]);
}

#[tokio::test]
async fn device_listing_accepts_bare_array_results() {
    let mock = MockTuyaServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2.0/cloud/thing/space/device"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
            device_json("dev-1", "p1", "qt", "Inverter"),
        ]))))
        .expect(1)
        .mount(&mock.server)
        .await;

    let devices = mock
        .client()
        .list_space_devices(&["space-1".to_string()], &SpaceDeviceQuery::default())
        .await
        .unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].custom_name.as_deref(), Some("Inverter"));
}

#[tokio::test]
async fn failed_envelope_surfaces_the_api_error_body() {
    let mock = MockTuyaServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2.0/cloud/scene/rule"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "code": 1106,
            "msg": "permission deny",
        })))
        .mount(&mock.server)
        .await;

    let err = mock.client().list_scenes("space-1").await.unwrap_err();
    match err {
        TuyaError::Api { status, body } => {
            assert_eq!(status, 200);
            assert!(body.contains("permission deny"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn token_failure_maps_to_auth_error() {
    let mock = MockTuyaServer::start_bare().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "code": 1001,
            "msg": "secret invalid",
        })))
        .mount(&mock.server)
        .await;

    let err = mock.client().list_scenes("space-1").await.unwrap_err();
    assert!(matches!(err, TuyaError::Auth(_)));
    assert!(err.is_auth_error());
}

#[tokio::test]
async fn shadow_read_decodes_property_values() {
    let mock = MockTuyaServer::start().await;
    mock.mock_device_shadow(
        "dev-1",
        json!([
            property_json("Bateria", json!(82)),
            property_json("Producao_Solar_Atual", json!(1450)),
        ]),
    )
    .await;

    let properties = mock
        .client()
        .get_device_shadow("dev-1", None)
        .await
        .unwrap();
    assert_eq!(properties.len(), 2);
    assert_eq!(properties[0].code, "Bateria");
    assert_eq!(properties[0].value, json!(82));
}
