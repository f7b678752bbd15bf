//! WireMock-based Tuya Cloud mocking infrastructure
//!
//! Simulates the Open API envelope (token grant, device listing, shadow
//! properties, scene CRUD) so client and workflow paths are exercised
//! without touching the real cloud.

use serde_json::{json, Value};
use tuya_automation::{TuyaClient, TuyaCredentials};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock Tuya Cloud server
pub struct MockTuyaServer {
    pub server: MockServer,
}

impl MockTuyaServer {
    /// Start a server with the token endpoint already mounted
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let mock = Self { server };
        mock.mock_token_grant().await;
        mock
    }

    /// Start a bare server; tests that exercise the token path mount
    /// their own grant responses
    pub async fn start_bare() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Client wired to this server with deterministic test credentials
    /// and a millisecond-scale rate-limit backoff
    pub fn client(&self) -> TuyaClient {
        let credentials = TuyaCredentials::new("test-client-id", "test-client-secret").unwrap();
        TuyaClient::new(credentials, self.uri())
            .unwrap()
            .with_rate_limit_backoff(std::time::Duration::from_millis(1))
    }

    /// Standard token grant, valid long enough for a whole test
    pub async fn mock_token_grant(&self) {
        Mock::given(method("GET"))
            .and(path("/v1.0/token"))
            .and(query_param("grant_type", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
                "access_token": "mock-access-token",
                "expire_time": 7200,
                "refresh_token": "mock-refresh-token",
                "uid": "mock-uid",
            }))))
            .mount(&self.server)
            .await;
    }

    /// Single-page device listing for any space query
    pub async fn mock_device_list(&self, devices: Value) {
        Mock::given(method("GET"))
            .and(path("/v2.0/cloud/thing/space/device"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
                "list": devices,
                "has_more": false,
            }))))
            .mount(&self.server)
            .await;
    }

    /// Shadow properties for one device
    pub async fn mock_device_shadow(&self, device_id: &str, properties: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/v2.0/cloud/thing/{device_id}/shadow/properties")))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
                "properties": properties,
            }))))
            .mount(&self.server)
            .await;
    }

    /// Scene rule listing for any space query
    pub async fn mock_scene_list(&self, scenes: Value) {
        Mock::given(method("GET"))
            .and(path("/v2.0/cloud/scene/rule"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
                "list": scenes,
            }))))
            .mount(&self.server)
            .await;
    }

    /// Scene creation returning the given rule id
    pub async fn mock_scene_create(&self, rule_id: &str) {
        Mock::given(method("POST"))
            .and(path("/v2.0/cloud/scene/rule"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(envelope(json!({"rule_id": rule_id}))),
            )
            .mount(&self.server)
            .await;
    }

    /// Bulk enable/disable endpoint answering success
    pub async fn mock_scene_state_ok(&self) {
        Mock::given(method("PUT"))
            .and(path("/v2.0/cloud/scene/rule/state"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!(true))))
            .mount(&self.server)
            .await;
    }
}

/// Successful Open API envelope around a result payload
pub fn envelope(result: Value) -> Value {
    json!({
        "success": true,
        "t": 1_700_000_000_000u64,
        "tid": "0123456789abcdef",
        "result": result,
    })
}

/// Device payload in the wire shape of the device listing
pub fn device_json(id: &str, product_id: &str, category: &str, name: &str) -> Value {
    json!({
        "id": id,
        "productId": product_id,
        "category": category,
        "customName": name,
        "isOnline": true,
    })
}

/// Property payload in the wire shape of the shadow endpoint
pub fn property_json(code: &str, value: Value) -> Value {
    json!({
        "code": code,
        "value": value,
        "time": 1_700_000_000_000i64,
    })
}
