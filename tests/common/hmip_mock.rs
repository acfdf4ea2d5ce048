//! WireMock-based HomematicIP cloud mocking
//!
//! Simulates the endpoint lookup and the REST API of one cloud home so the
//! real client can be exercised without an access point.

use serde_json::{json, Value};
use url::Url;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use super::test_fixtures::{TEST_ACCESSPOINT_ID, TEST_AUTHTOKEN};

pub const GET_HOST: &str = "/getHost";
pub const GET_CURRENT_STATE: &str = "/hmip/home/getCurrentState";
pub const SET_SWITCH_STATE: &str = "/hmip/device/control/setSwitchState";

/// Mock HomematicIP cloud (lookup service and REST endpoint on one server)
pub struct MockHmipCloud {
    pub server: MockServer,
}

impl MockHmipCloud {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn url(&self) -> Url {
        Url::parse(&self.server.uri()).expect("mock server URI is a valid URL")
    }

    /// Answer `getHost` for the test access point with this server as REST endpoint
    pub async fn mock_lookup(&self) {
        Mock::given(method("POST"))
            .and(path(GET_HOST))
            .and(header("version", "12"))
            .and(body_partial_json(json!({ "id": TEST_ACCESSPOINT_ID })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "urlREST": self.server.uri(),
                "urlWebSocket": "wss://push.invalid:8888",
                "apiVersion": "12"
            })))
            .mount(&self.server)
            .await;
    }

    /// Answer `getCurrentState` (authenticated) with this body
    pub async fn mock_current_state(&self, state: Value) {
        Mock::given(method("POST"))
            .and(path(GET_CURRENT_STATE))
            .and(header("authtoken", TEST_AUTHTOKEN))
            .and(header("accesspoint-id", TEST_ACCESSPOINT_ID))
            .respond_with(ResponseTemplate::new(200).set_body_json(state))
            .mount(&self.server)
            .await;
    }

    /// Accept every `setSwitchState` with an empty 200
    pub async fn mock_switch_ok(&self) {
        Mock::given(method("POST"))
            .and(path(SET_SWITCH_STATE))
            .and(header("authtoken", TEST_AUTHTOKEN))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
    }

    /// Answer requests to `endpoint` with an error status
    pub async fn mock_error_response(&self, endpoint: &str, status: u16, message: &str) {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "errorCode": message
            })))
            .mount(&self.server)
            .await;
    }

    /// Drop all mounted mocks and recorded requests
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Bodies of all `setSwitchState` requests received so far, in order
    pub async fn switch_requests(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == SET_SWITCH_STATE)
            .map(|request| serde_json::from_slice(&request.body).unwrap_or(Value::Null))
            .collect()
    }
}
