//! HomematicIP cloud client
//!
//! Thin adapter over the HomematicIP REST API and its websocket push channel:
//!
//! - endpoint lookup (`getHost`) for the access point
//! - full state fetch (`home/getCurrentState`) into a cached [`DeviceSnapshot`]
//! - switch control (`device/control/setSwitchState`)
//! - push notifications forwarded frame by frame as [`NotificationEvent`]s
//!
//! No reconnect, token pairing or retry happens here; the periodic full sync
//! is what keeps the outlet correct when the push channel drops.

use crate::client::{DeviceSnapshot, DeviceStateClient, NotificationEvent, SwitchActuator};
use crate::config::SwitchConfig;
use crate::error::{Result, ValveSwitchError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha512};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Salt appended to the access point id for the CLIENTAUTH header
const CLIENT_AUTH_SALT: &str = "jiLpVitHvWnIGD1yo7MA";

/// REST API version header value
const API_VERSION: &str = "12";

/// How long `close()` waits for the push reader to finish
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Compute the CLIENTAUTH header for an access point id
pub fn client_auth(accesspoint_id: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(accesspoint_id.as_bytes());
    hasher.update(CLIENT_AUTH_SALT.as_bytes());
    hex::encode_upper(hasher.finalize())
}

/// REST and websocket endpoints of the access point's cloud home
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HmipEndpoints {
    #[serde(rename = "urlREST")]
    pub rest: Url,
    #[serde(rename = "urlWebSocket")]
    pub websocket: Url,
}

/// Credentials as sent on every request
#[derive(Debug, Clone)]
struct AuthHeaders {
    authtoken: String,
    client_auth: String,
    accesspoint_id: String,
}

/// HomematicIP cloud client
pub struct HmipClient {
    /// HTTP client with auth headers preset
    http: reqwest::Client,

    /// Credentials for the websocket handshake
    auth: AuthHeaders,

    /// Resolved endpoints
    endpoints: HmipEndpoints,

    /// Last fetched snapshot
    snapshot: RwLock<Arc<DeviceSnapshot>>,

    /// Stops the push reader
    events_cancel: CancellationToken,

    /// Background task handles
    task_handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl HmipClient {
    /// Resolve the endpoints for the configured access point and create a client
    pub async fn connect(config: &SwitchConfig) -> Result<Self> {
        let auth = AuthHeaders::from_config(config);
        let http = build_http_client(&auth, config.cloud.timeout, false)?;

        let lookup_url = endpoint(&config.cloud.lookup_url, "getHost");
        info!("Looking up HomematicIP endpoints at {}", lookup_url);

        let body = json!({
            "clientCharacteristics": client_characteristics(),
            "id": auth.accesspoint_id,
        });
        let response = http.post(lookup_url).json(&body).send().await?;
        let value = read_response(response, "getHost").await?;
        let endpoints: HmipEndpoints = serde_json::from_value(value)?;

        debug!(
            "REST endpoint {}, websocket endpoint {}",
            endpoints.rest, endpoints.websocket
        );
        Self::with_endpoints(config, endpoints)
    }

    /// Create a client for already known endpoints
    pub fn with_endpoints(config: &SwitchConfig, endpoints: HmipEndpoints) -> Result<Self> {
        let auth = AuthHeaders::from_config(config);
        let http = build_http_client(&auth, config.cloud.timeout, true)?;

        Ok(Self {
            http,
            auth,
            endpoints,
            snapshot: RwLock::new(Arc::new(DeviceSnapshot::default())),
            events_cancel: CancellationToken::new(),
            task_handles: Mutex::new(Vec::new()),
        })
    }

    /// Resolved endpoints
    pub fn endpoints(&self) -> &HmipEndpoints {
        &self.endpoints
    }

    /// POST to a REST path below `hmip/`
    async fn rest_call(&self, path: &str, body: Value) -> Result<Value> {
        let url = endpoint(&self.endpoints.rest, &format!("hmip/{path}"));
        debug!("POST {}", url);

        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ValveSwitchError::timeout(format!("{path}: {e}"))
                } else {
                    ValveSwitchError::from(e)
                }
            })?;
        read_response(response, path).await
    }

    /// Switch one channel of a switching device
    pub async fn set_switch_state(&self, device_id: &str, channel_index: u8, on: bool) -> Result<()> {
        let body = json!({
            "channelIndex": channel_index,
            "deviceId": device_id,
            "on": on,
        });
        self.rest_call("device/control/setSwitchState", body)
            .await
            .map_err(|e| match e {
                auth @ ValveSwitchError::Authentication(_) => auth,
                other => ValveSwitchError::device_control(format!(
                    "setSwitchState({on}) for {device_id} failed: {other}"
                )),
            })?;
        Ok(())
    }
}

#[async_trait]
impl DeviceStateClient for HmipClient {
    async fn refresh_snapshot(&self) -> Result<()> {
        let state = self
            .rest_call(
                "home/getCurrentState",
                json!({ "clientCharacteristics": client_characteristics() }),
            )
            .await?;
        let snapshot = DeviceSnapshot::from_current_state(&state)?;
        debug!("Fetched current state with {} devices", snapshot.len());

        *self.snapshot.write().await = Arc::new(snapshot);
        Ok(())
    }

    async fn snapshot(&self) -> Arc<DeviceSnapshot> {
        self.snapshot.read().await.clone()
    }

    async fn enable_events(&self) -> Result<mpsc::UnboundedReceiver<NotificationEvent>> {
        let mut request = self.endpoints.websocket.as_str().into_client_request()?;
        {
            use tokio_tungstenite::tungstenite::http::HeaderValue as WsHeaderValue;

            let headers = request.headers_mut();
            for (name, value) in [
                ("authtoken", self.auth.authtoken.as_str()),
                ("clientauth", self.auth.client_auth.as_str()),
                ("accesspoint-id", self.auth.accesspoint_id.as_str()),
            ] {
                let value = WsHeaderValue::from_str(value).map_err(|e| {
                    ValveSwitchError::config(format!("Invalid {name} header value: {e}"))
                })?;
                headers.insert(name, value);
            }
        }

        info!("Connecting push channel to {}", self.endpoints.websocket);
        let (ws_stream, response) = connect_async(request)
            .await
            .map_err(|e| ValveSwitchError::websocket(format!("connection failed: {e}")))?;
        debug!("WebSocket connected, response: {:?}", response.status());

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.events_cancel.clone();

        let handle = tokio::spawn(async move {
            let (mut sink, mut stream) = ws_stream.split();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        if let Err(e) = sink.send(Message::Close(None)).await {
                            debug!("Close frame not sent: {}", e);
                        }
                        break;
                    }
                    message = stream.next() => match message {
                        Some(Ok(Message::Binary(data))) => {
                            if tx.send(NotificationEvent::Bytes(data)).is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Text(text))) => {
                            if tx.send(NotificationEvent::Text(text)).is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("WebSocket closed by server: {:?}", frame);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("WebSocket error: {}", e);
                            break;
                        }
                        None => {
                            info!("WebSocket stream ended");
                            break;
                        }
                    }
                }
            }
        });
        self.task_handles.lock().await.push(handle);

        info!("✅ Push channel enabled");
        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        self.events_cancel.cancel();

        let handles: Vec<_> = self.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            match tokio::time::timeout(CLOSE_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Push reader ended abnormally: {}", e),
                Err(_) => warn!("Push reader did not stop within {:?}", CLOSE_TIMEOUT),
            }
        }

        info!("📴 WebSocket closed");
        Ok(())
    }
}

/// The switched outlet, addressed through the cloud client
pub struct HmipSwitch {
    client: Arc<HmipClient>,
    device_id: String,
    label: String,
    channel_index: u8,
}

impl HmipSwitch {
    pub fn new(client: Arc<HmipClient>, device_id: String, label: String, channel_index: u8) -> Self {
        Self {
            client,
            device_id,
            label,
            channel_index,
        }
    }
}

#[async_trait]
impl SwitchActuator for HmipSwitch {
    async fn set_switch_state(&self, on: bool) -> Result<()> {
        self.client
            .set_switch_state(&self.device_id, self.channel_index, on)
            .await
    }

    fn label(&self) -> &str {
        &self.label
    }
}

impl AuthHeaders {
    fn from_config(config: &SwitchConfig) -> Self {
        let accesspoint_id = config.accesspoint_id();
        Self {
            authtoken: config.auth.authtoken.trim().to_string(),
            client_auth: client_auth(&accesspoint_id),
            accesspoint_id,
        }
    }
}

fn build_http_client(auth: &AuthHeaders, timeout: Duration, with_token: bool) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(HeaderName::from_static("version"), HeaderValue::from_static(API_VERSION));

    let mut custom = vec![
        ("clientauth", auth.client_auth.as_str()),
        ("accesspoint-id", auth.accesspoint_id.as_str()),
    ];
    if with_token {
        custom.push(("authtoken", auth.authtoken.as_str()));
    }
    for (name, value) in custom {
        let value = HeaderValue::from_str(value)
            .map_err(|e| ValveSwitchError::config(format!("Invalid {name} header value: {e}")))?;
        headers.insert(HeaderName::from_static(name), value);
    }

    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()?)
}

fn client_characteristics() -> Value {
    json!({
        "apiVersion": "10",
        "applicationIdentifier": env!("CARGO_PKG_NAME"),
        "applicationVersion": env!("CARGO_PKG_VERSION"),
        "deviceManufacturer": "none",
        "deviceType": "Computer",
        "language": "de_DE",
        "osType": std::env::consts::OS,
        "osVersion": std::env::consts::ARCH,
    })
}

fn endpoint(base: &Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path)
}

/// Map the HTTP status to an error and parse the body (empty body reads as null)
async fn read_response(response: reqwest::Response, operation: &str) -> Result<Value> {
    let status = response.status();
    let text = response.text().await?;

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ValveSwitchError::authentication(format!(
            "{operation} rejected with {status}"
        )));
    }
    if !status.is_success() {
        let detail: String = text.chars().take(200).collect();
        return Err(ValveSwitchError::external_service_error(format!(
            "{operation} returned {status}: {detail}"
        )));
    }

    if text.trim().is_empty() {
        Ok(Value::Null)
    } else {
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_auth_is_upper_hex_sha512() {
        let auth = client_auth("3014F711A000000000001234");
        assert_eq!(auth.len(), 128);
        assert!(auth
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert_eq!(auth, client_auth("3014F711A000000000001234"));
        assert_ne!(auth, client_auth("3014F711A000000000001235"));
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let base = Url::parse("https://srv1.homematic.com:6969/").unwrap();
        assert_eq!(
            endpoint(&base, "hmip/home/getCurrentState"),
            "https://srv1.homematic.com:6969/hmip/home/getCurrentState"
        );
    }

    #[test]
    fn test_endpoints_deserialize() {
        let endpoints: HmipEndpoints = serde_json::from_value(json!({
            "urlREST": "https://srv1.homematic.com:6969",
            "urlWebSocket": "wss://srv1.homematic.com:8888",
            "apiVersion": "12"
        }))
        .unwrap();
        assert_eq!(endpoints.websocket.scheme(), "wss");
    }
}
