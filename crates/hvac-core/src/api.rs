//! HTTP client for the HVAC REST API.
//!
//! [`ZoneApi`] is the surface the engine uses; [`ApiClient`] implements it
//! with `reqwest`. Tests substitute [`MockApi`](crate::mock::MockApi).
//!
//! # Example
//!
//! ```no_run
//! use hvac_core::api::{ApiClient, ZoneApi};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new("http://localhost:8000")?;
//!
//! for zone in client.zones().await? {
//!     let history = client.history(&zone.id, 30).await?;
//!     println!("{}: {} samples", zone.name, history.readings.len());
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use hvac_types::{Device, SensorReading, Zone, ZoneHistory, ZonePrediction};
use reqwest::{Client, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Default timeout for every REST call.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for REST operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server is not reachable.
    #[error("API not reachable at {url}: {source}")]
    NotReachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// HTTP request or response decoding failed.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Invalid base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Server answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },
}

/// Result type for REST operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// REST operations used by the engine.
#[async_trait]
pub trait ZoneApi: Send + Sync + 'static {
    /// `GET /api/zones`
    async fn zones(&self) -> ApiResult<Vec<Zone>>;

    /// `GET /api/devices?zone_id=`
    async fn devices(&self, zone_id: &str) -> ApiResult<Vec<Device>>;

    /// `GET /api/sensors/zones/{id}/history?minutes=`
    async fn history(&self, zone_id: &str, minutes: u32) -> ApiResult<ZoneHistory>;

    /// `GET /api/sensors/zones/{id}/latest`
    async fn latest_reading(&self, zone_id: &str) -> ApiResult<SensorReading>;

    /// `GET /api/predictions/{id}`
    async fn prediction(&self, zone_id: &str) -> ApiResult<ZonePrediction>;

    /// `PUT /api/zones/{id}/setpoint`
    async fn set_setpoint(&self, zone_id: &str, setpoint: f64) -> ApiResult<Zone>;

    /// `PUT /api/zones/{id}/adaptive`
    async fn set_adaptive_mode(&self, zone_id: &str, enabled: bool) -> ApiResult<Zone>;
}

/// `reqwest`-backed [`ZoneApi`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    base: Url,
}

#[derive(Serialize)]
struct SetpointBody {
    setpoint: f64,
}

#[derive(Serialize)]
struct AdaptiveBody {
    adaptive_mode: bool,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `http://localhost:8000`) with the
    /// default timeout.
    pub fn new(base_url: &str) -> ApiResult<Self> {
        Self::with_timeout(base_url, DEFAULT_API_TIMEOUT)
    }

    /// Create a client with a custom per-request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url)?;
        let base = Url::parse(&base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::Request)?;

        Ok(Self {
            client,
            base_url,
            base,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `base` with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> ApiResult<T> {
        let response = self
            .client
            .get(url.clone())
            .query(query)
            .send()
            .await
            .map_err(|e| ApiError::NotReachable {
                url: url.to_string(),
                source: e,
            })?;

        handle_response(response).await
    }

    async fn put_json<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        url: Url,
        body: &B,
    ) -> ApiResult<T> {
        let response = self
            .client
            .put(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::NotReachable {
                url: url.to_string(),
                source: e,
            })?;

        handle_response(response).await
    }
}

#[async_trait]
impl ZoneApi for ApiClient {
    async fn zones(&self) -> ApiResult<Vec<Zone>> {
        let url = self.endpoint(&["api", "zones"])?;
        self.get(url, &[]).await
    }

    async fn devices(&self, zone_id: &str) -> ApiResult<Vec<Device>> {
        let url = self.endpoint(&["api", "devices"])?;
        self.get(url, &[("zone_id", zone_id.to_string())]).await
    }

    async fn history(&self, zone_id: &str, minutes: u32) -> ApiResult<ZoneHistory> {
        let url = self.endpoint(&["api", "sensors", "zones", zone_id, "history"])?;
        self.get(url, &[("minutes", minutes.to_string())]).await
    }

    async fn latest_reading(&self, zone_id: &str) -> ApiResult<SensorReading> {
        let url = self.endpoint(&["api", "sensors", "zones", zone_id, "latest"])?;
        self.get(url, &[]).await
    }

    async fn prediction(&self, zone_id: &str) -> ApiResult<ZonePrediction> {
        let url = self.endpoint(&["api", "predictions", zone_id])?;
        self.get(url, &[]).await
    }

    async fn set_setpoint(&self, zone_id: &str, setpoint: f64) -> ApiResult<Zone> {
        let url = self.endpoint(&["api", "zones", zone_id, "setpoint"])?;
        self.put_json(url, &SetpointBody { setpoint }).await
    }

    async fn set_adaptive_mode(&self, zone_id: &str, enabled: bool) -> ApiResult<Zone> {
        let url = self.endpoint(&["api", "zones", zone_id, "adaptive"])?;
        self.put_json(
            url,
            &AdaptiveBody {
                adaptive_mode: enabled,
            },
        )
        .await
    }
}

fn normalize_base_url(base_url: &str) -> ApiResult<String> {
    let base_url = base_url.trim_end_matches('/').to_string();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ApiError::InvalidUrl(format!(
            "URL must start with http:// or https://, got: {}",
            base_url
        )));
    }
    Ok(base_url)
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(ApiError::Request);
    }

    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| {
            ["detail", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|e| e.as_str()).map(String::from))
        })
        .unwrap_or_else(|| status.to_string());

    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn zone_json(id: &str, setpoint: f64) -> serde_json::Value {
        json!({
            "id": id,
            "name": "Server Room",
            "setpoint": setpoint,
            "adaptive_mode": true,
            "created_at": "2024-05-01T08:00:00",
            "updated_at": "2024-05-01T08:00:00"
        })
    }

    #[test]
    fn test_client_creation() {
        let client = ApiClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_invalid_url() {
        let result = ApiClient::new("localhost:8000");
        assert!(matches!(result, Err(ApiError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_zones() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([zone_json("server-room", 21.0)])))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let zones = client.zones().await.unwrap();

        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].id, "server-room");
        assert!(zones[0].adaptive_mode);
    }

    #[tokio::test]
    async fn test_history_query_and_partial_readings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sensors/zones/server-room/history"))
            .and(query_param("minutes", "30"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "zone_id": "server-room",
                "readings": [
                    {"timestamp": "2024-05-01T12:00:00", "temperature": 19.5, "humidity": 40.0},
                    {"timestamp": "2024-05-01T12:00:05", "temperature": 19.6, "co2_level": null}
                ]
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let history = client.history("server-room", 30).await.unwrap();

        assert_eq!(history.readings.len(), 2);
        assert_eq!(history.readings[1].temperature, Some(19.6));
        assert_eq!(history.readings[1].co2_level, None);
        assert_eq!(history.readings[1].humidity, None);
    }

    #[tokio::test]
    async fn test_latest_reading() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sensors/zones/server-room/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "timestamp": "2024-05-01T12:00:05",
                "temperature": 19.6,
                "occupancy": 0
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let reading = client.latest_reading("server-room").await.unwrap();

        assert_eq!(reading.temperature, Some(19.6));
        assert_eq!(reading.occupancy, Some(0));
        assert_eq!(reading.power_kw, None);
    }

    #[tokio::test]
    async fn test_zone_id_is_percent_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/zones/north%20wing%2F2/setpoint"))
            .respond_with(ResponseTemplate::new(200).set_body_json(zone_json("north wing/2", 22.0)))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let zone = client.set_setpoint("north wing/2", 22.0).await.unwrap();
        assert_eq!(zone.id, "north wing/2");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = ApiClient::new("http://hvac.local:8000/building-a/").unwrap();
        let url = client.endpoint(&["api", "predictions", "lobby"]).unwrap();
        assert_eq!(url.as_str(), "http://hvac.local:8000/building-a/api/predictions/lobby");
    }

    #[tokio::test]
    async fn test_devices_filtered_by_zone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/devices"))
            .and(query_param("zone_id", "open-office"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "fcu-2",
                "name": "FCU-2",
                "type": "fcu",
                "zone_id": "open-office",
                "status": "online",
                "discovered_at": "2024-05-01T08:00:00",
                "last_seen": null,
                "metadata_json": null
            }])))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let devices = client.devices("open-office").await.unwrap();

        assert_eq!(devices.len(), 1);
        assert!(devices[0].status.is_online());
    }

    #[tokio::test]
    async fn test_set_setpoint_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/zones/server-room/setpoint"))
            .and(body_json(json!({"setpoint": 22.5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(zone_json("server-room", 22.5)))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let zone = client.set_setpoint("server-room", 22.5).await.unwrap();
        assert_eq!(zone.setpoint, 22.5);
    }

    #[tokio::test]
    async fn test_set_adaptive_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/zones/server-room/adaptive"))
            .and(body_json(json!({"adaptive_mode": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(zone_json("server-room", 21.0)))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        assert!(client.set_adaptive_mode("server-room", false).await.is_ok());
    }

    #[tokio::test]
    async fn test_error_detail_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/predictions/lobby"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Zone not found"})))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let err = client.prediction("lobby").await.unwrap_err();

        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Zone not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_without_body_uses_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/zones"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let err = client.zones().await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_not_reachable() {
        let client = ApiClient::with_timeout("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client.zones().await.unwrap_err();
        assert!(matches!(err, ApiError::NotReachable { .. }));
    }
}
