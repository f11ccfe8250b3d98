//! In-memory transport and REST API for testing.
//!
//! [`MockTransport`] plays the server side of the push channel: tests inject
//! frames, closes and errors and can count how many channels were opened.
//! [`MockApi`] serves zones, devices, history and predictions from memory with
//! per-zone failure injection and optional latency.
//!
//! # Example
//!
//! ```
//! use hvac_core::mock::MockTransport;
//! use hvac_core::transport::PushTransport;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let transport = MockTransport::new();
//! let mut channel = transport.open("ws://test/ws/sensors").await.unwrap();
//!
//! transport.push_text(r#"{"type":"keepalive"}"#).await;
//! assert_eq!(channel.recv().await.unwrap().unwrap(), r#"{"type":"keepalive"}"#);
//! assert_eq!(transport.open_count(), 1);
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hvac_types::{Device, SensorReading, Zone, ZoneHistory, ZonePrediction};
use time::OffsetDateTime;
use tokio::sync::{RwLock, mpsc};

use crate::api::{ApiError, ApiResult, ZoneApi};
use crate::transport::{PushChannel, PushTransport, TransportError};

enum ServerEvent {
    Frame(String),
    Close,
    Error(String),
}

#[derive(Default)]
struct TransportInner {
    opens: AtomicU32,
    remaining_failures: AtomicU32,
    active: AtomicUsize,
    max_active: AtomicUsize,
    server: RwLock<Option<mpsc::UnboundedSender<ServerEvent>>>,
    sent: RwLock<Vec<String>>,
}

/// Server side of an in-memory push channel.
///
/// Clones share state, so one clone can be handed to the engine while the
/// test keeps another.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<TransportInner>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("opens", &self.open_count())
            .field("active", &self.inner.active.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `open` calls so far, failed ones included.
    pub fn open_count(&self) -> u32 {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// Highest number of channels that were open at the same time.
    pub fn max_concurrent_channels(&self) -> usize {
        self.inner.max_active.load(Ordering::SeqCst)
    }

    /// Make the next `n` opens fail.
    pub fn fail_next_opens(&self, n: u32) {
        self.inner.remaining_failures.store(n, Ordering::SeqCst);
    }

    /// Whether a channel is currently open.
    pub async fn is_open(&self) -> bool {
        self.inner.server.read().await.is_some()
    }

    /// Deliver a text frame on the open channel. Returns `false` if no
    /// channel is open.
    pub async fn push_text(&self, text: &str) -> bool {
        self.deliver(ServerEvent::Frame(text.to_string())).await
    }

    /// Deliver a JSON frame on the open channel.
    pub async fn push_json(&self, value: &serde_json::Value) -> bool {
        self.push_text(&value.to_string()).await
    }

    /// Close the open channel from the server side.
    pub async fn close_remote(&self) {
        self.deliver(ServerEvent::Close).await;
        self.inner.server.write().await.take();
    }

    /// Fail the open channel with a transport error.
    pub async fn fail_remote(&self, message: &str) {
        self.deliver(ServerEvent::Error(message.to_string())).await;
        self.inner.server.write().await.take();
    }

    /// Frames the client sent, oldest first.
    pub async fn sent_frames(&self) -> Vec<String> {
        self.inner.sent.read().await.clone()
    }

    async fn deliver(&self, event: ServerEvent) -> bool {
        match self.inner.server.read().await.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn open(&self, _url: &str) -> Result<Box<dyn PushChannel>, TransportError> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);

        let failed = self
            .inner
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(TransportError::Other("mock open failure".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.server.write().await = Some(tx);

        let active = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_active.fetch_max(active, Ordering::SeqCst);

        Ok(Box::new(MockChannel {
            inbound: rx,
            inner: Arc::clone(&self.inner),
            closed: false,
        }))
    }
}

struct MockChannel {
    inbound: mpsc::UnboundedReceiver<ServerEvent>,
    inner: Arc<TransportInner>,
    closed: bool,
}

impl MockChannel {
    fn mark_closed(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl PushChannel for MockChannel {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        if self.closed {
            return None;
        }
        match self.inbound.recv().await {
            Some(ServerEvent::Frame(text)) => Some(Ok(text)),
            Some(ServerEvent::Error(e)) => Some(Err(TransportError::Other(e))),
            Some(ServerEvent::Close) | None => None,
        }
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.inner.sent.write().await.push(text);
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.mark_closed();
        self.inbound.close();
        self.inner.server.write().await.take();
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        self.mark_closed();
    }
}

/// In-memory [`ZoneApi`].
#[derive(Default)]
pub struct MockApi {
    zones: RwLock<Vec<Zone>>,
    devices: RwLock<HashMap<String, Vec<Device>>>,
    history: RwLock<HashMap<String, Vec<SensorReading>>>,
    predictions: RwLock<HashMap<String, ZonePrediction>>,
    failing_zones: RwLock<HashSet<String>>,
    zones_failing: AtomicBool,
    /// Simulated latency of per-zone calls in milliseconds (0 = none).
    latency_ms: AtomicU64,
    zone_list_calls: AtomicU32,
    history_calls: AtomicU32,
}

impl std::fmt::Debug for MockApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockApi")
            .field("zone_list_calls", &self.zone_list_calls())
            .field("history_calls", &self.history_calls())
            .finish()
    }
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zone with the given id and setpoint.
    pub fn zone(id: &str, setpoint: f64) -> Zone {
        Zone {
            id: id.to_string(),
            name: id.replace('-', " "),
            setpoint,
            adaptive_mode: true,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    pub async fn set_zones(&self, zones: Vec<Zone>) {
        *self.zones.write().await = zones;
    }

    pub async fn set_devices(&self, zone_id: &str, devices: Vec<Device>) {
        self.devices
            .write()
            .await
            .insert(zone_id.to_string(), devices);
    }

    pub async fn set_history(&self, zone_id: &str, readings: Vec<SensorReading>) {
        self.history
            .write()
            .await
            .insert(zone_id.to_string(), readings);
    }

    pub async fn set_prediction(&self, prediction: ZonePrediction) {
        self.predictions
            .write()
            .await
            .insert(prediction.zone_id.clone(), prediction);
    }

    /// Make every per-zone call for `zone_id` fail (or succeed again).
    pub async fn set_zone_failing(&self, zone_id: &str, failing: bool) {
        let mut failing_zones = self.failing_zones.write().await;
        if failing {
            failing_zones.insert(zone_id.to_string());
        } else {
            failing_zones.remove(zone_id);
        }
    }

    /// Make the zone list call fail.
    pub fn set_zone_list_failing(&self, failing: bool) {
        self.zones_failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every per-zone call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn zone_list_calls(&self) -> u32 {
        self.zone_list_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> u32 {
        self.history_calls.load(Ordering::SeqCst)
    }

    async fn zone_call(&self, zone_id: &str) -> ApiResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.failing_zones.read().await.contains(zone_id) {
            return Err(server_error("mock zone failure"));
        }
        Ok(())
    }
}

fn server_error(message: &str) -> ApiError {
    ApiError::Status {
        status: 500,
        message: message.to_string(),
    }
}

fn not_found(what: &str, zone_id: &str) -> ApiError {
    ApiError::Status {
        status: 404,
        message: format!("No {what} for zone {zone_id}"),
    }
}

#[async_trait]
impl ZoneApi for MockApi {
    async fn zones(&self) -> ApiResult<Vec<Zone>> {
        self.zone_list_calls.fetch_add(1, Ordering::SeqCst);
        if self.zones_failing.load(Ordering::SeqCst) {
            return Err(server_error("mock zone list failure"));
        }
        Ok(self.zones.read().await.clone())
    }

    async fn devices(&self, zone_id: &str) -> ApiResult<Vec<Device>> {
        self.zone_call(zone_id).await?;
        Ok(self
            .devices
            .read()
            .await
            .get(zone_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn history(&self, zone_id: &str, _minutes: u32) -> ApiResult<ZoneHistory> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.zone_call(zone_id).await?;
        Ok(ZoneHistory {
            zone_id: zone_id.to_string(),
            readings: self
                .history
                .read()
                .await
                .get(zone_id)
                .cloned()
                .unwrap_or_default(),
        })
    }

    async fn latest_reading(&self, zone_id: &str) -> ApiResult<SensorReading> {
        self.zone_call(zone_id).await?;
        self.history
            .read()
            .await
            .get(zone_id)
            .and_then(|readings| readings.last().cloned())
            .ok_or_else(|| not_found("readings", zone_id))
    }

    async fn prediction(&self, zone_id: &str) -> ApiResult<ZonePrediction> {
        self.zone_call(zone_id).await?;
        self.predictions
            .read()
            .await
            .get(zone_id)
            .cloned()
            .ok_or_else(|| not_found("prediction", zone_id))
    }

    async fn set_setpoint(&self, zone_id: &str, setpoint: f64) -> ApiResult<Zone> {
        self.update_zone(zone_id, |zone| zone.setpoint = setpoint)
            .await
    }

    async fn set_adaptive_mode(&self, zone_id: &str, enabled: bool) -> ApiResult<Zone> {
        self.update_zone(zone_id, |zone| zone.adaptive_mode = enabled)
            .await
    }
}

impl MockApi {
    async fn update_zone(&self, zone_id: &str, update: impl FnOnce(&mut Zone)) -> ApiResult<Zone> {
        self.zone_call(zone_id).await?;
        let mut zones = self.zones.write().await;
        let zone = zones
            .iter_mut()
            .find(|z| z.id == zone_id)
            .ok_or_else(|| not_found("zone", zone_id))?;
        update(zone);
        zone.updated_at = OffsetDateTime::now_utc();
        Ok(zone.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_roundtrip() {
        let transport = MockTransport::new();
        assert!(!transport.push_text("dropped").await);

        let mut channel = transport.open("ws://test").await.unwrap();
        assert!(transport.is_open().await);
        assert!(transport.push_text("hello").await);
        assert_eq!(channel.recv().await.unwrap().unwrap(), "hello");

        channel.send("out".to_string()).await.unwrap();
        assert_eq!(transport.sent_frames().await, vec!["out".to_string()]);

        transport.close_remote().await;
        assert!(channel.recv().await.is_none());
        assert!(!transport.is_open().await);
    }

    #[tokio::test]
    async fn test_mock_transport_failures() {
        let transport = MockTransport::new();
        transport.fail_next_opens(1);

        assert!(transport.open("ws://test").await.is_err());
        let mut channel = transport.open("ws://test").await.unwrap();
        assert_eq!(transport.open_count(), 2);

        transport.fail_remote("reset").await;
        assert!(matches!(channel.recv().await, Some(Err(TransportError::Other(_)))));
    }

    #[tokio::test]
    async fn test_mock_transport_tracks_concurrency() {
        let transport = MockTransport::new();
        let mut first = transport.open("ws://test").await.unwrap();
        first.close().await;
        let _second = transport.open("ws://test").await.unwrap();
        assert_eq!(transport.max_concurrent_channels(), 1);
    }

    #[tokio::test]
    async fn test_mock_api_zone_failure() {
        let api = MockApi::new();
        api.set_zones(vec![MockApi::zone("server-room", 21.0)]).await;
        api.set_zone_failing("server-room", true).await;

        assert!(api.devices("server-room").await.is_err());
        assert!(api.zones().await.is_ok());

        api.set_zone_failing("server-room", false).await;
        assert!(api.devices("server-room").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mock_api_setpoint_updates_zone() {
        let api = MockApi::new();
        api.set_zones(vec![MockApi::zone("server-room", 21.0)]).await;

        let zone = api.set_setpoint("server-room", 22.5).await.unwrap();
        assert_eq!(zone.setpoint, 22.5);
        assert_eq!(api.zones().await.unwrap()[0].setpoint, 22.5);
        assert!(api.set_setpoint("lobby", 22.0).await.is_err());
    }
}
