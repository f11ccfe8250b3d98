//! Dashboard state and the reducer that mutates it.
//!
//! [`DashboardState::apply`] is the only way to change the state. The engine
//! task calls it once per [`EngineInput`], in arrival order, and publishes a
//! [`DashboardSnapshot`] afterwards.

use std::collections::HashMap;

use hvac_types::{
    ActivityCategory, ActivityEvent, Device, DeviceKind, DeviceStatus, SensorReading, Severity,
    Zone, ZonePrediction,
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::activity::ActivityLog;
use crate::events::Notification;
use crate::history::HistoryWindows;
use crate::ids::{EventIdGenerator, MonotonicIds};
use crate::messages::EngineInput;
use crate::reconnect::ConnectionState;
use crate::refresh::{RefreshStats, ZoneRefresh};
use crate::router::{DomainEvent, route};
use crate::store::{ArrivalClock, ZoneStateStore};

/// Everything the view needs for one zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneView {
    pub zone: Zone,
    pub devices: Vec<Device>,
    /// Latest live reading, or the newest refreshed sample.
    pub reading: Option<SensorReading>,
    pub prediction: Option<ZonePrediction>,
    /// Recent readings, oldest first.
    pub history: Vec<SensorReading>,
    pub refresh: RefreshStats,
}

impl ZoneView {
    /// The zone's fan coil unit, if one is assigned.
    pub fn fcu(&self) -> Option<&Device> {
        self.device_of_kind(DeviceKind::Fcu)
    }

    /// The zone's environmental sensor, if one is assigned.
    pub fn sensor(&self) -> Option<&Device> {
        self.device_of_kind(DeviceKind::Sensor)
    }

    fn device_of_kind(&self, kind: DeviceKind) -> Option<&Device> {
        self.devices.iter().find(|d| d.kind == kind)
    }
}

/// Read-only copy of the dashboard state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    /// Arrival revision this snapshot was taken at.
    pub revision: u64,
    pub connection: ConnectionState,
    /// Known zones in server order.
    pub zones: Vec<ZoneView>,
    /// Activity feed, newest first.
    pub activity: Vec<ActivityEvent>,
}

impl DashboardSnapshot {
    pub fn zone(&self, zone_id: &str) -> Option<&ZoneView> {
        self.zones.iter().find(|z| z.zone.id == zone_id)
    }
}

/// The engine's mutable state.
pub struct DashboardState {
    clock: ArrivalClock,
    ids: Box<dyn EventIdGenerator>,
    connection: ConnectionState,
    zones: Vec<Zone>,
    devices: HashMap<String, Vec<Device>>,
    store: ZoneStateStore,
    history: HistoryWindows,
    activity: ActivityLog,
    refresh_stats: HashMap<String, RefreshStats>,
}

impl std::fmt::Debug for DashboardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardState")
            .field("revision", &self.clock.current())
            .field("connection", &self.connection)
            .field("zones", &self.zones.len())
            .field("activity", &self.activity.len())
            .finish()
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new(ArrivalClock::new(), Box::new(MonotonicIds::new()))
    }
}

impl DashboardState {
    pub fn new(clock: ArrivalClock, ids: Box<dyn EventIdGenerator>) -> Self {
        Self {
            clock,
            ids,
            connection: ConnectionState::Disconnected,
            zones: Vec::new(),
            devices: HashMap::new(),
            store: ZoneStateStore::new(),
            history: HistoryWindows::new(),
            activity: ActivityLog::new(),
            refresh_stats: HashMap::new(),
        }
    }

    /// Clock shared with the refresh scheduler.
    pub fn clock(&self) -> &ArrivalClock {
        &self.clock
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn store(&self) -> &ZoneStateStore {
        &self.store
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    /// Apply one input using the current wall-clock time.
    pub fn apply(&mut self, input: EngineInput) -> Vec<Notification> {
        self.apply_at(input, OffsetDateTime::now_utc())
    }

    /// Apply one input. `now` stamps activity entries and readings that
    /// carry no timestamp of their own.
    pub fn apply_at(&mut self, input: EngineInput, now: OffsetDateTime) -> Vec<Notification> {
        let rev = self.clock.tick();
        let mut notifications = Vec::new();

        match input {
            EngineInput::Connected => {
                self.connection = ConnectionState::Connected;
                self.log(
                    ActivityCategory::Connection,
                    Severity::Success,
                    "Connected to server".to_string(),
                    now,
                );
            }
            EngineInput::Disconnected { reason } => {
                self.connection = ConnectionState::Disconnected;
                debug!(%reason, "Recording disconnect");
                self.log(
                    ActivityCategory::Connection,
                    Severity::Warning,
                    "Disconnected from server".to_string(),
                    now,
                );
            }
            EngineInput::Push(frame) => {
                if let Some(event) = route(&frame, now) {
                    self.apply_event(event, rev, now, &mut notifications);
                }
            }
            EngineInput::ZonesLoaded(zones) => self.apply_zones(zones),
            EngineInput::ZoneRefreshed(refresh) => self.apply_refresh(refresh, rev, now),
            EngineInput::RefreshFailed { zone_id, error } => {
                let stats = self.refresh_stats.entry(zone_id).or_default();
                stats.last_refresh_at = Some(now);
                stats.record_failure(error);
            }
            EngineInput::ZoneUpdated(zone) => {
                match self.zones.iter_mut().find(|z| z.id == zone.id) {
                    Some(existing) => *existing = zone,
                    None => self.zones.push(zone),
                }
            }
        }

        notifications
    }

    fn apply_event(
        &mut self,
        event: DomainEvent,
        rev: u64,
        now: OffsetDateTime,
        notifications: &mut Vec<Notification>,
    ) {
        if let Some((category, severity, message)) = event.activity() {
            self.log(category, severity, message, now);
        }
        notifications.extend(event.notification());

        match event {
            DomainEvent::Reading { zone_id, reading } => {
                self.history.push(&zone_id, reading.clone(), rev);
                self.store.set_reading(&zone_id, reading, rev);
            }
            DomainEvent::Prediction(prediction) => {
                self.store.set_prediction(prediction, rev);
            }
            DomainEvent::DeviceStatus { device_id, status } => {
                // Reflect the change in the cached device list until the next refresh
                let Ok(status) = status.parse::<DeviceStatus>() else {
                    return;
                };
                for device in self.devices.values_mut().flatten() {
                    if device.id == device_id {
                        device.status = status;
                        device.last_seen = Some(now);
                    }
                }
            }
            DomainEvent::DeviceDiscovered { .. } => {}
        }
    }

    fn apply_zones(&mut self, zones: Vec<Zone>) {
        let ids: Vec<&str> = zones.iter().map(|z| z.id.as_str()).collect();
        self.devices.retain(|id, _| ids.contains(&id.as_str()));
        self.refresh_stats.retain(|id, _| ids.contains(&id.as_str()));
        self.zones = zones;
    }

    fn apply_refresh(&mut self, refresh: ZoneRefresh, rev: u64, now: OffsetDateTime) {
        let ZoneRefresh {
            zone_id,
            issued_rev,
            devices,
            history,
            prediction,
            ..
        } = &refresh;

        if let Some(devices) = devices {
            self.devices.insert(zone_id.clone(), devices.clone());
        }

        if let Some(readings) = history {
            if let Some(latest) = readings.last() {
                self.store
                    .refresh_reading(zone_id, latest.clone(), *issued_rev, rev);
            }
            self.history.seed(zone_id, readings.clone(), *issued_rev);
        }

        if let Some(prediction) = prediction {
            let applied = self
                .store
                .refresh_prediction(prediction.clone(), *issued_rev, rev);
            if !applied {
                debug!(zone_id = %zone_id, "Refreshed prediction superseded by live update");
            }
        }

        self.refresh_stats
            .entry(zone_id.clone())
            .or_default()
            .record(&refresh, now);
    }

    fn log(
        &mut self,
        category: ActivityCategory,
        severity: Severity,
        message: String,
        now: OffsetDateTime,
    ) {
        self.activity.push(ActivityEvent {
            id: self.ids.next_id(),
            category,
            message,
            timestamp: now,
            severity,
        });
    }

    /// Build a read-only copy for the view layer.
    ///
    /// Only zones from the zone list are included; state held for other zone
    /// ids stays hidden until the zone appears.
    pub fn snapshot(&self) -> DashboardSnapshot {
        let zones = self
            .zones
            .iter()
            .map(|zone| {
                let entry = self.store.get(&zone.id);
                ZoneView {
                    zone: zone.clone(),
                    devices: self.devices.get(&zone.id).cloned().unwrap_or_default(),
                    reading: entry.and_then(|e| e.reading.clone()),
                    prediction: entry.and_then(|e| e.prediction.clone()),
                    history: self
                        .history
                        .get(&zone.id)
                        .map(|w| w.to_vec())
                        .unwrap_or_default(),
                    refresh: self.refresh_stats.get(&zone.id).cloned().unwrap_or_default(),
                }
            })
            .collect();

        DashboardSnapshot {
            revision: self.clock.current(),
            connection: self.connection,
            zones,
            activity: self.activity.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use hvac_types::Trend;
    use serde_json::json;
    use time::macros::datetime;

    use super::*;
    use crate::events::NotificationLevel;
    use crate::messages::DisconnectReason;
    use crate::router::PushFrame;

    const NOW: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

    fn zone(id: &str) -> Zone {
        Zone {
            id: id.to_string(),
            name: id.to_string(),
            setpoint: 21.0,
            adaptive_mode: true,
            created_at: NOW,
            updated_at: NOW,
        }
    }

    fn device(id: &str, kind: DeviceKind, zone: &str) -> Device {
        Device {
            id: id.to_string(),
            name: id.to_uppercase(),
            kind,
            zone_id: Some(zone.to_string()),
            status: DeviceStatus::Online,
            discovered_at: NOW,
            last_seen: None,
            metadata_json: None,
        }
    }

    fn push(value: serde_json::Value) -> EngineInput {
        let frame: PushFrame = serde_json::from_value(value).unwrap();
        EngineInput::Push(frame)
    }

    fn reading_frame(zone: &str, temperature: f64) -> EngineInput {
        push(json!({"type": "reading", "zone_id": zone, "data": {"temperature": temperature}}))
    }

    fn prediction(zone: &str, predicted: f64) -> ZonePrediction {
        ZonePrediction {
            zone_id: zone.to_string(),
            current_temp: 21.0,
            predicted_temp: predicted,
            confidence: 0.9,
            prediction_horizon_minutes: 15,
            trend: Trend::Rising,
            timestamp: NOW,
        }
    }

    fn refresh(zone: &str, issued_rev: u64) -> ZoneRefresh {
        ZoneRefresh {
            zone_id: zone.to_string(),
            issued_rev,
            devices: Some(vec![
                device("fcu-1", DeviceKind::Fcu, zone),
                device("sensor-1", DeviceKind::Sensor, zone),
            ]),
            history: Some(vec![
                SensorReading::at(NOW).with_temperature(20.0),
                SensorReading::at(NOW).with_temperature(20.5),
            ]),
            prediction: Some(prediction(zone, 19.0)),
            failures: vec![],
        }
    }

    fn state_with_zone(id: &str) -> DashboardState {
        let mut state = DashboardState::default();
        state.apply_at(EngineInput::ZonesLoaded(vec![zone(id)]), NOW);
        state
    }

    #[test]
    fn test_connection_activity() {
        let mut state = DashboardState::default();
        state.apply_at(EngineInput::Connected, NOW);
        state.apply_at(
            EngineInput::Disconnected {
                reason: DisconnectReason::RemoteClosed,
            },
            NOW,
        );

        let snapshot = state.snapshot();
        assert_eq!(snapshot.connection, ConnectionState::Disconnected);
        assert_eq!(snapshot.activity[0].message, "Disconnected from server");
        assert_eq!(snapshot.activity[0].severity, Severity::Warning);
        assert_eq!(snapshot.activity[1].message, "Connected to server");
        assert_eq!(snapshot.activity[1].severity, Severity::Success);
        assert_ne!(snapshot.activity[0].id, snapshot.activity[1].id);
    }

    #[test]
    fn test_reading_end_to_end() {
        let mut state = state_with_zone("z1");
        let notifications = state.apply_at(reading_frame("z1", 22.5), NOW);

        assert!(notifications.is_empty());
        let snapshot = state.snapshot();
        let view = snapshot.zone("z1").unwrap();
        let reading = view.reading.as_ref().unwrap();
        assert_eq!(reading.temperature, Some(22.5));
        assert_eq!(reading.humidity, None);
        assert_eq!(reading.co2_level, None);
        assert_eq!(reading.power_kw, None);
        assert_eq!(reading.occupancy, None);
        assert_eq!(view.history.len(), 1);
        assert!(snapshot.activity.is_empty());
    }

    #[test]
    fn test_device_status_offline_scenario() {
        let mut state = DashboardState::default();
        let notifications = state.apply_at(
            push(json!({"type": "device_status", "device_id": "fcu-1", "status": "offline"})),
            NOW,
        );

        let snapshot = state.snapshot();
        assert_eq!(snapshot.activity.len(), 1);
        assert_eq!(snapshot.activity[0].message, "fcu-1 went offline");
        assert_eq!(snapshot.activity[0].severity, Severity::Warning);
        assert_eq!(snapshot.activity[0].category, ActivityCategory::DeviceStatus);

        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].level, NotificationLevel::Destructive);
        assert_eq!(notifications[0].title, "Device Status Change");
    }

    #[test]
    fn test_device_status_updates_cached_device() {
        let mut state = state_with_zone("z1");
        state.apply_at(EngineInput::ZoneRefreshed(refresh("z1", 1)), NOW);
        state.apply_at(
            push(json!({"type": "device_status", "device_id": "fcu-1", "status": "offline"})),
            NOW,
        );

        let snapshot = state.snapshot();
        let fcu = snapshot.zone("z1").unwrap().fcu().unwrap();
        assert_eq!(fcu.status, DeviceStatus::Offline);
        assert_eq!(fcu.last_seen, Some(NOW));
    }

    #[test]
    fn test_device_discovered_notification() {
        let mut state = DashboardState::default();
        let notifications = state.apply_at(
            push(json!({"type": "device_discovered", "device": {"name": "FCU-3", "zone_id": "lobby"}})),
            NOW,
        );

        assert_eq!(notifications[0].description, "FCU-3 has been detected");
        assert_eq!(
            state.snapshot().activity[0].message,
            "New device detected: FCU-3 in lobby"
        );
    }

    #[test]
    fn test_keepalive_produces_nothing() {
        let mut state = state_with_zone("z1");
        let before = state.snapshot();
        let notifications = state.apply_at(push(json!({"type": "keepalive"})), NOW);
        let after = state.snapshot();

        assert!(notifications.is_empty());
        assert_eq!(before.activity, after.activity);
        assert_eq!(before.zones, after.zones);
    }

    #[test]
    fn test_refresh_fills_empty_zone() {
        let mut state = state_with_zone("z1");
        state.apply_at(EngineInput::ZoneRefreshed(refresh("z1", 1)), NOW);

        let snapshot = state.snapshot();
        let view = snapshot.zone("z1").unwrap();
        assert_eq!(view.reading.as_ref().unwrap().temperature, Some(20.5));
        assert_eq!(view.prediction.as_ref().unwrap().predicted_temp, 19.0);
        assert_eq!(view.history.len(), 2);
        assert_eq!(view.fcu().unwrap().id, "fcu-1");
        assert_eq!(view.sensor().unwrap().id, "sensor-1");
        assert_eq!(view.refresh.success_count, 1);
    }

    #[test]
    fn test_stale_refresh_does_not_clobber_live_reading() {
        let mut state = state_with_zone("z1");
        let issued = state.clock().current();

        // Live updates land while the refresh is in flight
        state.apply_at(reading_frame("z1", 23.0), NOW);
        state.apply_at(
            EngineInput::Push(
                serde_json::from_value(json!({
                    "type": "prediction", "zone_id": "z1", "current_temp": 23.0,
                    "predicted_temp": 24.0, "confidence": 0.7, "trend": "rising"
                }))
                .unwrap(),
            ),
            NOW,
        );
        state.apply_at(EngineInput::ZoneRefreshed(refresh("z1", issued)), NOW);

        let snapshot = state.snapshot();
        let view = snapshot.zone("z1").unwrap();
        assert_eq!(view.reading.as_ref().unwrap().temperature, Some(23.0));
        assert_eq!(view.prediction.as_ref().unwrap().predicted_temp, 24.0);

        // Seed first, then the live sample that arrived after the issue
        let temps: Vec<_> = view.history.iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![Some(20.0), Some(20.5), Some(23.0)]);
    }

    #[test]
    fn test_refresh_issued_after_live_reading_wins() {
        let mut state = state_with_zone("z1");
        state.apply_at(reading_frame("z1", 23.0), NOW);
        let issued = state.clock().current();
        state.apply_at(EngineInput::ZoneRefreshed(refresh("z1", issued)), NOW);

        let snapshot = state.snapshot();
        assert_eq!(
            snapshot.zone("z1").unwrap().reading.as_ref().unwrap().temperature,
            Some(20.5)
        );
    }

    #[test]
    fn test_partial_refresh_keeps_other_parts() {
        let mut state = state_with_zone("z1");
        state.apply_at(EngineInput::ZoneRefreshed(refresh("z1", 1)), NOW);

        let issued = state.clock().current();
        let partial = ZoneRefresh {
            devices: None,
            prediction: None,
            failures: vec!["devices: timeout".to_string(), "prediction: timeout".to_string()],
            ..refresh("z1", issued)
        };
        state.apply_at(EngineInput::ZoneRefreshed(partial), NOW);

        let snapshot = state.snapshot();
        let view = snapshot.zone("z1").unwrap();
        assert_eq!(view.devices.len(), 2);
        assert_eq!(view.prediction.as_ref().unwrap().predicted_temp, 19.0);
        assert_eq!(view.refresh.failure_count, 1);
        assert_eq!(view.refresh.success_count, 1);
    }

    #[test]
    fn test_refresh_failed_keeps_state() {
        let mut state = state_with_zone("z1");
        state.apply_at(EngineInput::ZoneRefreshed(refresh("z1", 1)), NOW);
        state.apply_at(
            EngineInput::RefreshFailed {
                zone_id: "z1".to_string(),
                error: "history: API not reachable".to_string(),
            },
            NOW,
        );

        let snapshot = state.snapshot();
        let view = snapshot.zone("z1").unwrap();
        assert_eq!(view.history.len(), 2);
        assert_eq!(view.refresh.consecutive_failures, 1);
        assert!(view.refresh.last_error.as_deref().unwrap().contains("reachable"));
    }

    #[test]
    fn test_unknown_zone_hidden_until_listed() {
        let mut state = DashboardState::default();
        state.apply_at(reading_frame("lab", 19.0), NOW);
        assert!(state.snapshot().zone("lab").is_none());
        assert!(state.store().reading("lab").is_some());

        state.apply_at(EngineInput::ZonesLoaded(vec![zone("lab")]), NOW);
        let snapshot = state.snapshot();
        assert_eq!(
            snapshot.zone("lab").unwrap().reading.as_ref().unwrap().temperature,
            Some(19.0)
        );
    }

    #[test]
    fn test_zone_updated_replaces_zone() {
        let mut state = state_with_zone("z1");
        let mut updated = zone("z1");
        updated.setpoint = 23.5;
        state.apply_at(EngineInput::ZoneUpdated(updated), NOW);

        assert_eq!(state.zones().len(), 1);
        assert_eq!(state.snapshot().zone("z1").unwrap().zone.setpoint, 23.5);
    }

    #[test]
    fn test_snapshot_preserves_zone_order() {
        let mut state = DashboardState::default();
        state.apply_at(
            EngineInput::ZonesLoaded(vec![zone("server-room"), zone("open-office"), zone("lobby")]),
            NOW,
        );
        let ids: Vec<_> = state.snapshot().zones.into_iter().map(|z| z.zone.id).collect();
        assert_eq!(ids, ["server-room", "open-office", "lobby"]);
    }

    #[test]
    fn test_revision_advances_per_input() {
        let mut state = DashboardState::default();
        state.apply_at(EngineInput::Connected, NOW);
        state.apply_at(push(json!({"type": "keepalive"})), NOW);
        assert_eq!(state.snapshot().revision, 2);
    }
}
