//! Push frame parsing and classification.
//!
//! Frames on `/ws/sensors` are JSON objects discriminated by `type`. The
//! router turns one frame into at most one [`DomainEvent`]. Frames that are
//! missing a required field or carry an unknown `type` produce nothing;
//! optional fields that are missing become `None`, never zero.
//!
//! ```
//! use hvac_core::router::{DomainEvent, PushFrame, route};
//!
//! let frame = PushFrame::parse(r#"{"type":"reading","zone_id":"z1","data":{"temperature":22.5}}"#).unwrap();
//! let Some(DomainEvent::Reading { zone_id, reading }) = route(&frame, time::OffsetDateTime::now_utc()) else {
//!     panic!("expected a reading");
//! };
//! assert_eq!(zone_id, "z1");
//! assert_eq!(reading.temperature, Some(22.5));
//! assert_eq!(reading.co2_level, None);
//! ```

use std::str::FromStr;

use hvac_types::{
    ActivityCategory, DEFAULT_PREDICTION_HORIZON_MINUTES, SensorReading, Severity, Trend,
    ZonePrediction, timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::debug;

use crate::events::{Notification, NotificationLevel};

/// Declared kind of a push frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    Reading,
    Prediction,
    DeviceDiscovered,
    DeviceStatus,
    /// Protocol keepalive, consumed by the connection manager.
    Keepalive,
    Unknown(String),
}

impl FromStr for FrameKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "reading" => FrameKind::Reading,
            "prediction" => FrameKind::Prediction,
            "device_discovered" => FrameKind::DeviceDiscovered,
            "device_status" => FrameKind::DeviceStatus,
            "keepalive" => FrameKind::Keepalive,
            other => FrameKind::Unknown(other.to_string()),
        })
    }
}

/// A raw push frame as received on the channel.
///
/// Only `type` is mandatory at this level. Which of the other fields are
/// required depends on the kind and is decided by [`route`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Reading payload: `temperature`, `humidity`, `co2_level`, `power_kw`, `occupancy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Device descriptor of a discovery frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_temp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_temp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_horizon_minutes: Option<u32>,
    /// ISO-8601 event time; processing time is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl PushFrame {
    /// Parse a text frame. Returns `None` for anything that is not a JSON
    /// object with a string `type`.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!(error = %e, "Discarding malformed push frame");
                None
            }
        }
    }

    pub fn frame_kind(&self) -> FrameKind {
        match self.kind.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }

    pub fn is_keepalive(&self) -> bool {
        self.frame_kind() == FrameKind::Keepalive
    }

    /// Event time, falling back to `now` when absent or unparseable.
    pub fn event_time(&self, now: OffsetDateTime) -> OffsetDateTime {
        match self.timestamp.as_deref().map(timestamp::parse) {
            Some(Ok(ts)) => ts,
            Some(Err(e)) => {
                debug!(error = %e, "Push frame timestamp unreadable, using processing time");
                now
            }
            None => now,
        }
    }
}

/// A normalized push event.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// New telemetry sample for a zone.
    Reading {
        zone_id: String,
        reading: SensorReading,
    },
    /// New prediction for a zone.
    Prediction(ZonePrediction),
    /// A device appeared on the network.
    DeviceDiscovered { name: String, zone_id: String },
    /// A device changed status.
    DeviceStatus { device_id: String, status: String },
}

impl DomainEvent {
    /// Activity feed line for this event, if it produces one.
    pub fn activity(&self) -> Option<(ActivityCategory, Severity, String)> {
        match self {
            DomainEvent::Reading { .. } | DomainEvent::Prediction(_) => None,
            DomainEvent::DeviceDiscovered { name, zone_id } => Some((
                ActivityCategory::DeviceDiscovered,
                Severity::Success,
                format!("New device detected: {name} in {zone_id}"),
            )),
            DomainEvent::DeviceStatus { device_id, status } => {
                if is_online(status) {
                    Some((
                        ActivityCategory::DeviceStatus,
                        Severity::Success,
                        format!("{device_id} is now online"),
                    ))
                } else {
                    Some((
                        ActivityCategory::DeviceStatus,
                        Severity::Warning,
                        format!("{device_id} went {status}"),
                    ))
                }
            }
        }
    }

    /// Toast for this event. Routine online transitions stay quiet.
    pub fn notification(&self) -> Option<Notification> {
        match self {
            DomainEvent::Reading { .. } | DomainEvent::Prediction(_) => None,
            DomainEvent::DeviceDiscovered { name, .. } => Some(Notification::new(
                "Device Discovered",
                format!("{name} has been detected"),
            )),
            DomainEvent::DeviceStatus { device_id, status } if !is_online(status) => {
                let level = if status == "offline" {
                    NotificationLevel::Destructive
                } else {
                    NotificationLevel::Default
                };
                Some(
                    Notification::new("Device Status Change", format!("{device_id} went {status}"))
                        .with_level(level),
                )
            }
            DomainEvent::DeviceStatus { .. } => None,
        }
    }
}

fn is_online(status: &str) -> bool {
    status == "online"
}

/// Classify a frame into a domain event.
///
/// `now` is the processing time, used for frames without a timestamp.
pub fn route(frame: &PushFrame, now: OffsetDateTime) -> Option<DomainEvent> {
    match frame.frame_kind() {
        FrameKind::Reading => route_reading(frame, now),
        FrameKind::Prediction => route_prediction(frame, now),
        FrameKind::DeviceDiscovered => Some(route_discovery(frame)),
        FrameKind::DeviceStatus => route_status(frame),
        FrameKind::Keepalive => None,
        FrameKind::Unknown(kind) => {
            debug!(kind = %kind, "Ignoring push frame of unknown type");
            None
        }
    }
}

fn route_reading(frame: &PushFrame, now: OffsetDateTime) -> Option<DomainEvent> {
    let (Some(zone_id), Some(data)) = (frame.zone_id.as_ref(), frame.data.as_ref()) else {
        debug!("Reading frame without zone_id or data");
        return None;
    };
    if !data.is_object() {
        debug!(zone_id = %zone_id, "Reading frame data is not an object");
        return None;
    }

    let reading = SensorReading {
        timestamp: frame.event_time(now),
        temperature: number(data, "temperature"),
        humidity: number(data, "humidity"),
        co2_level: number(data, "co2_level"),
        power_kw: number(data, "power_kw"),
        occupancy: count(data, "occupancy"),
    };

    Some(DomainEvent::Reading {
        zone_id: zone_id.clone(),
        reading,
    })
}

fn route_prediction(frame: &PushFrame, now: OffsetDateTime) -> Option<DomainEvent> {
    let Some(zone_id) = frame.zone_id.as_ref() else {
        debug!("Prediction frame without zone_id");
        return None;
    };
    let (Some(current_temp), Some(predicted_temp), Some(confidence)) =
        (frame.current_temp, frame.predicted_temp, frame.confidence)
    else {
        debug!(zone_id = %zone_id, "Prediction frame missing temperatures or confidence");
        return None;
    };

    let trend = frame
        .trend
        .as_deref()
        .and_then(|t| t.parse::<Trend>().ok())
        .unwrap_or_default();

    Some(DomainEvent::Prediction(ZonePrediction {
        zone_id: zone_id.clone(),
        current_temp,
        predicted_temp,
        confidence,
        prediction_horizon_minutes: frame
            .prediction_horizon_minutes
            .unwrap_or(DEFAULT_PREDICTION_HORIZON_MINUTES),
        trend,
        timestamp: frame.event_time(now),
    }))
}

fn route_discovery(frame: &PushFrame) -> DomainEvent {
    let field = |key: &str| {
        frame
            .device
            .as_ref()
            .and_then(|d| d.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    DomainEvent::DeviceDiscovered {
        name: field("name").unwrap_or_else(|| "Unknown Device".to_string()),
        zone_id: field("zone_id").unwrap_or_else(|| "unknown".to_string()),
    }
}

fn route_status(frame: &PushFrame) -> Option<DomainEvent> {
    let (Some(device_id), Some(status)) = (frame.device_id.as_ref(), frame.status.as_ref()) else {
        debug!("Device status frame without device_id or status");
        return None;
    };

    Some(DomainEvent::DeviceStatus {
        device_id: device_id.clone(),
        status: status.trim().to_ascii_lowercase(),
    })
}

fn number(data: &Value, key: &str) -> Option<f64> {
    data.get(key).and_then(Value::as_f64).filter(|v| v.is_finite())
}

fn count(data: &Value, key: &str) -> Option<u32> {
    let value = data.get(key)?;
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    value
        .as_f64()
        .filter(|v| v.is_finite() && *v >= 0.0 && *v <= f64::from(u32::MAX))
        .map(|v| v.round() as u32)
}
