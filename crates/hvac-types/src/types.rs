//! Core types for zone telemetry, predictions and device state.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;
use crate::timestamp;

/// Prediction horizon used when the server does not state one.
pub const DEFAULT_PREDICTION_HORIZON_MINUTES: u32 = 15;

/// A climate-controlled area with its own setpoint and control mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Zone identifier (e.g. `server-room`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Target temperature in °C.
    pub setpoint: f64,
    /// Whether the FCU follows the adaptive (predictive) controller.
    pub adaptive_mode: bool,
    #[serde(with = "timestamp")]
    pub created_at: OffsetDateTime,
    #[serde(with = "timestamp")]
    pub updated_at: OffsetDateTime,
}

/// Kind of field device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Fan coil unit (actuator).
    Fcu,
    /// Environmental sensor.
    Sensor,
}

impl DeviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Fcu => "fcu",
            DeviceKind::Sensor => "sensor",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fcu" => Ok(DeviceKind::Fcu),
            "sensor" => Ok(DeviceKind::Sensor),
            _ => Err(ParseError::UnknownVariant {
                kind: "device kind",
                value: s.to_string(),
            }),
        }
    }
}

/// Reported device status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    #[default]
    Offline,
    Syncing,
}

impl DeviceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Syncing => "syncing",
        }
    }

    #[must_use]
    pub fn is_online(self) -> bool {
        self == DeviceStatus::Online
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(DeviceStatus::Online),
            "offline" => Ok(DeviceStatus::Offline),
            "syncing" => Ok(DeviceStatus::Syncing),
            _ => Err(ParseError::UnknownVariant {
                kind: "device status",
                value: s.to_string(),
            }),
        }
    }
}

/// A field device (FCU or sensor) known to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    /// Owning zone, if the device has been assigned to one.
    #[serde(default)]
    pub zone_id: Option<String>,
    #[serde(default)]
    pub status: DeviceStatus,
    #[serde(with = "timestamp")]
    pub discovered_at: OffsetDateTime,
    #[serde(default, with = "timestamp::option")]
    pub last_seen: Option<OffsetDateTime>,
    /// Opaque vendor metadata.
    #[serde(default)]
    pub metadata_json: Option<serde_json::Value>,
}

/// One telemetry sample for a zone.
///
/// Every measurement is independently optional: `None` means the quantity
/// does not apply to this zone (a server room has no CO₂ sensor), which is
/// different from a measured zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(with = "timestamp")]
    pub timestamp: OffsetDateTime,
    /// Temperature in °C.
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Relative humidity in %.
    #[serde(default)]
    pub humidity: Option<f64>,
    /// CO₂ concentration in ppm.
    #[serde(default)]
    pub co2_level: Option<f64>,
    /// FCU power draw in kW.
    #[serde(default)]
    pub power_kw: Option<f64>,
    /// Number of people present.
    #[serde(default)]
    pub occupancy: Option<u32>,
}

impl SensorReading {
    /// A sample with no measurements.
    pub fn at(timestamp: OffsetDateTime) -> Self {
        Self {
            timestamp,
            temperature: None,
            humidity: None,
            co2_level: None,
            power_kw: None,
            occupancy: None,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature = Some(celsius);
        self
    }

    #[must_use]
    pub fn with_humidity(mut self, percent: f64) -> Self {
        self.humidity = Some(percent);
        self
    }

    #[must_use]
    pub fn with_co2_level(mut self, ppm: f64) -> Self {
        self.co2_level = Some(ppm);
        self
    }

    #[must_use]
    pub fn with_power_kw(mut self, kw: f64) -> Self {
        self.power_kw = Some(kw);
        self
    }

    #[must_use]
    pub fn with_occupancy(mut self, people: u32) -> Self {
        self.occupancy = Some(people);
        self
    }

    /// True when the sample carries no measurement at all.
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.humidity.is_none()
            && self.co2_level.is_none()
            && self.power_kw.is_none()
            && self.occupancy.is_none()
    }
}

/// Response body of the zone history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneHistory {
    pub zone_id: String,
    #[serde(default)]
    pub readings: Vec<SensorReading>,
}

/// Direction of the predicted temperature change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    #[default]
    Stable,
}

impl Trend {
    pub fn as_str(self) -> &'static str {
        match self {
            Trend::Rising => "rising",
            Trend::Falling => "falling",
            Trend::Stable => "stable",
        }
    }

    /// Arrow glyph used in compact renderings.
    pub fn arrow(self) -> &'static str {
        match self {
            Trend::Rising => "↑",
            Trend::Falling => "↓",
            Trend::Stable => "→",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trend {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rising" => Ok(Trend::Rising),
            "falling" => Ok(Trend::Falling),
            "stable" => Ok(Trend::Stable),
            _ => Err(ParseError::UnknownVariant {
                kind: "trend",
                value: s.to_string(),
            }),
        }
    }
}

/// Model output for one zone. A newer prediction replaces the old one whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonePrediction {
    pub zone_id: String,
    pub current_temp: f64,
    pub predicted_temp: f64,
    /// Model confidence in `0.0..=1.0`.
    pub confidence: f64,
    #[serde(default = "default_horizon")]
    pub prediction_horizon_minutes: u32,
    #[serde(default, deserialize_with = "lenient_trend")]
    pub trend: Trend,
    #[serde(with = "timestamp")]
    pub timestamp: OffsetDateTime,
}

fn default_horizon() -> u32 {
    DEFAULT_PREDICTION_HORIZON_MINUTES
}

/// Unknown or null trends decode as [`Trend::default`].
fn lenient_trend<'de, D>(deserializer: D) -> Result<Trend, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|t| t.parse().ok()).unwrap_or_default())
}

impl ZonePrediction {
    /// Predicted change over the horizon, in °C.
    pub fn delta(&self) -> f64 {
        self.predicted_temp - self.current_temp
    }
}

/// Severity of an activity feed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Success,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Success => "success",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What produced an activity feed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
    /// Push channel connected or dropped.
    Connection,
    /// A new device appeared on the network.
    DeviceDiscovered,
    /// A device changed status.
    DeviceStatus,
}

impl ActivityCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityCategory::Connection => "connection",
            ActivityCategory::DeviceDiscovered => "device_discovered",
            ActivityCategory::DeviceStatus => "device_status",
        }
    }
}

impl fmt::Display for ActivityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One human-readable entry in the activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: String,
    pub category: ActivityCategory,
    pub message: String,
    #[serde(with = "timestamp")]
    pub timestamp: OffsetDateTime,
    pub severity: Severity,
}
