//! Data model for HVAC zone telemetry, predictions and device state.
//!
//! This crate holds the types shared by the reconciliation engine
//! (hvac-core) and its consumers. They mirror the JSON shapes served by the
//! HVAC control API and pushed over its `/ws/sensors` channel.
//!
//! # Features
//!
//! - Zone, device, reading and prediction types with serde support
//! - Activity feed entries and their severity/category enums
//! - Tolerant ISO-8601 timestamp handling (see [`timestamp`])
//!
//! # Example
//!
//! ```
//! use hvac_types::SensorReading;
//!
//! let json = r#"{"timestamp":"2024-05-01T12:00:00Z","temperature":22.5}"#;
//! let reading: SensorReading = serde_json::from_str(json).unwrap();
//! assert_eq!(reading.temperature, Some(22.5));
//! assert_eq!(reading.co2_level, None);
//! ```

pub mod error;
pub mod timestamp;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    ActivityCategory, ActivityEvent, DEFAULT_PREDICTION_HORIZON_MINUTES, Device, DeviceKind,
    DeviceStatus, SensorReading, Severity, Trend, Zone, ZoneHistory, ZonePrediction,
};

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    // --- Zone ---

    #[test]
    fn test_zone_from_api_json() {
        let json = r#"{
            "id": "server-room",
            "name": "Server Room",
            "setpoint": 20.5,
            "adaptive_mode": true,
            "created_at": "2024-05-01T08:00:00",
            "updated_at": "2024-05-01T09:15:30.123456"
        }"#;

        let zone: Zone = serde_json::from_str(json).unwrap();
        assert_eq!(zone.id, "server-room");
        assert!((zone.setpoint - 20.5).abs() < f64::EPSILON);
        assert!(zone.adaptive_mode);
        assert_eq!(zone.created_at, datetime!(2024-05-01 08:00:00 UTC));
    }

    #[test]
    fn test_zone_serializes_rfc3339() {
        let zone = Zone {
            id: "open-office".to_string(),
            name: "Open Office".to_string(),
            setpoint: 22.0,
            adaptive_mode: false,
            created_at: datetime!(2024-05-01 08:00:00 UTC),
            updated_at: datetime!(2024-05-01 08:00:00 UTC),
        };

        let json = serde_json::to_string(&zone).unwrap();
        assert!(json.contains("\"created_at\":\"2024-05-01T08:00:00Z\""));
    }

    // --- Device ---

    #[test]
    fn test_device_type_field_renamed() {
        let json = r#"{
            "id": "fcu-1",
            "name": "FCU Server Room",
            "type": "fcu",
            "zone_id": "server-room",
            "status": "syncing",
            "discovered_at": "2024-05-01T08:00:00Z",
            "last_seen": null,
            "metadata_json": {"firmware": "1.2.0"}
        }"#;

        let device: Device = serde_json::from_str(json).unwrap();
        assert_eq!(device.kind, DeviceKind::Fcu);
        assert_eq!(device.status, DeviceStatus::Syncing);
        assert_eq!(device.zone_id.as_deref(), Some("server-room"));
        assert!(device.last_seen.is_none());
        assert_eq!(device.metadata_json.unwrap()["firmware"], "1.2.0");
    }

    #[test]
    fn test_device_minimal_fields() {
        let json = r#"{
            "id": "sensor-9",
            "name": "Spare Sensor",
            "type": "sensor",
            "discovered_at": "2024-05-01T08:00:00Z"
        }"#;

        let device: Device = serde_json::from_str(json).unwrap();
        assert_eq!(device.kind, DeviceKind::Sensor);
        assert_eq!(device.status, DeviceStatus::Offline);
        assert!(device.zone_id.is_none());
        assert!(device.metadata_json.is_none());
    }

    #[test]
    fn test_device_status_from_str() {
        assert_eq!("online".parse::<DeviceStatus>(), Ok(DeviceStatus::Online));
        assert_eq!(" Offline ".parse::<DeviceStatus>(), Ok(DeviceStatus::Offline));
        assert_eq!("SYNCING".parse::<DeviceStatus>(), Ok(DeviceStatus::Syncing));
        assert!("rebooting".parse::<DeviceStatus>().is_err());
    }

    #[test]
    fn test_device_kind_display_roundtrip() {
        for kind in [DeviceKind::Fcu, DeviceKind::Sensor] {
            assert_eq!(kind.to_string().parse::<DeviceKind>(), Ok(kind));
        }
    }

    // --- SensorReading ---

    #[test]
    fn test_reading_absent_fields_are_none_not_zero() {
        let json = r#"{"timestamp":"2024-05-01T12:00:00Z","temperature":21.0,"power_kw":0.0}"#;
        let reading: SensorReading = serde_json::from_str(json).unwrap();

        assert_eq!(reading.temperature, Some(21.0));
        assert_eq!(reading.power_kw, Some(0.0));
        assert_eq!(reading.co2_level, None);
        assert_eq!(reading.humidity, None);
        assert_eq!(reading.occupancy, None);
    }

    #[test]
    fn test_reading_builder() {
        let reading = SensorReading::at(datetime!(2024-05-01 12:00:00 UTC))
            .with_temperature(22.5)
            .with_occupancy(4);

        assert_eq!(reading.temperature, Some(22.5));
        assert_eq!(reading.occupancy, Some(4));
        assert!(!reading.is_empty());
        assert!(SensorReading::at(reading.timestamp).is_empty());
    }

    #[test]
    fn test_zone_history_defaults_to_empty() {
        let history: ZoneHistory = serde_json::from_str(r#"{"zone_id":"z1"}"#).unwrap();
        assert!(history.readings.is_empty());
    }

    // --- ZonePrediction ---

    #[test]
    fn test_prediction_defaults() {
        let json = r#"{
            "zone_id": "z1",
            "current_temp": 22.0,
            "predicted_temp": 23.5,
            "confidence": 0.9,
            "timestamp": "2024-05-01T12:00:00Z"
        }"#;

        let prediction: ZonePrediction = serde_json::from_str(json).unwrap();
        assert_eq!(
            prediction.prediction_horizon_minutes,
            DEFAULT_PREDICTION_HORIZON_MINUTES
        );
        assert_eq!(prediction.trend, Trend::Stable);
        assert!((prediction.delta() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_prediction_unrecognized_trend_decodes_stable() {
        let json = r#"{
            "zone_id": "z1",
            "current_temp": 22.0,
            "predicted_temp": 22.1,
            "confidence": 0.6,
            "trend": "sideways",
            "timestamp": "2024-05-01T12:00:00Z"
        }"#;
        let prediction: ZonePrediction = serde_json::from_str(json).unwrap();
        assert_eq!(prediction.trend, Trend::Stable);

        let json = json.replace(r#""sideways""#, r#""Falling""#);
        let prediction: ZonePrediction = serde_json::from_str(&json).unwrap();
        assert_eq!(prediction.trend, Trend::Falling);

        let json = json.replace(r#""Falling""#, "null");
        let prediction: ZonePrediction = serde_json::from_str(&json).unwrap();
        assert_eq!(prediction.trend, Trend::Stable);
    }

    #[test]
    fn test_trend_from_str() {
        assert_eq!("rising".parse::<Trend>(), Ok(Trend::Rising));
        assert_eq!("Falling".parse::<Trend>(), Ok(Trend::Falling));
        let err = "sideways".parse::<Trend>().unwrap_err();
        assert!(err.to_string().contains("sideways"));
    }

    // --- ActivityEvent ---

    #[test]
    fn test_activity_event_serialization() {
        let event = ActivityEvent {
            id: "7".to_string(),
            category: ActivityCategory::DeviceDiscovered,
            message: "New device detected: FCU-3 in open-office".to_string(),
            timestamp: datetime!(2024-05-01 12:00:00 UTC),
            severity: Severity::Success,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"category\":\"device_discovered\""));
        assert!(json.contains("\"severity\":\"success\""));

        let back: ActivityEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn optional_fields_survive_serde(
                temperature in proptest::option::of(-40.0f64..60.0),
                co2 in proptest::option::of(0.0f64..5000.0),
                occupancy in proptest::option::of(0u32..500),
            ) {
                let mut reading = SensorReading::at(datetime!(2024-05-01 12:00:00 UTC));
                reading.temperature = temperature;
                reading.co2_level = co2;
                reading.occupancy = occupancy;

                let json = serde_json::to_string(&reading).unwrap();
                let back: SensorReading = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(back.temperature.is_some(), temperature.is_some());
                prop_assert_eq!(back.co2_level.is_some(), co2.is_some());
                prop_assert_eq!(back.occupancy, occupancy);
            }
        }
    }
}
