//! Plain-text rendering of dashboard snapshots.

use std::fmt::Write as _;

use hvac_core::{ConnectionState, DashboardSnapshot, Notification, NotificationLevel, ZoneView};
use hvac_types::{ActivityEvent, Device, SensorReading, ZonePrediction};
use time::OffsetDateTime;
use time::macros::format_description;

/// Activity rows shown under the zones.
pub const DEFAULT_ACTIVITY_ROWS: usize = 15;

/// Placeholder for values the server did not report.
const MISSING: &str = "—";

/// Render the whole dashboard.
pub fn render_snapshot(snapshot: &DashboardSnapshot, activity_rows: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Connection: {} (revision {})",
        connection_label(snapshot.connection),
        snapshot.revision
    );

    if snapshot.zones.is_empty() {
        out.push_str("\nNo zones loaded\n");
    }
    for view in &snapshot.zones {
        out.push('\n');
        out.push_str(&render_zone(view));
    }

    out.push_str("\nRecent activity\n");
    if snapshot.activity.is_empty() {
        out.push_str("  (none)\n");
    }
    for event in snapshot.activity.iter().take(activity_rows) {
        let _ = writeln!(out, "  {}", format_activity(event));
    }
    out
}

/// Render one zone card.
pub fn render_zone(view: &ZoneView) -> String {
    let zone = &view.zone;
    let mode = if zone.adaptive_mode { "adaptive" } else { "manual" };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} [{}]  setpoint {:.1} °C  {}",
        zone.name, zone.id, zone.setpoint, mode
    );
    let _ = writeln!(out, "  {}", format_reading(view.reading.as_ref()));
    if let Some(prediction) = &view.prediction {
        let _ = writeln!(out, "  {}", format_prediction(prediction));
    }
    let _ = writeln!(
        out,
        "  FCU: {}  Sensor: {}",
        format_device(view.fcu()),
        format_device(view.sensor())
    );
    let _ = writeln!(
        out,
        "  History: {} sample(s)  Refresh: {} ok, {} failed",
        view.history.len(),
        view.refresh.success_count,
        view.refresh.failure_count
    );
    if view.refresh.consecutive_failures > 0
        && let Some(error) = &view.refresh.last_error
    {
        let _ = writeln!(out, "  Last refresh error: {error}");
    }
    out
}

/// One line with every reading field, absent values shown as a dash.
pub fn format_reading(reading: Option<&SensorReading>) -> String {
    let Some(reading) = reading else {
        return "No reading yet".to_string();
    };

    format!(
        "Temperature {} °C  Humidity {} %  CO₂ {} ppm  Power {} kW  Occupancy {}",
        format_value(reading.temperature, 1),
        format_value(reading.humidity, 1),
        format_value(reading.co2_level, 0),
        format_value(reading.power_kw, 2),
        reading
            .occupancy
            .map_or_else(|| MISSING.to_string(), |n| n.to_string()),
    )
}

pub fn format_prediction(prediction: &ZonePrediction) -> String {
    format!(
        "Prediction {:.1} → {:.1} °C {} in {} min ({:.0}% confidence)",
        prediction.current_temp,
        prediction.predicted_temp,
        prediction.trend.arrow(),
        prediction.prediction_horizon_minutes,
        prediction.confidence * 100.0
    )
}

pub fn format_activity(event: &ActivityEvent) -> String {
    format!(
        "{}  {:<7}  {}",
        format_time(&event.timestamp),
        event.severity.as_str(),
        event.message
    )
}

pub fn format_notification(notification: &Notification) -> String {
    let marker = match notification.level {
        NotificationLevel::Default => "*",
        NotificationLevel::Destructive => "!",
    };
    format!("[{marker}] {}: {}", notification.title, notification.description)
}

fn format_device(device: Option<&Device>) -> String {
    match device {
        Some(device) => format!("{} ({})", device.name, device.status),
        None => MISSING.to_string(),
    }
}

fn format_value(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{v:.precision$}"),
        None => MISSING.to_string(),
    }
}

fn format_time(ts: &OffsetDateTime) -> String {
    ts.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| ts.to_string())
}

fn connection_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
        ConnectionState::Disconnected => "disconnected",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvac_core::RefreshStats;
    use hvac_types::{ActivityCategory, DeviceKind, DeviceStatus, Severity, Trend, Zone};
    use time::macros::datetime;

    fn zone_view() -> ZoneView {
        let at = datetime!(2024-05-01 12:00:00 UTC);
        ZoneView {
            zone: Zone {
                id: "server-room".to_string(),
                name: "Server Room".to_string(),
                setpoint: 20.5,
                adaptive_mode: true,
                created_at: at,
                updated_at: at,
            },
            devices: vec![Device {
                id: "fcu-1".to_string(),
                name: "FCU-1".to_string(),
                kind: DeviceKind::Fcu,
                zone_id: Some("server-room".to_string()),
                status: DeviceStatus::Online,
                discovered_at: at,
                last_seen: None,
                metadata_json: None,
            }],
            reading: Some(SensorReading::at(at).with_temperature(22.25).with_occupancy(0)),
            prediction: Some(ZonePrediction {
                zone_id: "server-room".to_string(),
                current_temp: 22.0,
                predicted_temp: 23.5,
                confidence: 0.87,
                prediction_horizon_minutes: 15,
                trend: Trend::Rising,
                timestamp: at,
            }),
            history: Vec::new(),
            refresh: RefreshStats::default(),
        }
    }

    #[test]
    fn test_format_reading_marks_absent_fields() {
        let reading = SensorReading::at(datetime!(2024-05-01 12:00:00 UTC))
            .with_temperature(21.0)
            .with_power_kw(0.0);
        let line = format_reading(Some(&reading));

        assert!(line.contains("Temperature 21.0 °C"));
        assert!(line.contains("Power 0.00 kW"));
        assert!(line.contains("Humidity — %"));
        assert!(line.contains("Occupancy —"));
        assert_eq!(format_reading(None), "No reading yet");
    }

    #[test]
    fn test_format_reading_all_fields() {
        let reading = SensorReading::at(datetime!(2024-05-01 12:00:00 UTC))
            .with_temperature(22.3)
            .with_humidity(45.0)
            .with_co2_level(612.0)
            .with_power_kw(1.5)
            .with_occupancy(3);

        assert_eq!(
            format_reading(Some(&reading)),
            "Temperature 22.3 °C  Humidity 45.0 %  CO₂ 612 ppm  Power 1.50 kW  Occupancy 3"
        );
    }

    #[test]
    fn test_render_zone() {
        let text = render_zone(&zone_view());

        assert!(text.starts_with("Server Room [server-room]  setpoint 20.5 °C  adaptive"));
        assert!(text.contains("Prediction 22.0 → 23.5 °C ↑ in 15 min (87% confidence)"));
        assert!(text.contains("FCU: FCU-1 (online)  Sensor: —"));
        assert!(text.contains("Occupancy 0"));
        assert!(!text.contains("Last refresh error"));
    }

    #[test]
    fn test_render_zone_shows_failing_refresh() {
        let mut view = zone_view();
        view.refresh.record_failure("API error (503): Service Unavailable".to_string());

        let text = render_zone(&view);
        assert!(text.contains("Refresh: 0 ok, 1 failed"));
        assert!(text.contains("Last refresh error: API error (503): Service Unavailable"));
    }

    #[test]
    fn test_render_snapshot_limits_activity() {
        let activity = (0..20)
            .map(|i| ActivityEvent {
                id: i.to_string(),
                category: ActivityCategory::DeviceStatus,
                message: format!("sensor-{i} is now online"),
                timestamp: datetime!(2024-05-01 12:00:00 UTC),
                severity: Severity::Success,
            })
            .collect();
        let snapshot = DashboardSnapshot {
            revision: 7,
            connection: ConnectionState::Connected,
            zones: vec![zone_view()],
            activity,
        };

        let text = render_snapshot(&snapshot, DEFAULT_ACTIVITY_ROWS);
        assert!(text.starts_with("Connection: connected (revision 7)"));
        assert!(text.contains("12:00:00  success  sensor-0 is now online"));
        assert!(text.contains("sensor-14 is now online"));
        assert!(!text.contains("sensor-15 is now online"));
    }

    #[test]
    fn test_render_empty_snapshot() {
        let text = render_snapshot(&DashboardSnapshot::default(), DEFAULT_ACTIVITY_ROWS);
        assert!(text.contains("Connection: disconnected"));
        assert!(text.contains("No zones loaded"));
        assert!(text.contains("(none)"));
    }

    #[test]
    fn test_format_notification() {
        let toast = Notification::new("Device Status Change", "fcu-2 went offline")
            .with_level(NotificationLevel::Destructive);
        assert_eq!(
            format_notification(&toast),
            "[!] Device Status Change: fcu-2 went offline"
        );
    }
}
