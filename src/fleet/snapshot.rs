//! # Snapshot Types
//!
//! One telemetry reading per drone, plus the capture-stamped history form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One instantaneous telemetry reading for a drone.
///
/// Metric fields are optional because producers omit what they do not
/// measure. Fields this type does not know about are kept in `extra` and
/// written back out unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Stable identity
    pub id: String,

    /// Display label
    #[serde(default)]
    pub name: String,

    /// Battery remaining in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<f64>,

    /// Altitude in meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,

    /// Ground speed in m/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,

    /// Latitude in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,

    /// Longitude in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,

    #[serde(default, alias = "isFlying", skip_serializing_if = "Option::is_none")]
    pub is_flying: Option<bool>,

    /// Unrecognized fields, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Snapshot {
    /// Creates a snapshot with only identity fields set.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Label to show for this drone, falling back to the id when unnamed.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A snapshot together with the instant the reconciler captured it.
///
/// `captured_at` comes from the reconciler's clock, never from the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub captured_at: DateTime<Utc>,

    #[serde(flatten)]
    pub snapshot: Snapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_full_snapshot() {
        let value = json!({
            "id": "a",
            "name": "Alpha",
            "battery": 55.5,
            "altitude": 12.0,
            "speed": 3.25,
            "lat": 34.07,
            "lng": -118.4398,
            "is_flying": true
        });

        let snapshot: Snapshot = serde_json::from_value(value).unwrap();
        assert_eq!(snapshot.id, "a");
        assert_eq!(snapshot.name, "Alpha");
        assert_eq!(snapshot.battery, Some(55.5));
        assert_eq!(snapshot.altitude, Some(12.0));
        assert_eq!(snapshot.speed, Some(3.25));
        assert_eq!(snapshot.lat, Some(34.07));
        assert_eq!(snapshot.lng, Some(-118.4398));
        assert_eq!(snapshot.is_flying, Some(true));
        assert!(snapshot.extra.is_empty());
    }

    #[test]
    fn test_camel_case_flying_alias() {
        let snapshot: Snapshot =
            serde_json::from_value(json!({"id": "a", "isFlying": false})).unwrap();
        assert_eq!(snapshot.is_flying, Some(false));
    }

    #[test]
    fn test_null_metrics_are_unknown() {
        let snapshot: Snapshot =
            serde_json::from_value(json!({"id": "a", "battery": null})).unwrap();
        assert_eq!(snapshot.battery, None);
        assert_eq!(snapshot.name, "");
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let value = json!({"id": "a", "name": "Alpha", "timestamp": 1700000000.5, "rssi": -70});
        let snapshot: Snapshot = serde_json::from_value(value).unwrap();

        assert_eq!(snapshot.extra.get("timestamp"), Some(&json!(1700000000.5)));
        assert_eq!(snapshot.extra.get("rssi"), Some(&json!(-70)));

        let back = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(back["rssi"], json!(-70));
        assert_eq!(back["timestamp"], json!(1700000000.5));
    }

    #[test]
    fn test_absent_metrics_not_serialized() {
        let snapshot = Snapshot::new("a", "Alpha");
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value, json!({"id": "a", "name": "Alpha"}));
    }

    #[test]
    fn test_wrong_metric_type_rejected() {
        let result: std::result::Result<Snapshot, _> =
            serde_json::from_value(json!({"id": "a", "battery": "full"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        assert_eq!(Snapshot::new("a", "").display_name(), "a");
        assert_eq!(Snapshot::new("a", "Alpha").display_name(), "Alpha");
    }
}
