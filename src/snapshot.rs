use serde::{Deserialize, Serialize};

const MS_TO_KMH: f64 = 3.6;

/// Read-model values at one point in time (JSON-serializable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub time_ms: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub gps_altitude: f64,
    pub secondary_altitude: f64,
    pub altitude_accuracy: f64,
    pub accuracy: f64,
    pub accuracy_threshold: f64,
    pub speed: f64,
    pub average_speed: f64,
    pub max_speed: f64,
    pub max_speed_kmh: f64,
    pub bearing: f64,
    pub bearing_text: String,
    pub distance: f64,
    pub elapsed_time_ms: i64,
    pub ascent: f64,
    pub ascent_rate: f64,
    pub slope: f64,
    pub major_ascent_count: u32,
    pub geoid_height: f64,
    pub altitude_calibration_delta: f64,
    pub heart_rate: Option<u32>,
    pub cadence: Option<u32>,
    pub total_samples_seen: u64,
    pub accepted_samples_seen: u64,
}

impl StatsSnapshot {
    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn average_speed_kmh(&self) -> f64 {
        self.average_speed * MS_TO_KMH
    }

    pub fn slope_percent(&self) -> f64 {
        self.slope * 100.0
    }
}

/// What a persistence collaborator should capture for a save-worthy sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavePoint {
    pub time_ms: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub gps_altitude: f64,
    pub secondary_altitude: f64,
    /// Floored cumulative ascent
    pub ascent: f64,
    pub accuracy: f64,
    pub heart_rate: Option<u32>,
    pub cadence: Option<u32>,
}

impl SavePoint {
    /// Serialize to JSON bytes
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

pub(crate) fn kmh(speed_ms: f64) -> f64 {
    speed_ms * MS_TO_KMH
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> StatsSnapshot {
        StatsSnapshot {
            time_ms: 1_000,
            latitude: 45.0,
            longitude: 6.0,
            altitude: 1200.0,
            gps_altitude: 1203.0,
            secondary_altitude: 1180.0,
            altitude_accuracy: 1.0,
            accuracy: 4.0,
            accuracy_threshold: 20.0,
            speed: 5.0,
            average_speed: 4.0,
            max_speed: 10.0,
            max_speed_kmh: kmh(10.0),
            bearing: 90.0,
            bearing_text: "E".to_string(),
            distance: 1500.0,
            elapsed_time_ms: 375_000,
            ascent: 120.0,
            ascent_rate: 0.2,
            slope: 0.08,
            major_ascent_count: 1,
            geoid_height: 0.0,
            altitude_calibration_delta: 20.0,
            heart_rate: Some(150),
            cadence: None,
            total_samples_seen: 400,
            accepted_samples_seen: 380,
        }
    }

    #[test]
    fn test_snapshot_json() {
        let json = snapshot().to_json().unwrap();
        assert!(json.contains("\"bearing_text\": \"E\""));
        assert!(json.contains("\"cadence\": null"));
        let back: StatsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot());
    }

    #[test]
    fn test_unit_conversions() {
        let snapshot = snapshot();
        assert!((snapshot.max_speed_kmh - 36.0).abs() < 1e-9);
        assert!((snapshot.average_speed_kmh() - 14.4).abs() < 1e-9);
        assert!((snapshot.slope_percent() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_save_point_bytes() {
        let point = SavePoint {
            time_ms: 42,
            latitude: 45.0,
            longitude: 6.0,
            altitude: 100.0,
            gps_altitude: 101.0,
            secondary_altitude: 0.0,
            ascent: 12.0,
            accuracy: 3.0,
            heart_rate: None,
            cadence: Some(80),
        };
        let bytes = point.to_json_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"cadence\":80"));
    }
}
