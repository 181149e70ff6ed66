use crate::error::{LResult, LocationError};
use geo::{point, GeodesicDistance};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw positioning sample as delivered by the location provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// Monotonic timestamp, ms
    pub time_ms: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// GPS altitude, meters (geoid correction applied by the engine if configured)
    pub altitude: f64,
    /// Horizontal accuracy (1-sigma), meters
    pub accuracy: f64,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub bearing: Option<f64>,
    /// Secondary altitude reading taken alongside this fix (e.g. barometer)
    #[serde(default)]
    pub secondary_altitude: Option<f64>,
    #[serde(default)]
    pub heart_rate: Option<u32>,
    #[serde(default)]
    pub cadence: Option<u32>,
}

impl Fix {
    pub fn new(time_ms: i64, latitude: f64, longitude: f64, altitude: f64, accuracy: f64) -> Self {
        Self {
            time_ms,
            latitude,
            longitude,
            altitude,
            accuracy,
            speed: None,
            bearing: None,
            secondary_altitude: None,
            heart_rate: None,
            cadence: None,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = Some(bearing);
        self
    }

    pub fn with_secondary_altitude(mut self, altitude: f64) -> Self {
        self.secondary_altitude = Some(altitude);
        self
    }

    pub fn with_heart_rate(mut self, heart_rate: u32) -> Self {
        self.heart_rate = Some(heart_rate);
        self
    }

    pub fn with_cadence(mut self, cadence: u32) -> Self {
        self.cadence = Some(cadence);
        self
    }

    /// Reject values no positioning subsystem can legitimately produce
    pub fn validate(&self) -> LResult<()> {
        if !self.latitude.is_finite() || self.latitude.abs() > 90.0 {
            return Err(LocationError::InvalidFix(format!(
                "latitude out of range: {}",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || self.longitude.abs() > 180.0 {
            return Err(LocationError::InvalidFix(format!(
                "longitude out of range: {}",
                self.longitude
            )));
        }
        if !self.altitude.is_finite() {
            return Err(LocationError::InvalidFix(format!(
                "altitude is not finite: {}",
                self.altitude
            )));
        }
        if !self.accuracy.is_finite() || self.accuracy < 0.0 {
            return Err(LocationError::InvalidFix(format!(
                "accuracy must be a non-negative number, got {}",
                self.accuracy
            )));
        }
        Ok(())
    }

    /// Geodesic (WGS84) distance to another fix, meters
    pub fn distance_to(&self, other: &Fix) -> f64 {
        geodesic_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// A fix plus the values derived when the engine took it in.
///
/// Reference slots in the engine hold owned copies of these; a slot is
/// replaced wholesale, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSample {
    pub fix: Fix,
    /// GPS altitude after geoid correction
    pub gps_altitude: f64,
    /// Effective altitude: calibrated secondary altitude when available, else GPS
    pub altitude: f64,
    pub altitude_accuracy: f64,
    /// Cumulative distance when this sample was taken in, meters
    pub distance_so_far: f64,
}

impl EnrichedSample {
    pub fn time_ms(&self) -> i64 {
        self.fix.time_ms
    }

    pub fn accuracy(&self) -> f64 {
        self.fix.accuracy
    }

    pub fn distance_to(&self, other: &EnrichedSample) -> f64 {
        self.fix.distance_to(&other.fix)
    }
}

pub fn geodesic_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let a = point!(x: lon1, y: lat1);
    let b = point!(x: lon2, y: lat2);
    a.geodesic_distance(&b)
}

/// Eight-way compass label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompassPoint {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl CompassPoint {
    /// Octant for a bearing in degrees. Sectors are half-open and 45° wide,
    /// centred on each point, so [337.5, 360) and [0, 22.5) are both north.
    pub fn from_bearing(bearing: f64) -> Self {
        let mut normalized = bearing % 360.0;
        if normalized < 0.0 {
            normalized += 360.0;
        }
        // -0.0 and rounding at the top edge
        if !(0.0..360.0).contains(&normalized) {
            normalized = 0.0;
        }

        const POINTS: [CompassPoint; 8] = [
            CompassPoint::N,
            CompassPoint::NE,
            CompassPoint::E,
            CompassPoint::SE,
            CompassPoint::S,
            CompassPoint::SW,
            CompassPoint::W,
            CompassPoint::NW,
        ];
        let sector = ((normalized + 22.5) / 45.0).floor() as usize % 8;
        POINTS[sector]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompassPoint::N => "N",
            CompassPoint::NE => "NE",
            CompassPoint::E => "E",
            CompassPoint::SE => "SE",
            CompassPoint::S => "S",
            CompassPoint::SW => "SW",
            CompassPoint::W => "W",
            CompassPoint::NW => "NW",
        }
    }
}

impl fmt::Display for CompassPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fix_builder() {
        let fix = Fix::new(1000, 45.0, 6.0, 1200.0, 4.0)
            .with_speed(5.0)
            .with_bearing(90.0)
            .with_heart_rate(140);
        assert_eq!(fix.speed, Some(5.0));
        assert_eq!(fix.bearing, Some(90.0));
        assert_eq!(fix.heart_rate, Some(140));
        assert_eq!(fix.cadence, None);
    }

    #[test]
    fn test_validate() {
        assert!(Fix::new(0, 45.0, 6.0, 100.0, 5.0).validate().is_ok());
        assert!(Fix::new(0, f64::NAN, 6.0, 100.0, 5.0).validate().is_err());
        assert!(Fix::new(0, 95.0, 6.0, 100.0, 5.0).validate().is_err());
        assert!(Fix::new(0, 45.0, 181.0, 100.0, 5.0).validate().is_err());
        assert!(Fix::new(0, 45.0, 6.0, f64::INFINITY, 5.0).validate().is_err());
        assert!(Fix::new(0, 45.0, 6.0, 100.0, -1.0).validate().is_err());
    }

    #[test]
    fn test_geodesic_distance_one_degree_latitude() {
        // one degree of latitude at the equator on WGS84
        let d = geodesic_distance(0.0, 0.0, 1.0, 0.0);
        assert_relative_eq!(d, 110_574.4, epsilon = 1.0);
        assert_eq!(geodesic_distance(45.0, 6.0, 45.0, 6.0), 0.0);
    }

    #[test]
    fn test_fix_deserialize_optional_fields() {
        let json = r#"{"time_ms": 5, "latitude": 1.0, "longitude": 2.0, "altitude": 3.0, "accuracy": 4.0}"#;
        let fix: Fix = serde_json::from_str(json).unwrap();
        assert_eq!(fix, Fix::new(5, 1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn test_compass_octants() {
        assert_eq!(CompassPoint::from_bearing(0.0), CompassPoint::N);
        assert_eq!(CompassPoint::from_bearing(22.49), CompassPoint::N);
        assert_eq!(CompassPoint::from_bearing(22.5), CompassPoint::NE);
        assert_eq!(CompassPoint::from_bearing(67.5), CompassPoint::E);
        assert_eq!(CompassPoint::from_bearing(180.0), CompassPoint::S);
        assert_eq!(CompassPoint::from_bearing(292.5), CompassPoint::NW);
        assert_eq!(CompassPoint::from_bearing(337.5), CompassPoint::N);
        assert_eq!(CompassPoint::from_bearing(359.99), CompassPoint::N);
        assert_eq!(CompassPoint::from_bearing(360.0), CompassPoint::N);
        assert_eq!(CompassPoint::from_bearing(-45.0), CompassPoint::NW);
        assert_eq!(CompassPoint::from_bearing(-0.0), CompassPoint::N);
        assert_eq!(CompassPoint::SW.to_string(), "SW");
    }
}
