use crate::config::FusionConfig;

/// When the current calibration delta was established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CalibrationStamp {
    /// Installed by hand; counts as older than any recalibration interval
    Manual,
    At(i64),
}

/// Median-smoothed secondary altitude (e.g. barometric) reconciled with GPS
/// altitude through a periodically refreshed offset.
#[derive(Debug, Clone)]
pub struct AltitudeFusion {
    config: FusionConfig,
    readings: Vec<f64>,
    readings_recorded: usize,
    fused_altitude: f64,
    active: bool,
    calibrated_at: Option<CalibrationStamp>,
    calibration_accuracy: f64,
    calibration_delta: f64,
    geoid_height: f64,
}

impl AltitudeFusion {
    pub fn new(config: FusionConfig) -> Self {
        let capacity = config.buffer_capacity;
        Self {
            config,
            readings: vec![0.0; capacity],
            readings_recorded: 0,
            fused_altitude: 0.0,
            active: false,
            calibrated_at: None,
            calibration_accuracy: 99.0,
            calibration_delta: 0.0,
            geoid_height: 0.0,
        }
    }

    /// Push one secondary reading into the ring buffer. Once more readings
    /// than the buffer holds have been seen, the fused altitude is the
    /// median of the buffer.
    pub fn record_secondary_reading(&mut self, altitude: f64) {
        let capacity = self.readings.len();
        self.readings[self.readings_recorded % capacity] = altitude;
        self.readings_recorded += 1;

        if self.readings_recorded > capacity {
            let mut sorted = self.readings.clone();
            sorted.sort_by(|a, b| a.total_cmp(b));
            self.fused_altitude = sorted[capacity / 2];
            self.active = true;
            log::trace!(
                "secondary altitude {} -> fused {}",
                altitude,
                self.fused_altitude
            );
        }
    }

    /// Subtract the configured geoid height from a raw GPS altitude
    pub fn correct_gps_altitude(&self, altitude: f64) -> f64 {
        if self.geoid_height != 0.0 {
            altitude - self.geoid_height
        } else {
            altitude
        }
    }

    /// Refresh the calibration delta if the fix qualifies. Returns true when
    /// the delta was recomputed, meaning the effective altitude source shifted.
    pub fn maybe_recalibrate(&mut self, time_ms: i64, accuracy: f64, gps_altitude: f64) -> bool {
        if !self.active {
            return false;
        }

        let much_better =
            accuracy < self.calibration_accuracy - self.config.recalibration_accuracy_gain;
        let interval_elapsed = match self.calibrated_at {
            None | Some(CalibrationStamp::Manual) => true,
            Some(CalibrationStamp::At(at)) => {
                time_ms.saturating_sub(at) > self.config.recalibration_interval_ms
            }
        };
        let periodic = interval_elapsed && accuracy < self.config.recalibration_max_accuracy;

        if !(much_better || periodic) {
            return false;
        }

        let previous = self.calibration_delta;
        self.calibrated_at = Some(CalibrationStamp::At(time_ms));
        self.calibration_accuracy = accuracy;
        self.calibration_delta = gps_altitude - self.fused_altitude;
        log::info!(
            "altitude calibration delta {:.2} -> {:.2} m (accuracy {} m)",
            previous,
            self.calibration_delta,
            accuracy
        );
        true
    }

    /// Calibration is in use: secondary readings are flowing and a delta exists
    pub fn is_calibrated(&self) -> bool {
        self.active && self.calibrated_at.is_some()
    }

    /// Effective altitude for a fix whose geoid-corrected GPS altitude is given
    pub fn effective_altitude(&self, gps_altitude: f64) -> f64 {
        if self.is_calibrated() {
            self.fused_altitude + self.calibration_delta
        } else {
            gps_altitude
        }
    }

    /// Accuracy to use for altitude decisions
    pub fn altitude_accuracy(&self, horizontal_accuracy: f64) -> f64 {
        if self.is_calibrated() {
            self.config.calibrated_altitude_accuracy
        } else {
            horizontal_accuracy
        }
    }

    /// Latest median secondary altitude (0 until enough readings arrived)
    pub fn fused_altitude(&self) -> f64 {
        self.fused_altitude
    }

    pub fn calibration_delta(&self) -> f64 {
        self.calibration_delta
    }

    pub fn geoid_height(&self) -> f64 {
        self.geoid_height
    }

    /// A new geoid height shifts every GPS altitude, so any calibration is
    /// dropped until fresh secondary readings and a qualifying fix arrive.
    /// Returns true when the height changed.
    pub fn set_geoid_height(&mut self, geoid_height: f64) -> bool {
        if self.geoid_height == geoid_height {
            return false;
        }
        log::info!("geoid height {} -> {} m", self.geoid_height, geoid_height);
        self.geoid_height = geoid_height;
        self.active = false;
        self.calibrated_at = None;
        true
    }

    /// Install a calibration delta from outside (e.g. restored from a previous
    /// session). Zero or unchanged values are ignored; returns true when the
    /// delta was installed.
    pub fn set_calibration_delta(&mut self, delta: f64) -> bool {
        if delta == 0.0 || delta == self.calibration_delta {
            return false;
        }
        log::info!("altitude calibration delta overridden to {:.2} m", delta);
        self.calibration_delta = delta;
        self.calibration_accuracy = self.config.recalibration_max_accuracy;
        self.calibrated_at = Some(CalibrationStamp::Manual);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fusion() -> AltitudeFusion {
        AltitudeFusion::new(FusionConfig::default())
    }

    #[test]
    fn test_median_of_last_readings() {
        let mut fusion = fusion();
        for value in [10.0, 12.0, 11.0, 13.0, 9.0] {
            fusion.record_secondary_reading(value);
        }
        // buffer full but not yet overwritten
        assert_eq!(fusion.fused_altitude(), 0.0);

        fusion.record_secondary_reading(14.0);
        // median(12, 11, 13, 9, 14)
        assert_eq!(fusion.fused_altitude(), 12.0);
    }

    #[test]
    fn test_ring_buffer_bounded() {
        let mut fusion = fusion();
        for i in 0..1000 {
            fusion.record_secondary_reading(i as f64);
        }
        assert_eq!(fusion.readings.len(), 5);
        // last five: 995..=999
        assert_eq!(fusion.fused_altitude(), 997.0);
    }

    #[test]
    fn test_no_calibration_without_readings() {
        let mut fusion = fusion();
        assert!(!fusion.maybe_recalibrate(0, 1.0, 500.0));
        assert!(!fusion.is_calibrated());
        assert_eq!(fusion.effective_altitude(500.0), 500.0);
        assert_eq!(fusion.altitude_accuracy(8.0), 8.0);
    }

    #[test]
    fn test_calibration_and_effective_altitude() {
        let mut fusion = fusion();
        for _ in 0..6 {
            fusion.record_secondary_reading(480.0);
        }
        assert!(fusion.maybe_recalibrate(1000, 4.0, 500.0));
        assert_relative_eq!(fusion.calibration_delta(), 20.0);
        assert!(fusion.is_calibrated());
        assert_eq!(fusion.altitude_accuracy(8.0), 1.0);

        fusion.record_secondary_reading(485.0);
        fusion.record_secondary_reading(485.0);
        fusion.record_secondary_reading(485.0);
        assert_relative_eq!(fusion.effective_altitude(500.0), 505.0);
    }

    #[test]
    fn test_recalibration_rules() {
        let mut fusion = fusion();
        for _ in 0..6 {
            fusion.record_secondary_reading(100.0);
        }
        assert!(fusion.maybe_recalibrate(0, 4.0, 110.0));
        // not 0.5 m better and interval not elapsed
        assert!(!fusion.maybe_recalibrate(60_000, 3.6, 111.0));
        // more than 0.5 m better
        assert!(fusion.maybe_recalibrate(120_000, 3.0, 112.0));
        assert_relative_eq!(fusion.calibration_delta(), 12.0);
        // interval elapsed, accuracy below 5 m
        assert!(fusion.maybe_recalibrate(120_000 + 20 * 60 * 1000 + 1, 4.5, 108.0));
        assert_relative_eq!(fusion.calibration_delta(), 8.0);
        // interval elapsed but accuracy too poor
        assert!(!fusion.maybe_recalibrate(10 * 60 * 60 * 1000, 6.0, 108.0));
    }

    #[test]
    fn test_geoid_height_drops_calibration() {
        let mut fusion = fusion();
        for _ in 0..6 {
            fusion.record_secondary_reading(100.0);
        }
        fusion.maybe_recalibrate(0, 3.0, 150.0);
        assert!(fusion.is_calibrated());

        assert!(fusion.set_geoid_height(48.5));
        assert!(!fusion.is_calibrated());
        assert_relative_eq!(fusion.correct_gps_altitude(150.0), 101.5);

        // same value again is a no-op
        assert!(!fusion.set_geoid_height(48.5));
        assert_eq!(fusion.geoid_height(), 48.5);
    }

    #[test]
    fn test_manual_delta_is_refreshed_by_good_fix() {
        let mut fusion = fusion();
        assert!(fusion.set_calibration_delta(30.0));
        assert_eq!(fusion.calibration_delta(), 30.0);
        // zero is ignored
        assert!(!fusion.set_calibration_delta(0.0));
        assert_eq!(fusion.calibration_delta(), 30.0);

        for _ in 0..6 {
            fusion.record_secondary_reading(200.0);
        }
        assert!(fusion.is_calibrated());
        assert_relative_eq!(fusion.effective_altitude(0.0), 230.0);
        // not good enough to beat the manual calibration accuracy
        assert!(!fusion.maybe_recalibrate(1000, 5.0, 235.0));
        assert!(fusion.maybe_recalibrate(2000, 4.9, 235.0));
        assert_relative_eq!(fusion.calibration_delta(), 35.0);
    }
}
