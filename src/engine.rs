//! Per-fix statistics pipeline.
//!
//! Every fix runs, in order, through the debounce check, the accuracy gate,
//! altitude fusion, the ascent detector, the rate/slope window and the
//! major-ascent counter. The engine owns all state, performs no I/O and is
//! driven by one caller at a time; see `session` for a shareable handle.

use crate::ascent::AscentDetector;
use crate::climbs::MajorAscentCounter;
use crate::config::EngineConfig;
use crate::error::LResult;
use crate::fix::{CompassPoint, EnrichedSample, Fix};
use crate::fusion::AltitudeFusion;
use crate::gate::AccuracyGate;
use crate::rate::RateSlopeTracker;
use crate::snapshot::{kmh, SavePoint, StatsSnapshot};
use serde::{Deserialize, Serialize};

/// Classification of one processed fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleOutcome {
    /// Ignored entirely: debounced, out of order or invalid
    Skipped,
    /// Accuracy worse than the current threshold; excluded from statistics
    Rejected,
    Accepted,
    /// Accepted, and far enough (in time or space) from the last saved
    /// sample that a persistence collaborator should capture it
    AcceptedSaveWorthy,
}

impl SampleOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(
            self,
            SampleOutcome::Accepted | SampleOutcome::AcceptedSaveWorthy
        )
    }
}

pub struct StatisticsEngine {
    config: EngineConfig,
    gate: AccuracyGate,
    fusion: AltitudeFusion,
    ascent: AscentDetector,
    rate: RateSlopeTracker,
    climbs: MajorAscentCounter,

    last_sample: Option<EnrichedSample>,
    last_good_sample: Option<EnrichedSample>,
    last_saved_sample: Option<EnrichedSample>,

    total_distance: f64,
    elapsed_time_ms: i64,
    max_speed: f64,
    total_samples_seen: u64,
    accepted_samples_seen: u64,

    /// (speed m/s, time ms) from a non-GPS sensor
    external_speed: Option<(f64, i64)>,
    save_enabled: bool,
    pending_save: Option<SavePoint>,
}

impl StatisticsEngine {
    pub fn new(config: EngineConfig) -> LResult<Self> {
        if let Err(e) = config.validate() {
            log::warn!("rejecting engine configuration: {}", e);
            return Err(e);
        }
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        Self {
            gate: AccuracyGate::new(config.gate.clone()),
            fusion: AltitudeFusion::new(config.fusion.clone()),
            ascent: AscentDetector::new(config.ascent.clone()),
            rate: RateSlopeTracker::new(config.rate.clone()),
            climbs: MajorAscentCounter::new(config.climbs.clone()),
            config,
            last_sample: None,
            last_good_sample: None,
            last_saved_sample: None,
            total_distance: 0.0,
            elapsed_time_ms: 0,
            max_speed: 0.0,
            total_samples_seen: 0,
            accepted_samples_seen: 0,
            external_speed: None,
            save_enabled: false,
            pending_save: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one fix through the pipeline
    pub fn process(&mut self, fix: Fix) -> SampleOutcome {
        self.total_samples_seen += 1;

        if let Err(e) = fix.validate() {
            log::warn!("ignoring fix at {} ms: {}", fix.time_ms, e);
            return SampleOutcome::Skipped;
        }

        if let Some(altitude) = fix.secondary_altitude {
            self.record_secondary_altitude(altitude);
        }

        if let Some(last) = &self.last_sample {
            if fix.time_ms < last.time_ms() {
                log::debug!(
                    "fix at {} ms is older than previous fix at {} ms, skipped",
                    fix.time_ms,
                    last.time_ms()
                );
                return SampleOutcome::Skipped;
            }
        }
        if let Some(good) = &self.last_good_sample {
            if fix.time_ms.saturating_sub(good.time_ms()) < self.config.gate.debounce_ms {
                log::debug!(
                    "fix at {} ms within {} ms of last good fix, skipped",
                    fix.time_ms,
                    self.config.gate.debounce_ms
                );
                return SampleOutcome::Skipped;
            }
        }

        let gps_altitude = self.fusion.correct_gps_altitude(fix.altitude);
        if self
            .fusion
            .maybe_recalibrate(fix.time_ms, fix.accuracy, gps_altitude)
        {
            // altitude source shifted: restart ascent tracking from the next sample
            self.ascent.reset_primary();
        }

        if fix.accuracy < self.config.gate.max_speed_accuracy {
            if let Some(speed) = fix.speed {
                self.max_speed = self.max_speed.max(speed);
            }
        }

        let decision = self.gate.evaluate(fix.accuracy);
        if !decision.accept {
            log::trace!(
                "fix at {} ms rejected: accuracy {} m > threshold {} m",
                fix.time_ms,
                fix.accuracy,
                self.gate.threshold()
            );
            self.last_sample = Some(self.enrich(fix, gps_altitude));
            return SampleOutcome::Rejected;
        }
        self.accepted_samples_seen += 1;

        let (delta_time, delta_distance) = match &self.last_good_sample {
            Some(good) => (
                fix.time_ms.saturating_sub(good.time_ms()),
                fix.distance_to(&good.fix),
            ),
            None => (0, 0.0),
        };
        let local_speed = if delta_time > 0 {
            delta_distance / (delta_time as f64 / 1000.0)
        } else {
            0.0
        };
        // stationary jitter must not move any statistic
        let moving = self.last_good_sample.is_none()
            || local_speed > self.config.ascent.min_speed_for_stats;

        if moving {
            self.elapsed_time_ms = self.elapsed_time_ms.saturating_add(delta_time);
            self.total_distance += delta_distance;
        }

        let sample = self.enrich(fix, gps_altitude);
        self.last_sample = Some(sample.clone());

        let mut outcome = SampleOutcome::Accepted;
        if moving {
            self.update_altitude_statistics(&sample);

            if self.is_save_worthy(&sample) {
                outcome = SampleOutcome::AcceptedSaveWorthy;
                self.last_saved_sample = Some(sample.clone());
                if self.save_enabled {
                    self.pending_save = Some(self.save_point());
                }
            }
        }

        log::trace!(
            "{} ms: +{:.1} m in {} ms, distance {:.1} m, ascent {:.1} m, avg speed {:.2} m/s",
            sample.time_ms(),
            if moving { delta_distance } else { 0.0 },
            if moving { delta_time } else { 0 },
            self.total_distance,
            self.ascent.cumulative_ascent(),
            self.average_speed()
        );

        self.last_good_sample = Some(sample);
        outcome
    }

    fn enrich(&self, fix: Fix, gps_altitude: f64) -> EnrichedSample {
        EnrichedSample {
            altitude: self.fusion.effective_altitude(gps_altitude),
            altitude_accuracy: self.fusion.altitude_accuracy(fix.accuracy),
            gps_altitude,
            distance_so_far: self.total_distance,
            fix,
        }
    }

    fn update_altitude_statistics(&mut self, sample: &EnrichedSample) {
        let step = self.ascent.on_accepted_sample(sample);
        if step.baselined || step.rate_rebaselined {
            self.rate.rebaseline(sample);
        }
        if step.accepted.is_some() {
            self.rate.update(sample, self.total_distance);
        }

        self.climbs.update(sample.altitude, sample.accuracy());
        self.rate.check_resets(sample);
    }

    fn is_save_worthy(&self, sample: &EnrichedSample) -> bool {
        match &self.last_saved_sample {
            None => true,
            Some(saved) => {
                sample.time_ms().saturating_sub(saved.time_ms()) >= self.config.save.min_interval_ms
                    || sample.distance_to(saved) >= self.config.save.min_distance
            }
        }
    }

    fn save_point(&self) -> SavePoint {
        let (heart_rate, cadence) = self.sensor_values();
        SavePoint {
            time_ms: self.time_ms(),
            latitude: self.latitude(),
            longitude: self.longitude(),
            altitude: self.altitude(),
            gps_altitude: self.gps_altitude(),
            secondary_altitude: self.secondary_altitude(),
            ascent: self.ascent(),
            accuracy: self.accuracy(),
            heart_rate,
            cadence,
        }
    }

    fn sensor_values(&self) -> (Option<u32>, Option<u32>) {
        self.last_sample
            .as_ref()
            .map(|s| (s.fix.heart_rate, s.fix.cadence))
            .unwrap_or((None, None))
    }

    /// Feed a secondary altitude reading (e.g. barometric), independent of fixes
    pub fn record_secondary_altitude(&mut self, altitude: f64) {
        if !altitude.is_finite() {
            log::warn!("ignoring non-finite secondary altitude {}", altitude);
            return;
        }
        self.fusion.record_secondary_reading(altitude);
    }

    /// Speed from a non-GPS sensor, preferred while it is recent
    pub fn record_external_speed(&mut self, speed: f64, time_ms: i64) {
        if !speed.is_finite() {
            log::warn!("ignoring non-finite external speed {}", speed);
            return;
        }
        log::trace!("external speed {} m/s at {} ms", speed, time_ms);
        self.external_speed = Some((speed, time_ms));
    }

    /// Hand the pending save point (if any) to the caller
    pub fn take_save_point(&mut self) -> Option<SavePoint> {
        self.pending_save.take()
    }

    // ===== Read model =====

    /// Effective altitude: calibrated secondary altitude when available,
    /// else the altitude of the last good fix
    pub fn altitude(&self) -> f64 {
        if self.fusion.is_calibrated() {
            return self.fusion.fused_altitude() + self.fusion.calibration_delta();
        }
        self.last_good_sample
            .as_ref()
            .map(|s| s.altitude)
            .unwrap_or(0.0)
    }

    /// Geoid-corrected GPS altitude of the last fix
    pub fn gps_altitude(&self) -> f64 {
        self.last_sample
            .as_ref()
            .map(|s| s.gps_altitude)
            .unwrap_or(0.0)
    }

    pub fn secondary_altitude(&self) -> f64 {
        self.fusion.fused_altitude()
    }

    /// Altitude of the current ascent reference
    pub fn good_altitude(&self) -> f64 {
        self.ascent
            .primary_reference()
            .map(|s| s.altitude)
            .unwrap_or(0.0)
    }

    pub fn altitude_accuracy(&self) -> f64 {
        self.last_sample
            .as_ref()
            .map(|s| s.altitude_accuracy)
            .unwrap_or(0.0)
    }

    pub fn accuracy(&self) -> f64 {
        self.last_sample
            .as_ref()
            .map(|s| s.accuracy())
            .unwrap_or(0.0)
    }

    pub fn accuracy_threshold(&self) -> f64 {
        self.gate.threshold()
    }

    /// Instantaneous speed, m/s. A non-zero sensor speed wins unless the
    /// last fix is more than `external_speed_max_age_ms` newer.
    pub fn speed(&self) -> f64 {
        let max_age = self.config.external_speed_max_age_ms;
        match (&self.last_sample, self.external_speed) {
            (Some(current), Some((speed, at)))
                if speed != 0.0 && current.time_ms() < at.saturating_add(max_age) =>
            {
                speed
            }
            (Some(current), _) => current.fix.speed.unwrap_or(0.0),
            (None, Some((speed, _))) => speed,
            (None, None) => 0.0,
        }
    }

    pub fn average_speed(&self) -> f64 {
        if self.elapsed_time_ms > 0 {
            self.total_distance / (self.elapsed_time_ms as f64 / 1000.0)
        } else {
            0.0
        }
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn has_bearing(&self) -> bool {
        self.last_sample
            .as_ref()
            .is_some_and(|s| s.fix.bearing.is_some())
    }

    pub fn bearing(&self) -> f64 {
        self.last_sample
            .as_ref()
            .and_then(|s| s.fix.bearing)
            .unwrap_or(0.0)
    }

    /// Compass octant of the last bearing, empty before the first fix
    pub fn bearing_text(&self) -> String {
        match &self.last_sample {
            Some(sample) => CompassPoint::from_bearing(sample.fix.bearing.unwrap_or(0.0))
                .as_str()
                .to_string(),
            None => String::new(),
        }
    }

    pub fn latitude(&self) -> f64 {
        self.last_sample
            .as_ref()
            .map(|s| s.fix.latitude)
            .unwrap_or(0.0)
    }

    pub fn longitude(&self) -> f64 {
        self.last_sample
            .as_ref()
            .map(|s| s.fix.longitude)
            .unwrap_or(0.0)
    }

    /// Timestamp of the last fix, ms
    pub fn time_ms(&self) -> i64 {
        self.last_sample
            .as_ref()
            .map(|s| s.time_ms())
            .unwrap_or(0)
    }

    pub fn distance(&self) -> f64 {
        self.total_distance
    }

    pub fn elapsed_time_ms(&self) -> i64 {
        self.elapsed_time_ms
    }

    /// Cumulative ascent floored to whole meters
    pub fn ascent(&self) -> f64 {
        self.ascent.cumulative_ascent().floor()
    }

    pub fn ascent_rate(&self) -> f64 {
        self.rate.ascent_rate()
    }

    /// Fraction; see `slope_percent`
    pub fn slope(&self) -> f64 {
        self.rate.slope()
    }

    pub fn slope_percent(&self) -> f64 {
        self.rate.slope() * 100.0
    }

    pub fn major_ascent_count(&self) -> u32 {
        self.climbs.count()
    }

    pub fn geoid_height(&self) -> f64 {
        self.fusion.geoid_height()
    }

    pub fn altitude_calibration_delta(&self) -> f64 {
        self.fusion.calibration_delta()
    }

    pub fn heart_rate(&self) -> Option<u32> {
        self.sensor_values().0
    }

    pub fn cadence(&self) -> Option<u32> {
        self.sensor_values().1
    }

    pub fn total_samples_seen(&self) -> u64 {
        self.total_samples_seen
    }

    pub fn accepted_samples_seen(&self) -> u64 {
        self.accepted_samples_seen
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let (heart_rate, cadence) = self.sensor_values();
        StatsSnapshot {
            time_ms: self.time_ms(),
            latitude: self.latitude(),
            longitude: self.longitude(),
            altitude: self.altitude(),
            gps_altitude: self.gps_altitude(),
            secondary_altitude: self.secondary_altitude(),
            altitude_accuracy: self.altitude_accuracy(),
            accuracy: self.accuracy(),
            accuracy_threshold: self.accuracy_threshold(),
            speed: self.speed(),
            average_speed: self.average_speed(),
            max_speed: self.max_speed,
            max_speed_kmh: kmh(self.max_speed),
            bearing: self.bearing(),
            bearing_text: self.bearing_text(),
            distance: self.total_distance,
            elapsed_time_ms: self.elapsed_time_ms,
            ascent: self.ascent(),
            ascent_rate: self.ascent_rate(),
            slope: self.slope(),
            major_ascent_count: self.major_ascent_count(),
            geoid_height: self.geoid_height(),
            altitude_calibration_delta: self.altitude_calibration_delta(),
            heart_rate,
            cadence,
            total_samples_seen: self.total_samples_seen,
            accepted_samples_seen: self.accepted_samples_seen,
        }
    }

    // ===== Configuration inputs =====

    pub fn set_elapsed_time_ms(&mut self, elapsed_time_ms: i64) {
        self.elapsed_time_ms = elapsed_time_ms;
    }

    pub fn set_distance(&mut self, distance: f64) {
        self.total_distance = distance;
    }

    pub fn set_ascent(&mut self, ascent: f64) {
        self.ascent.set_cumulative_ascent(ascent);
    }

    /// Changing the geoid height drops any altitude calibration and restarts
    /// altitude tracking in the new frame
    pub fn set_geoid_height(&mut self, geoid_height: f64) {
        if self.fusion.set_geoid_height(geoid_height) {
            self.reset_altitude_references();
        }
    }

    pub fn set_altitude_calibration_delta(&mut self, delta: f64) {
        if self.fusion.set_calibration_delta(delta) {
            self.reset_altitude_references();
        }
    }

    /// The effective altitude jumped: the next moving sample re-baselines the
    /// ascent references and rate window, and climb extremes start over
    fn reset_altitude_references(&mut self) {
        self.ascent.reset_primary();
        self.climbs.reset_extremes();
    }

    pub fn set_max_speed(&mut self, max_speed: f64) {
        self.max_speed = max_speed;
    }

    /// Also forgets the counter's local extremes
    pub fn set_major_ascent_count(&mut self, count: u32) {
        self.climbs.set_count(count);
    }

    /// When enabled, save-worthy samples produce a `SavePoint` for `take_save_point`
    pub fn set_save_enabled(&mut self, enabled: bool) {
        self.save_enabled = enabled;
        if !enabled {
            self.pending_save = None;
        }
    }
}

impl Default for StatisticsEngine {
    fn default() -> Self {
        Self::build(EngineConfig::default())
    }
}
