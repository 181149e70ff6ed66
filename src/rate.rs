use crate::config::RateConfig;
use crate::fix::EnrichedSample;

/// Why the rate window was restarted with zeroed values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowReset {
    /// Long, nearly level section
    FlatSection,
    /// Reference too old while good altitude data is available
    StaleWindow,
}

/// Ascent rate and slope over a sliding window anchored on a reference
/// sample. The window only closes once it spans `min_window_ms`.
#[derive(Debug, Clone)]
pub struct RateSlopeTracker {
    config: RateConfig,
    reference: Option<EnrichedSample>,
    ascent_rate: f64,
    slope: f64,
}

impl RateSlopeTracker {
    pub fn new(config: RateConfig) -> Self {
        Self {
            config,
            reference: None,
            ascent_rate: 0.0,
            slope: 0.0,
        }
    }

    /// m/s
    pub fn ascent_rate(&self) -> f64 {
        self.ascent_rate
    }

    /// Fraction (rise over run)
    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn reference(&self) -> Option<&EnrichedSample> {
        self.reference.as_ref()
    }

    /// Restart the window at `sample` without touching the reported values
    pub fn rebaseline(&mut self, sample: &EnrichedSample) {
        self.reference = Some(sample.clone());
    }

    /// Recompute rate and slope if the window is wide enough. Returns true
    /// when the values were updated.
    pub fn update(&mut self, sample: &EnrichedSample, total_distance: f64) -> bool {
        if self.reference.is_none() {
            self.reference = Some(sample.clone());
            return false;
        }
        let Some(reference) = self.reference.as_ref() else {
            return false;
        };

        let elapsed_ms = sample.time_ms().saturating_sub(reference.time_ms());
        if elapsed_ms < self.config.min_window_ms {
            log::trace!(
                "rate window {} ms < {} ms, keeping previous rate",
                elapsed_ms,
                self.config.min_window_ms
            );
            return false;
        }

        let delta_ascent = (sample.altitude - reference.altitude).floor();
        let delta_distance = total_distance - reference.distance_so_far;

        self.ascent_rate = if elapsed_ms > 0 {
            delta_ascent / (elapsed_ms as f64 / 1000.0)
        } else {
            0.0
        };
        self.slope = if delta_distance > 0.0 {
            delta_ascent / delta_distance
        } else {
            0.0
        };

        log::debug!(
            "altitude {:.1} -> {:.1} over {:.0} m: ascent rate {:.3} m/s, slope {:.1}%",
            reference.altitude,
            sample.altitude,
            delta_distance,
            self.ascent_rate,
            self.slope * 100.0
        );

        self.reference = Some(sample.clone());
        true
    }

    /// Zero the values and restart the window at `sample` when the section
    /// since the reference is flat, or the reference has gone stale.
    pub fn check_resets(&mut self, sample: &EnrichedSample) -> Option<WindowReset> {
        let reference = self.reference.as_ref()?;

        let reset = if self.is_flat_section(reference, sample) {
            WindowReset::FlatSection
        } else if sample.time_ms().saturating_sub(reference.time_ms()) > self.config.max_window_ms
            && sample.altitude_accuracy < self.config.stale_window_max_altitude_accuracy
        {
            WindowReset::StaleWindow
        } else {
            return None;
        };

        log::debug!("rate window reset ({:?})", reset);
        self.ascent_rate = 0.0;
        self.slope = 0.0;
        self.reference = Some(sample.clone());
        Some(reset)
    }

    fn is_flat_section(&self, reference: &EnrichedSample, sample: &EnrichedSample) -> bool {
        let delta_distance = sample.distance_so_far - reference.distance_so_far;
        let delta_altitude = sample.altitude - reference.altitude;

        delta_distance > self.config.flat_section_distance
            && delta_altitude.abs() < self.config.flat_section_max_slope * delta_distance
            // a poor current fix may still reveal a slope if we wait
            && sample.altitude_accuracy <= self.config.flat_section_max_altitude_accuracy
    }
}
