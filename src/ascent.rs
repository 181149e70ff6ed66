//! Verified ascent accumulation.
//!
//! Altitude changes are measured against a primary reference sample and only
//! counted once they are large compared to the altitude accuracy of both ends.
//! A secondary, older reference keeps the best recent accuracy so that a slow
//! climb made of many small, individually unconvincing steps is still detected.

use crate::config::AscentConfig;
use crate::fix::EnrichedSample;

/// Which test accepted an altitude change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptedBy {
    /// Index into the configured fixed levels
    Level(usize),
    Proportional,
    SecondaryReference,
}

/// What one accepted sample did to the detector
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AscentStep {
    /// Primary reference was empty; the sample became the new baseline
    pub baselined: bool,
    /// The falling-reference correction fired; the rate window should restart here
    pub rate_rebaselined: bool,
    /// The altitude change was accepted as real
    pub accepted: Option<AcceptedBy>,
    /// Ascent added to the cumulative total (0 unless a climb was accepted)
    pub delta_applied: f64,
}

#[derive(Debug, Clone)]
pub struct AscentDetector {
    config: AscentConfig,
    primary: Option<EnrichedSample>,
    secondary: Option<EnrichedSample>,
    cumulative_ascent: f64,
}

impl AscentDetector {
    pub fn new(config: AscentConfig) -> Self {
        Self {
            config,
            primary: None,
            secondary: None,
            cumulative_ascent: 0.0,
        }
    }

    /// Raw (unfloored) cumulative ascent, meters
    pub fn cumulative_ascent(&self) -> f64 {
        self.cumulative_ascent
    }

    pub fn set_cumulative_ascent(&mut self, ascent: f64) {
        self.cumulative_ascent = ascent;
    }

    pub fn primary_reference(&self) -> Option<&EnrichedSample> {
        self.primary.as_ref()
    }

    pub fn secondary_reference(&self) -> Option<&EnrichedSample> {
        self.secondary.as_ref()
    }

    /// Forget the primary reference; the next sample re-baselines tracking
    pub fn reset_primary(&mut self) {
        self.primary = None;
    }

    pub fn on_accepted_sample(&mut self, sample: &EnrichedSample) -> AscentStep {
        let mut step = AscentStep::default();

        let (mut delta_altitude, delta_accuracy) = match self.primary.as_ref() {
            Some(reference) => (
                sample.altitude - reference.altitude,
                sample.altitude_accuracy - reference.altitude_accuracy,
            ),
            None => {
                self.primary = Some(sample.clone());
                self.secondary = Some(sample.clone());
                step.baselined = true;
                return step;
            }
        };

        // falling altitude with much better accuracy: the reference was too high
        if delta_altitude < 0.0 && delta_accuracy <= -self.config.false_climb_accuracy_gain {
            log::debug!(
                "altitude fell {:.1} m with accuracy {:.1} m better, rebasing ascent reference",
                -delta_altitude,
                -delta_accuracy
            );
            self.primary = Some(sample.clone());
            step.rate_rebaselined = true;
            delta_altitude = 0.0;
        }

        if delta_altitude.abs() < self.config.flat_tolerance && delta_accuracy < 0.0 {
            log::trace!("flat section with better accuracy, rebasing ascent reference");
            self.primary = Some(sample.clone());
            delta_altitude = 0.0;
        }

        let Some(accepted_by) = self.test_change(sample, delta_altitude) else {
            return step;
        };
        step.accepted = Some(accepted_by);

        self.primary = Some(sample.clone());

        let replace_secondary = match self.secondary.as_ref() {
            None => true,
            Some(secondary) => {
                secondary.altitude_accuracy > sample.altitude_accuracy
                    || sample.time_ms().saturating_sub(secondary.time_ms())
                        > self.config.secondary_reference_max_age_ms
            }
        };
        if replace_secondary {
            self.secondary = Some(sample.clone());
        }

        if delta_altitude > 0.0 {
            self.cumulative_ascent += delta_altitude;
            step.delta_applied = delta_altitude;
        } else {
            // a confirmed descent invalidates the backup climb reference
            self.secondary = Some(sample.clone());
        }

        log::debug!(
            "altitude change {:+.1} m accepted by {:?}, ascent now {:.1} m",
            delta_altitude,
            accepted_by,
            self.cumulative_ascent
        );

        step
    }

    fn test_change(&self, sample: &EnrichedSample, delta_altitude: f64) -> Option<AcceptedBy> {
        let reference = self.primary.as_ref()?;
        let worst_accuracy = reference.altitude_accuracy.max(sample.altitude_accuracy);
        let change = delta_altitude.abs();

        if let Some(index) = self
            .config
            .levels
            .iter()
            .position(|level| change >= level.min_change && worst_accuracy <= level.max_accuracy)
        {
            return Some(AcceptedBy::Level(index));
        }

        if change >= self.config.proportional_factor * worst_accuracy {
            return Some(AcceptedBy::Proportional);
        }

        let secondary = self.secondary.as_ref()?;
        let worst_secondary = secondary.altitude_accuracy.max(sample.altitude_accuracy);
        let change_secondary = (sample.altitude - secondary.altitude).abs();
        if change_secondary >= self.config.proportional_factor * worst_secondary {
            return Some(AcceptedBy::SecondaryReference);
        }

        None
    }
}
