//! Tunable thresholds for every stage of the statistics engine.
//!
//! Defaults reproduce the complete library variant. `EngineConfig::legacy()`
//! carries the constants of the older, smaller variant.

use crate::error::{LResult, LocationError};
use serde::{Deserialize, Serialize};

/// Adaptive horizontal-accuracy gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Starting (and lowest) acceptance threshold, meters
    pub initial_threshold: f64,
    /// Highest value the threshold may grow to, meters
    pub max_threshold: f64,
    /// Consecutive bad fixes tolerated before widening the threshold
    pub bad_accuracy_run: u32,
    /// Multiplier used to widen (and divisor used to tighten) the threshold
    pub growth_factor: f64,
    /// Fixes must be strictly better than this to update max speed, meters
    pub max_speed_accuracy: f64,
    /// Minimum spacing between fixes, ms
    pub debounce_ms: i64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            initial_threshold: 20.0,
            max_threshold: 50.0,
            bad_accuracy_run: 10,
            growth_factor: 1.5,
            max_speed_accuracy: 12.0,
            debounce_ms: 500,
        }
    }
}

/// Secondary (barometric) altitude fusion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Ring buffer size for median smoothing
    pub buffer_capacity: usize,
    /// Recalibrate when GPS accuracy improves by more than this, meters
    pub recalibration_accuracy_gain: f64,
    /// Recalibrate after this long if accuracy is good enough, ms
    pub recalibration_interval_ms: i64,
    /// Accuracy required for the periodic recalibration, meters
    pub recalibration_max_accuracy: f64,
    /// Altitude accuracy reported while calibration is active, meters
    pub calibrated_altitude_accuracy: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 5,
            recalibration_accuracy_gain: 0.5,
            recalibration_interval_ms: 20 * 60 * 1000,
            recalibration_max_accuracy: 5.0,
            calibrated_altitude_accuracy: 1.0,
        }
    }
}

/// One fixed acceptance level: a change of at least `min_change` is real
/// when the worst altitude accuracy is at most `max_accuracy`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AscentLevel {
    pub min_change: f64,
    pub max_accuracy: f64,
}

impl AscentLevel {
    pub const fn new(min_change: f64, max_accuracy: f64) -> Self {
        Self {
            min_change,
            max_accuracy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AscentConfig {
    /// Local average speed needed before any statistic moves, m/s
    pub min_speed_for_stats: f64,
    /// Evaluated in order, first match wins
    pub levels: Vec<AscentLevel>,
    /// Fallback: accept when |delta| >= factor * worst accuracy
    pub proportional_factor: f64,
    /// Altitude accuracy improvement that marks a falling reference as stale, meters
    pub false_climb_accuracy_gain: f64,
    /// Below this |delta| the section counts as flat, meters
    pub flat_tolerance: f64,
    /// Backup reference is replaced once older than this, ms
    pub secondary_reference_max_age_ms: i64,
}

impl Default for AscentConfig {
    fn default() -> Self {
        Self {
            min_speed_for_stats: 0.3,
            levels: vec![
                AscentLevel::new(3.0, 1.0),
                AscentLevel::new(10.0, 3.0),
                AscentLevel::new(20.0, 6.0),
                AscentLevel::new(50.0, 12.0),
            ],
            proportional_factor: 4.0,
            false_climb_accuracy_gain: 3.0,
            flat_tolerance: 0.5,
            secondary_reference_max_age_ms: 10 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    pub min_window_ms: i64,
    pub max_window_ms: i64,
    pub flat_section_distance: f64,
    /// Average slope (fraction) under which a long section is flat
    pub flat_section_max_slope: f64,
    pub flat_section_max_altitude_accuracy: f64,
    pub stale_window_max_altitude_accuracy: f64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            min_window_ms: 60 * 1000,
            max_window_ms: 3 * 60 * 1000,
            flat_section_distance: 500.0,
            flat_section_max_slope: 0.01,
            flat_section_max_altitude_accuracy: 5.0,
            stale_window_max_altitude_accuracy: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimbConfig {
    pub max_accuracy: f64,
    /// Hysteresis band, meters
    pub delta_altitude: f64,
}

impl Default for ClimbConfig {
    fn default() -> Self {
        Self {
            max_accuracy: 7.0,
            delta_altitude: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    pub min_interval_ms: i64,
    pub min_distance: f64,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 5 * 60 * 1000,
            min_distance: 20.0,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub gate: GateConfig,
    pub fusion: FusionConfig,
    pub ascent: AscentConfig,
    pub rate: RateConfig,
    pub climbs: ClimbConfig,
    pub save: SaveConfig,
    /// A sensor speed older than this (relative to the last fix) is ignored, ms
    pub external_speed_max_age_ms: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            fusion: FusionConfig::default(),
            ascent: AscentConfig::default(),
            rate: RateConfig::default(),
            climbs: ClimbConfig::default(),
            save: SaveConfig::default(),
            external_speed_max_age_ms: 10 * 1000,
        }
    }
}

impl EngineConfig {
    /// Constants of the older engine variant
    pub fn legacy() -> Self {
        let mut config = Self::default();
        config.gate.initial_threshold = 10.0;
        config.ascent.levels = vec![
            AscentLevel::new(10.0, 4.0),
            AscentLevel::new(20.0, 7.0),
            AscentLevel::new(50.0, 12.0),
        ];
        config.rate.min_window_ms = 120 * 1000;
        config.save.min_interval_ms = 3000;
        config
    }

    /// Parse a JSON document (missing fields take their defaults) and validate it
    pub fn from_json_str(json: &str) -> LResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| LocationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LResult<()> {
        let gate = &self.gate;
        positive("gate.initial_threshold", gate.initial_threshold)?;
        positive("gate.max_threshold", gate.max_threshold)?;
        if gate.initial_threshold > gate.max_threshold {
            return Err(LocationError::InvalidConfig(format!(
                "gate.initial_threshold ({}) exceeds gate.max_threshold ({})",
                gate.initial_threshold, gate.max_threshold
            )));
        }
        if !gate.growth_factor.is_finite() || gate.growth_factor <= 1.0 {
            return Err(LocationError::InvalidConfig(
                "gate.growth_factor must be greater than 1".to_string(),
            ));
        }
        positive("gate.max_speed_accuracy", gate.max_speed_accuracy)?;
        non_negative_ms("gate.debounce_ms", gate.debounce_ms)?;

        if self.fusion.buffer_capacity == 0 {
            return Err(LocationError::InvalidConfig(
                "fusion.buffer_capacity must be at least 1".to_string(),
            ));
        }
        non_negative_ms(
            "fusion.recalibration_interval_ms",
            self.fusion.recalibration_interval_ms,
        )?;
        positive(
            "fusion.recalibration_max_accuracy",
            self.fusion.recalibration_max_accuracy,
        )?;
        positive(
            "fusion.calibrated_altitude_accuracy",
            self.fusion.calibrated_altitude_accuracy,
        )?;

        for (i, level) in self.ascent.levels.iter().enumerate() {
            positive(&format!("ascent.levels[{i}].min_change"), level.min_change)?;
            positive(&format!("ascent.levels[{i}].max_accuracy"), level.max_accuracy)?;
        }
        positive("ascent.proportional_factor", self.ascent.proportional_factor)?;
        non_negative_ms(
            "ascent.secondary_reference_max_age_ms",
            self.ascent.secondary_reference_max_age_ms,
        )?;

        non_negative_ms("rate.min_window_ms", self.rate.min_window_ms)?;
        if self.rate.min_window_ms > self.rate.max_window_ms {
            return Err(LocationError::InvalidConfig(format!(
                "rate.min_window_ms ({}) exceeds rate.max_window_ms ({})",
                self.rate.min_window_ms, self.rate.max_window_ms
            )));
        }
        positive("rate.flat_section_distance", self.rate.flat_section_distance)?;

        positive("climbs.delta_altitude", self.climbs.delta_altitude)?;
        non_negative_ms("save.min_interval_ms", self.save.min_interval_ms)?;
        non_negative_ms("external_speed_max_age_ms", self.external_speed_max_age_ms)?;

        Ok(())
    }
}

fn positive(name: &str, value: f64) -> LResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(LocationError::InvalidConfig(format!(
            "{name} must be a positive number, got {value}"
        )))
    }
}

fn non_negative_ms(name: &str, value: i64) -> LResult<()> {
    if value >= 0 {
        Ok(())
    } else {
        Err(LocationError::InvalidConfig(format!(
            "{name} must not be negative, got {value}"
        )))
    }
}
