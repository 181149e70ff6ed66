use crate::config::GateConfig;

/// Result of running one fix through the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub accept: bool,
    pub threshold_changed: bool,
}

/// Adaptive horizontal-accuracy threshold.
///
/// Widens by `growth_factor` after a run of bad fixes and tightens again as
/// soon as a fix is better than `threshold / growth_factor`, always staying
/// within `[initial_threshold, max_threshold]`.
#[derive(Debug, Clone)]
pub struct AccuracyGate {
    config: GateConfig,
    threshold: f64,
    consecutive_bad: u32,
}

impl AccuracyGate {
    pub fn new(config: GateConfig) -> Self {
        let threshold = config.initial_threshold;
        Self {
            config,
            threshold,
            consecutive_bad: 0,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn consecutive_bad(&self) -> u32 {
        self.consecutive_bad
    }

    pub fn evaluate(&mut self, accuracy: f64) -> GateDecision {
        let mut threshold_changed = false;

        if accuracy > self.threshold {
            self.consecutive_bad += 1;
            if self.consecutive_bad > self.config.bad_accuracy_run {
                let previous = self.threshold;
                self.threshold = (self.config.growth_factor * self.threshold)
                    .floor()
                    .min(self.config.max_threshold);
                if self.threshold != previous {
                    self.consecutive_bad = 0;
                    threshold_changed = true;
                    log::info!(
                        "accuracy too often above threshold, raising it {} -> {} m",
                        previous,
                        self.threshold
                    );
                }
            }
        }

        let accept = accuracy <= self.threshold;

        if accept && accuracy <= self.threshold / self.config.growth_factor {
            let previous = self.threshold;
            self.threshold = (self.threshold / self.config.growth_factor)
                .floor()
                .max(self.config.initial_threshold);
            if self.threshold != previous {
                threshold_changed = true;
                log::info!(
                    "accuracy back below threshold, lowering it {} -> {} m",
                    previous,
                    self.threshold
                );
            }
        }

        GateDecision {
            accept,
            threshold_changed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AccuracyGate {
        AccuracyGate::new(GateConfig::default())
    }

    #[test]
    fn test_accepts_within_threshold() {
        let mut gate = gate();
        let decision = gate.evaluate(20.0);
        assert!(decision.accept);
        assert!(!decision.threshold_changed);
        assert!(!gate.evaluate(20.5).accept);
    }

    #[test]
    fn test_widens_after_bad_run() {
        let mut gate = gate();
        for _ in 0..10 {
            let decision = gate.evaluate(40.0);
            assert!(!decision.accept);
            assert!(!decision.threshold_changed);
        }
        // 11th bad fix raises 20 -> 30, still not good enough for 40 m
        let decision = gate.evaluate(40.0);
        assert!(decision.threshold_changed);
        assert!(!decision.accept);
        assert_eq!(gate.threshold(), 30.0);
        assert_eq!(gate.consecutive_bad(), 0);
    }

    #[test]
    fn test_widening_capped_at_max() {
        let mut gate = gate();
        for _ in 0..200 {
            gate.evaluate(100.0);
        }
        assert_eq!(gate.threshold(), 50.0);
        // counter keeps growing once the cap is reached
        assert!(gate.consecutive_bad() > 10);
    }

    #[test]
    fn test_tightens_on_good_fix() {
        let mut gate = gate();
        for _ in 0..11 {
            gate.evaluate(40.0);
        }
        assert_eq!(gate.threshold(), 30.0);
        let decision = gate.evaluate(10.0);
        assert!(decision.accept);
        assert!(decision.threshold_changed);
        // floor(30 / 1.5) = 20, bounded below by the initial threshold
        assert_eq!(gate.threshold(), 20.0);
        gate.evaluate(1.0);
        assert_eq!(gate.threshold(), 20.0);
    }

    #[test]
    fn test_threshold_stays_in_bounds() {
        let mut gate = gate();
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for _ in 0..5000 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let accuracy = (seed % 12_000) as f64 / 100.0;
            gate.evaluate(accuracy);
            assert!(gate.threshold() >= 20.0 && gate.threshold() <= 50.0);
        }
    }
}
