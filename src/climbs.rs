use crate::config::ClimbConfig;

/// Counts distinct major climbs (e.g. separate passes) with a local-extremum
/// hysteresis band, independently of the cumulative ascent.
#[derive(Debug, Clone)]
pub struct MajorAscentCounter {
    config: ClimbConfig,
    /// (local min, local max), None until the first qualifying sample
    extremes: Option<(f64, f64)>,
    ascent_in_progress: bool,
    descent_in_progress: bool,
    count: u32,
}

impl MajorAscentCounter {
    pub fn new(config: ClimbConfig) -> Self {
        Self {
            config,
            extremes: None,
            ascent_in_progress: false,
            descent_in_progress: false,
            count: 0,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_ascending(&self) -> bool {
        self.ascent_in_progress
    }

    pub fn is_descending(&self) -> bool {
        self.descent_in_progress
    }

    /// Override the count and forget the local extremes
    pub fn set_count(&mut self, count: u32) {
        self.count = count;
        self.reset_extremes();
    }

    /// Forget the local extremes; the next sample starts a new band
    pub fn reset_extremes(&mut self) {
        self.extremes = None;
    }

    /// Feed one sample. Returns true when a new major ascent started.
    pub fn update(&mut self, altitude: f64, accuracy: f64) -> bool {
        if accuracy >= self.config.max_accuracy {
            return false;
        }

        let (mut local_min, mut local_max) = match self.extremes {
            Some(extremes) => extremes,
            None => {
                self.ascent_in_progress = false;
                self.descent_in_progress = false;
                (altitude, altitude)
            }
        };
        local_min = local_min.min(altitude);
        local_max = local_max.max(altitude);

        let band = self.config.delta_altitude;
        let mut started = false;

        if !self.descent_in_progress && altitude <= local_max - band {
            log::info!("major ascent: descent started at {:.0} m", altitude);
            self.descent_in_progress = true;
            self.ascent_in_progress = false;
            local_min = altitude;
        }
        if !self.ascent_in_progress && altitude >= local_min + band {
            self.ascent_in_progress = true;
            self.descent_in_progress = false;
            local_max = altitude;
            self.count += 1;
            started = true;
            log::info!(
                "major ascent #{} started at {:.0} m",
                self.count,
                altitude
            );
        }

        self.extremes = Some((local_min, local_max));
        started
    }
}
