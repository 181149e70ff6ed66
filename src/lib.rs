// Advanced location statistics
// Turns a stream of GPS fixes (plus optional barometric altitude and sensor
// speed) into distance, speed, ascent, ascent rate, slope and climb counts.

pub mod ascent;
pub mod climbs;
pub mod config;
pub mod engine;
pub mod error;
pub mod fix;
pub mod fusion;
pub mod gate;
pub mod rate;
pub mod session;
pub mod snapshot;

pub use config::EngineConfig;
pub use engine::{SampleOutcome, StatisticsEngine};
pub use error::{LResult, LocationError};
pub use fix::{CompassPoint, EnrichedSample, Fix};
pub use session::{SessionMetadata, SessionState, TrackingSession};
pub use snapshot::{SavePoint, StatsSnapshot};
