use crate::config::EngineConfig;
use crate::engine::{SampleOutcome, StatisticsEngine};
use crate::error::{LResult, LocationError};
use crate::fix::Fix;
use crate::snapshot::{SavePoint, StatsSnapshot};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Engine created but not recording
    Idle,
    /// Fixes are fed to the engine
    Recording,
    /// Not recording, statistics kept
    Paused,
}

/// Session metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub start_time: String,
    pub state: SessionState,
    pub fix_count: u32,
    pub save_point_count: u32,
}

/// Shareable handle over one statistics engine.
///
/// Clones share the same engine; every call takes the engine lock, so
/// fixes from several producer threads are processed one at a time.
#[derive(Clone)]
pub struct TrackingSession {
    metadata: Arc<Mutex<SessionMetadata>>,
    engine: Arc<Mutex<StatisticsEngine>>,
    save_queue: Arc<Mutex<VecDeque<SavePoint>>>,
}

impl TrackingSession {
    /// Create new session in Idle state with default engine settings
    pub fn new() -> Self {
        Self::from_engine(StatisticsEngine::default())
    }

    /// Create new session in Idle state; fails on an invalid configuration
    pub fn with_config(config: EngineConfig) -> LResult<Self> {
        Ok(Self::from_engine(StatisticsEngine::new(config)?))
    }

    fn from_engine(mut engine: StatisticsEngine) -> Self {
        engine.set_save_enabled(true);

        let metadata = SessionMetadata {
            session_id: format!("session_{}", Utc::now().timestamp_millis()),
            start_time: Utc::now().to_rfc3339(),
            state: SessionState::Idle,
            fix_count: 0,
            save_point_count: 0,
        };

        TrackingSession {
            metadata: Arc::new(Mutex::new(metadata)),
            engine: Arc::new(Mutex::new(engine)),
            save_queue: Arc::new(Mutex::new(VecDeque::with_capacity(64))),
        }
    }

    fn lock_metadata(&self) -> LResult<MutexGuard<'_, SessionMetadata>> {
        self.metadata
            .lock()
            .map_err(|_| LocationError::Internal("Failed to acquire metadata lock".to_string()))
    }

    fn lock_engine(&self) -> LResult<MutexGuard<'_, StatisticsEngine>> {
        self.engine
            .lock()
            .map_err(|_| LocationError::Internal("Failed to acquire engine lock".to_string()))
    }

    fn lock_save_queue(&self) -> LResult<MutexGuard<'_, VecDeque<SavePoint>>> {
        self.save_queue
            .lock()
            .map_err(|_| LocationError::Internal("Failed to acquire save queue lock".to_string()))
    }

    /// Transition to Recording state (Idle or Paused → Recording)
    pub fn start_recording(&self) -> LResult<()> {
        let mut meta = self.lock_metadata()?;

        match meta.state {
            SessionState::Idle | SessionState::Paused => {
                log::info!("{}: recording", meta.session_id);
                meta.state = SessionState::Recording;
                Ok(())
            }
            SessionState::Recording => Err(LocationError::AlreadyRunning),
        }
    }

    /// Transition to Paused state (Recording → Paused)
    pub fn pause_recording(&self) -> LResult<()> {
        let mut meta = self.lock_metadata()?;

        match meta.state {
            SessionState::Recording => {
                log::info!("{}: paused", meta.session_id);
                meta.state = SessionState::Paused;
                Ok(())
            }
            SessionState::Paused => Err(LocationError::InvalidState("Already paused".to_string())),
            SessionState::Idle => Err(LocationError::InvalidState("Not recording".to_string())),
        }
    }

    /// Transition to Idle state (ends session)
    pub fn stop_recording(&self) -> LResult<()> {
        let mut meta = self.lock_metadata()?;

        match meta.state {
            SessionState::Recording | SessionState::Paused => {
                log::info!(
                    "{}: stopped after {} fixes",
                    meta.session_id,
                    meta.fix_count
                );
                meta.state = SessionState::Idle;
                Ok(())
            }
            SessionState::Idle => Err(LocationError::NotRunning),
        }
    }

    /// Get current state
    pub fn get_state(&self) -> LResult<SessionState> {
        Ok(self.lock_metadata()?.state)
    }

    /// Check if currently recording
    pub fn is_recording(&self) -> LResult<bool> {
        Ok(self.get_state()? == SessionState::Recording)
    }

    /// Feed one fix. Returns None when the session is not recording.
    ///
    /// The metadata lock is held while the engine runs, so no fix is
    /// processed once `pause_recording`/`stop_recording` has returned.
    /// Lock order is metadata, engine, save queue.
    pub fn push_fix(&self, fix: Fix) -> LResult<Option<SampleOutcome>> {
        let mut meta = self.lock_metadata()?;
        if meta.state != SessionState::Recording {
            return Ok(None);
        }

        let (outcome, save_point) = {
            let mut engine = self.lock_engine()?;
            let outcome = engine.process(fix);
            (outcome, engine.take_save_point())
        };

        meta.fix_count += 1;
        if let Some(point) = save_point {
            self.lock_save_queue()?.push_back(point);
            meta.save_point_count += 1;
        }

        Ok(Some(outcome))
    }

    /// Feed a secondary altitude reading; ignored unless recording
    pub fn push_secondary_altitude(&self, altitude: f64) -> LResult<()> {
        let meta = self.lock_metadata()?;
        if meta.state != SessionState::Recording {
            return Ok(());
        }
        self.lock_engine()?.record_secondary_altitude(altitude);
        Ok(())
    }

    /// Feed a sensor speed; ignored unless recording
    pub fn push_external_speed(&self, speed: f64, time_ms: i64) -> LResult<()> {
        let meta = self.lock_metadata()?;
        if meta.state != SessionState::Recording {
            return Ok(());
        }
        self.lock_engine()?.record_external_speed(speed, time_ms);
        Ok(())
    }

    /// Get read-model snapshot
    pub fn snapshot(&self) -> LResult<StatsSnapshot> {
        Ok(self.lock_engine()?.snapshot())
    }

    /// Run `f` with exclusive access to the engine (restoring totals,
    /// reading individual values, ...)
    pub fn with_engine<T>(&self, f: impl FnOnce(&mut StatisticsEngine) -> T) -> LResult<T> {
        let mut engine = self.lock_engine()?;
        Ok(f(&mut engine))
    }

    /// Get metadata snapshot
    pub fn get_metadata(&self) -> LResult<SessionMetadata> {
        Ok(self.lock_metadata()?.clone())
    }

    /// Take every queued save point (called by the persistence side)
    pub fn drain_save_points(&self) -> LResult<Vec<SavePoint>> {
        Ok(self.lock_save_queue()?.drain(..).collect())
    }
}

impl Default for TrackingSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn fix(time_s: i64, meters: f64) -> Fix {
        Fix::new(time_s * 1000, 45.0 + meters / 111_132.0, 6.0, 100.0, 5.0)
    }

    #[test]
    fn test_session_state_transitions() {
        let session = TrackingSession::new();

        assert_eq!(session.get_state().unwrap(), SessionState::Idle);
        assert!(!session.is_recording().unwrap());

        // Idle → Recording
        session.start_recording().unwrap();
        assert_eq!(session.get_state().unwrap(), SessionState::Recording);
        assert!(session.is_recording().unwrap());

        // Recording → Paused
        session.pause_recording().unwrap();
        assert_eq!(session.get_state().unwrap(), SessionState::Paused);
        assert!(!session.is_recording().unwrap());

        // Paused → Recording
        session.start_recording().unwrap();
        assert_eq!(session.get_state().unwrap(), SessionState::Recording);

        // Recording → Idle
        session.stop_recording().unwrap();
        assert_eq!(session.get_state().unwrap(), SessionState::Idle);
    }

    #[test]
    fn test_invalid_state_transitions() {
        let session = TrackingSession::new();

        assert!(session.pause_recording().is_err());
        assert_eq!(session.stop_recording(), Err(LocationError::NotRunning));

        session.start_recording().unwrap();
        assert_eq!(session.start_recording(), Err(LocationError::AlreadyRunning));

        assert!(session.pause_recording().is_ok());
        assert!(session.pause_recording().is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.gate.initial_threshold = 0.0;
        assert!(TrackingSession::with_config(config).is_err());
    }

    #[test]
    fn test_fixes_only_fed_while_recording() {
        let session = TrackingSession::new();
        assert_eq!(session.push_fix(fix(0, 0.0)).unwrap(), None);

        session.start_recording().unwrap();
        assert_eq!(
            session.push_fix(fix(0, 0.0)).unwrap(),
            Some(SampleOutcome::AcceptedSaveWorthy)
        );
        session.push_fix(fix(10, 30.0)).unwrap();

        session.pause_recording().unwrap();
        assert_eq!(session.push_fix(fix(20, 60.0)).unwrap(), None);
        session.push_external_speed(9.0, 20_000).unwrap();

        let meta = session.get_metadata().unwrap();
        assert_eq!(meta.fix_count, 2);
        assert_eq!(meta.save_point_count, 2);

        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.time_ms, 10_000);
        assert_eq!(snapshot.speed, 0.0);

        let points = session.drain_save_points().unwrap();
        assert_eq!(points.len(), 2);
        assert!(session.drain_save_points().unwrap().is_empty());
    }

    #[test]
    fn test_with_engine_restores_totals() {
        let session = TrackingSession::new();
        session
            .with_engine(|engine| {
                engine.set_distance(5_000.0);
                engine.set_ascent(250.0);
            })
            .unwrap();
        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.distance, 5_000.0);
        assert_eq!(snapshot.ascent, 250.0);
    }

    #[test]
    fn test_concurrent_producers() {
        let session = TrackingSession::new();
        session.start_recording().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|producer| {
                let session = session.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        session
                            .push_secondary_altitude(100.0 + producer as f64)
                            .unwrap();
                        session
                            .push_fix(fix(i * 4 + producer, (i * 4 + producer) as f64 * 5.0))
                            .unwrap();
                        session.snapshot().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let meta = session.get_metadata().unwrap();
        assert_eq!(meta.fix_count, 200);
        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.total_samples_seen, 200);
        assert!(snapshot.accepted_samples_seen >= 1);
        assert!(snapshot.distance >= 0.0);
    }

    #[test]
    fn test_no_fix_processed_after_pause_returns() {
        let session = TrackingSession::new();
        session.start_recording().unwrap();

        let producer = {
            let session = session.clone();
            thread::spawn(move || {
                let mut i = 0;
                while session.push_fix(fix(i, i as f64 * 5.0)).unwrap().is_some() {
                    i += 1;
                }
            })
        };
        while session.get_metadata().unwrap().fix_count < 20 {
            thread::yield_now();
        }
        session.pause_recording().unwrap();
        let at_pause = session.get_metadata().unwrap().fix_count;
        producer.join().unwrap();

        assert_eq!(session.get_metadata().unwrap().fix_count, at_pause);
        let seen = session.snapshot().unwrap().total_samples_seen;
        assert_eq!(seen, at_pause as u64);
    }
}
