//! Linear temperature ramp model.
//!
//! `RampState` is the locally tracked state of a ramping temperature
//! controller: the last reading, the setpoint, the signed ramp rate and the
//! time the current ramp began. It performs no I/O. Device adapters wrap it and
//! decide where readings come from.
//!
//! Advancing the model is an explicit mutation (`advance`), reading it is not
//! (`read`). A simulated controller calls `advance` once per temperature poll,
//! which reproduces the behaviour of a controller whose reading moves every
//! time it is asked.
//!
//! The model is the same simple approximation the beamline scripts used: each
//! advance adds `ramp_rate * (now - ramp_start)` to the stored reading, and the
//! reading snaps exactly onto the setpoint once it is within `snap_tolerance`.

use std::time::Duration;

use serde::Serialize;

use crate::error::{VtError, VtResult};
use crate::experiment::limits::SNAP_TOLERANCE;

/// Ramp state of one temperature controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RampState {
    current_temperature: f64,
    set_point: f64,
    ramp_rate: f64,
    ramp_start_time: Option<Duration>,
    snap_tolerance: f64,
}

impl RampState {
    /// Idle controller sitting at `initial_temperature`.
    pub fn new(initial_temperature: f64) -> Self {
        Self {
            current_temperature: initial_temperature,
            set_point: initial_temperature,
            ramp_rate: 0.0,
            ramp_start_time: None,
            snap_tolerance: SNAP_TOLERANCE,
        }
    }

    /// Override the distance from the setpoint at which a ramp completes.
    pub fn with_snap_tolerance(mut self, tolerance: f64) -> Self {
        self.snap_tolerance = tolerance;
        self
    }

    /// Last stored reading. Never mutates.
    pub fn read(&self) -> f64 {
        self.current_temperature
    }

    pub fn set_point(&self) -> f64 {
        self.set_point
    }

    pub fn ramp_rate(&self) -> f64 {
        self.ramp_rate
    }

    pub fn ramp_start_time(&self) -> Option<Duration> {
        self.ramp_start_time
    }

    pub fn snap_tolerance(&self) -> f64 {
        self.snap_tolerance
    }

    /// Whether a ramp is in progress.
    pub fn is_ramping(&self) -> bool {
        self.ramp_start_time.is_some()
    }

    pub(crate) fn update_set_point(&mut self, value: f64) {
        self.set_point = value;
    }

    pub(crate) fn update_ramp_rate(&mut self, value: f64) {
        self.ramp_rate = value;
    }

    /// Mark the ramp as started at `now`.
    ///
    /// A ramp cannot start without a rate. The state is left untouched on error.
    pub fn begin(&mut self, now: Duration) -> VtResult<()> {
        if self.ramp_rate == 0.0 {
            return Err(VtError::Configuration("No ramp rate set".to_string()));
        }
        self.ramp_start_time = Some(now);
        Ok(())
    }

    /// Estimated minutes until the setpoint is reached at the current rate.
    pub fn eta_minutes(&self) -> Option<f64> {
        if self.ramp_rate == 0.0 {
            return None;
        }
        Some(((self.set_point - self.current_temperature) / (self.ramp_rate * 60.0)).abs())
    }

    /// Advance the simulated reading to time `now` and return it.
    ///
    /// Without an active ramp the reading is returned unchanged.
    pub fn advance(&mut self, now: Duration) -> f64 {
        let Some(started) = self.ramp_start_time else {
            return self.current_temperature;
        };

        if (self.current_temperature - self.set_point).abs() < self.snap_tolerance {
            self.settle();
        } else {
            let elapsed = now.saturating_sub(started).as_secs_f64();
            self.current_temperature += self.ramp_rate * elapsed;
        }
        self.current_temperature
    }

    /// Store a reading taken from real hardware.
    ///
    /// The ramp is considered complete once the reading is within tolerance of
    /// the setpoint. The reading itself is kept as measured.
    pub fn observe(&mut self, reading: f64) {
        self.current_temperature = reading;
        if self.is_ramping() && (reading - self.set_point).abs() < self.snap_tolerance {
            self.ramp_start_time = None;
        }
    }

    fn settle(&mut self) {
        self.current_temperature = self.set_point;
        self.ramp_start_time = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn idle_reads_are_stable() {
        let mut state = RampState::new(21.0);
        assert_eq!(state.advance(secs(100)), 21.0);
        assert_eq!(state.read(), 21.0);
        assert!(!state.is_ramping());
    }

    #[test]
    fn begin_requires_nonzero_rate() {
        let mut state = RampState::new(21.0);
        state.update_set_point(100.0);
        let err = state.begin(secs(0)).unwrap_err();
        assert!(matches!(err, VtError::Configuration(_)));
        assert!(!state.is_ramping());
    }

    #[test]
    fn advance_accumulates_from_ramp_start() {
        let mut state = RampState::new(30.0);
        state.update_set_point(600.0);
        state.update_ramp_rate(0.2);
        state.begin(secs(10)).unwrap();

        // 5 s since start: +1.0
        assert!((state.advance(secs(15)) - 31.0).abs() < 1e-9);
        // 10 s since start, added to the stored reading: +2.0
        assert!((state.advance(secs(20)) - 33.0).abs() < 1e-9);
        assert!(state.is_ramping());
    }

    #[test]
    fn snaps_to_set_point_within_tolerance() {
        let mut state = RampState::new(599.5);
        state.update_set_point(600.0);
        state.update_ramp_rate(0.2);
        state.begin(secs(0)).unwrap();

        assert_eq!(state.advance(secs(3)), 600.0);
        assert!(!state.is_ramping());
        assert_eq!(state.ramp_start_time(), None);

        // No new start(): further reads are unchanged.
        assert_eq!(state.advance(secs(60)), 600.0);
        assert_eq!(state.read(), 600.0);
    }

    #[test]
    fn negative_rate_cools() {
        let mut state = RampState::new(650.0);
        state.update_set_point(30.0);
        state.update_ramp_rate(-0.2);
        state.begin(secs(0)).unwrap();
        assert!(state.advance(secs(10)) < 650.0);
    }

    #[test]
    fn custom_tolerance_controls_snapping() {
        let mut state = RampState::new(95.0).with_snap_tolerance(10.0);
        state.update_set_point(100.0);
        state.update_ramp_rate(1.0);
        state.begin(secs(0)).unwrap();
        assert_eq!(state.advance(secs(1)), 100.0);
    }

    #[test]
    fn observe_completes_ramp_near_set_point() {
        let mut state = RampState::new(20.0);
        state.update_set_point(40.0);
        state.update_ramp_rate(0.2);
        state.begin(secs(0)).unwrap();

        state.observe(35.0);
        assert!(state.is_ramping());
        state.observe(39.4);
        assert!(!state.is_ramping());
        assert_eq!(state.read(), 39.4);
    }

    #[test]
    fn eta_uses_absolute_distance() {
        let mut state = RampState::new(600.0);
        state.update_set_point(30.0);
        state.update_ramp_rate(-0.2);
        let eta = state.eta_minutes().unwrap();
        assert!((eta - 47.5).abs() < 1e-9);
    }
}
