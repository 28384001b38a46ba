//! Ramp and scan-loop tunables.
//!
//! The hot-air and soak/ramp procedures historically repeated these numbers as
//! literals. They are named here once and every procedure takes them from a
//! `RampSettings`, which can override each one independently.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{VtError, VtResult};

/// Distance from the setpoint at which a ramping reading snaps onto it.
pub const SNAP_TOLERANCE: f64 = 1.0;

/// One-sided tolerance for the hot-air ramp-up/ramp-down stop conditions.
pub const SETTLE_TOLERANCE: f64 = 0.5;

/// Extra scans taken once a stop condition first holds.
pub const FINALIZE_SCANS: u32 = 5;

/// Iteration cap of a scanning ramp.
pub const DEFAULT_MAX_SCANS: u32 = 1000;

/// Ramp rate magnitude in degrees per second (about 12 degrees per minute).
pub const DEFAULT_RAMP_RATE: f64 = 0.2;

/// Pause between temperature polls while soaking.
pub const SOAK_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pause between room-temperature batch scans.
pub const BATCH_PAUSE: Duration = Duration::from_secs(2);

/// Tunables shared by all ramp procedures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampSettings {
    /// Ramp rate magnitude (degrees/s)
    #[serde(default = "default_ramp_rate")]
    pub ramp_rate: f64,

    /// Iteration cap of the scanning phase
    #[serde(default = "default_max_scans")]
    pub max_scans: u32,

    /// Scans appended once the target is reached
    #[serde(default = "default_finalize_count")]
    pub finalize_count: u32,

    /// Soak poll interval (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,

    /// Simulated reading snaps to the setpoint inside this distance
    #[serde(default = "default_snap_tolerance")]
    pub snap_tolerance: f64,

    /// Hot-air ramps stop inside this distance of the target
    #[serde(default = "default_settle_tolerance")]
    pub settle_tolerance: f64,
}

fn default_ramp_rate() -> f64 {
    DEFAULT_RAMP_RATE
}
fn default_max_scans() -> u32 {
    DEFAULT_MAX_SCANS
}
fn default_finalize_count() -> u32 {
    FINALIZE_SCANS
}
fn default_poll_interval() -> f64 {
    SOAK_POLL_INTERVAL.as_secs_f64()
}
fn default_snap_tolerance() -> f64 {
    SNAP_TOLERANCE
}
fn default_settle_tolerance() -> f64 {
    SETTLE_TOLERANCE
}

impl Default for RampSettings {
    fn default() -> Self {
        Self {
            ramp_rate: default_ramp_rate(),
            max_scans: default_max_scans(),
            finalize_count: default_finalize_count(),
            poll_interval_secs: default_poll_interval(),
            snap_tolerance: default_snap_tolerance(),
            settle_tolerance: default_settle_tolerance(),
        }
    }
}

/// Convert a configured number of seconds, rejecting values a `Duration`
/// cannot hold (negative, NaN, infinite or past `u64::MAX` seconds).
pub fn secs_to_duration(name: &str, secs: f64) -> VtResult<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| VtError::Configuration(format!("Invalid {} {}: {}", name, secs, e)))
}

impl RampSettings {
    /// Soak poll interval. Out-of-range values fall back to `SOAK_POLL_INTERVAL`.
    pub fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.poll_interval_secs).unwrap_or(SOAK_POLL_INTERVAL)
    }

    /// Check values that would make a procedure hang or misbehave.
    pub fn validate(&self) -> VtResult<()> {
        if !self.ramp_rate.is_finite() {
            return Err(VtError::Configuration(format!(
                "Invalid ramp_rate {}",
                self.ramp_rate
            )));
        }
        secs_to_duration("poll_interval_secs", self.poll_interval_secs)?;
        for (name, value) in [
            ("snap_tolerance", self.snap_tolerance),
            ("settle_tolerance", self.settle_tolerance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(VtError::Configuration(format!(
                    "Invalid {} {}. Must be >= 0",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let settings = RampSettings::default();
        assert_eq!(settings.ramp_rate, 0.2);
        assert_eq!(settings.max_scans, 1000);
        assert_eq!(settings.finalize_count, 5);
        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
        assert_eq!(settings.snap_tolerance, 1.0);
        assert_eq!(settings.settle_tolerance, 0.5);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_negative_tolerance() {
        let settings = RampSettings {
            settle_tolerance: -0.5,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(VtError::Configuration(_))));
    }

    #[test]
    fn rejects_poll_interval_beyond_duration_range() {
        for secs in [1e30, f64::INFINITY, -1.0, f64::NAN] {
            let settings = RampSettings {
                poll_interval_secs: secs,
                ..Default::default()
            };
            assert!(
                matches!(settings.validate(), Err(VtError::Configuration(_))),
                "{}",
                secs
            );
            assert_eq!(settings.poll_interval(), SOAK_POLL_INTERVAL);
        }
    }

    #[test]
    fn secs_to_duration_accepts_fractions() {
        assert_eq!(
            secs_to_duration("pause", 2.5).unwrap(),
            Duration::from_millis(2500)
        );
        assert_eq!(secs_to_duration("pause", 0.0).unwrap(), Duration::ZERO);
    }
}
