//! Hot air blower ramps without a soak phase.
//!
//! A lighter alternative to the two-phase controller for when the sample is
//! already at its starting temperature: set the rate and the new setpoint,
//! then scan until the reading is inside a one-sided tolerance of the target
//! (`current > target - tol` going up, `current < target + tol` going down)
//! and finish with the usual finalization burst.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::VtResult;
use crate::experiment::limits::RampSettings;
use crate::experiment::scan_loop::{BoundedScanLoop, LoopOutcome, ScanContext};
use crate::hardware::capabilities::TemperatureController;

/// Ramp direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotAirDirection {
    Up,
    Down,
}

/// One hot-air ramp to `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct HotAirRamp {
    direction: HotAirDirection,
    target: f64,
    ramp_rate: f64,
    tolerance: f64,
    max_scans: u32,
    finalize_count: u32,
}

impl HotAirRamp {
    /// Ramp up to `target` with default settings.
    pub fn up(target: f64) -> Self {
        Self::new(HotAirDirection::Up, target, &RampSettings::default())
    }

    /// Ramp down to `target` with default settings.
    pub fn down(target: f64) -> Self {
        Self::new(HotAirDirection::Down, target, &RampSettings::default())
    }

    pub fn new(direction: HotAirDirection, target: f64, settings: &RampSettings) -> Self {
        Self {
            direction,
            target,
            ramp_rate: settings.ramp_rate,
            tolerance: settings.settle_tolerance,
            max_scans: settings.max_scans,
            finalize_count: settings.finalize_count,
        }
    }

    pub fn with_ramp_rate(mut self, ramp_rate: f64) -> Self {
        self.ramp_rate = ramp_rate;
        self
    }

    pub fn with_max_scans(mut self, max_scans: u32) -> Self {
        self.max_scans = max_scans;
        self
    }

    pub fn direction(&self) -> HotAirDirection {
        self.direction
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    /// One-sided stop condition.
    pub fn is_settled(&self, current: f64) -> bool {
        match self.direction {
            HotAirDirection::Up => current > self.target - self.tolerance,
            HotAirDirection::Down => current < self.target + self.tolerance,
        }
    }

    fn signed_rate(&self) -> f64 {
        match self.direction {
            HotAirDirection::Up => self.ramp_rate.abs(),
            HotAirDirection::Down => -self.ramp_rate.abs(),
        }
    }

    /// Ramp and scan until settled or out of budget.
    pub async fn run<W: Write + Send>(
        &self,
        device: &mut dyn TemperatureController,
        ctx: &mut ScanContext<'_, W>,
    ) -> VtResult<LoopOutcome> {
        info!(
            direction = ?self.direction,
            target = self.target,
            ramp_rate = self.ramp_rate,
            "Starting hot air ramp"
        );

        device.set_ramp_rate(self.signed_rate()).await?;
        device.set_point(self.target).await?;
        device.start().await?;

        BoundedScanLoop::new(self.max_scans, self.finalize_count)
            .run(ctx, &mut *device, |current| self.is_settled(current))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_sided_conditions() {
        let up = HotAirRamp::up(40.0);
        assert!(up.is_settled(39.6));
        assert!(!up.is_settled(39.5));
        assert!(up.is_settled(45.0));

        let down = HotAirRamp::down(30.0);
        assert!(down.is_settled(30.4));
        assert!(!down.is_settled(30.5));
        assert!(down.is_settled(21.0));
    }

    #[test]
    fn rate_sign_follows_direction() {
        assert_eq!(HotAirRamp::up(600.0).with_ramp_rate(-0.2).signed_rate(), 0.2);
        assert_eq!(HotAirRamp::down(30.0).signed_rate(), -0.2);
    }

    #[test]
    fn tolerance_comes_from_settings() {
        let settings = RampSettings {
            settle_tolerance: 1.0,
            ..Default::default()
        };
        let down = HotAirRamp::new(HotAirDirection::Down, 30.0, &settings);
        assert!(down.is_settled(30.9));
    }
}
