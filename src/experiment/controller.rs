//! Variable-temperature scan controller.
//!
//! Runs one ramp session in two phases:
//!
//! ```text
//! Idle -> SoakingToStart -> RampingToTarget -> Finalizing -> Done
//! ```
//!
//! 1. **Soak**: drive the controller to `start_temperature` and poll, without
//!    scanning, until the directional predicate says it has arrived.
//! 2. **Ramp**: retarget to `target_temperature` and hand over to the
//!    `BoundedScanLoop`, which scans and logs until the target is reached or
//!    `max_scans` iterations have been spent.
//! 3. **Finalize**: five more scans at the plateau.
//!
//! The caller supplies a rate magnitude. Each leg gets the sign that moves
//! from its own starting point toward its own end, so a controller sitting
//! above the soak temperature cools first and then heats to the target.
//!
//! A session is single use. A return ramp is a fresh controller run with
//! `RampRequest::reversed`.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::{VtError, VtResult};
use crate::experiment::limits::{RampSettings, DEFAULT_MAX_SCANS, DEFAULT_RAMP_RATE};
use crate::experiment::scan_loop::{BoundedScanLoop, LoopOutcome, ScanContext};
use crate::experiment::target::RampLeg;
use crate::hardware::capabilities::TemperatureController;

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    Idle,
    SoakingToStart,
    RampingToTarget,
    Finalizing,
    Done,
}

/// Parameters of one ramp session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampRequest {
    pub start_temperature: f64,
    pub target_temperature: f64,
    /// Magnitude in degrees/s, the sign is ignored
    #[serde(default = "default_ramp_rate")]
    pub ramp_rate: f64,
    #[serde(default = "default_max_scans")]
    pub max_scans: u32,
}

fn default_ramp_rate() -> f64 {
    DEFAULT_RAMP_RATE
}

fn default_max_scans() -> u32 {
    DEFAULT_MAX_SCANS
}

impl RampRequest {
    /// Ramp from `start_temperature` to `target_temperature` at the default rate.
    pub fn new(start_temperature: f64, target_temperature: f64) -> Self {
        Self {
            start_temperature,
            target_temperature,
            ramp_rate: DEFAULT_RAMP_RATE,
            max_scans: DEFAULT_MAX_SCANS,
        }
    }

    /// Request using rate and budget from `settings`.
    pub fn with_settings(start_temperature: f64, target_temperature: f64, settings: &RampSettings) -> Self {
        Self {
            start_temperature,
            target_temperature,
            ramp_rate: settings.ramp_rate,
            max_scans: settings.max_scans,
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

    /// The return leg: same rate and budget, endpoints swapped.
    pub fn reversed(&self) -> Self {
        Self {
            start_temperature: self.target_temperature,
            target_temperature: self.start_temperature,
            ..self.clone()
        }
    }

    fn validate(&self) -> VtResult<()> {
        for (name, value) in [
            ("start_temperature", self.start_temperature),
            ("target_temperature", self.target_temperature),
            ("ramp_rate", self.ramp_rate),
        ] {
            if !value.is_finite() {
                return Err(VtError::Configuration(format!("{} is not finite: {}", name, value)));
            }
        }
        Ok(())
    }
}

/// Result of one ramp session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RampReport {
    pub session_id: Uuid,
    pub request: RampRequest,
    /// Reading when the session began
    pub initial_temperature: f64,
    /// Temperature polls spent soaking
    pub soak_polls: u32,
    /// The scanning phase, including the finalization burst
    pub outcome: LoopOutcome,
}

/// Two-phase soak-then-ramp controller.
#[derive(Debug)]
pub struct VariableTemperatureController {
    settings: RampSettings,
    state: ControllerState,
}

impl VariableTemperatureController {
    pub fn new(settings: RampSettings) -> Self {
        Self {
            settings,
            state: ControllerState::Idle,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn settings(&self) -> &RampSettings {
        &self.settings
    }

    /// Run the session to completion.
    pub async fn run<W: Write + Send>(
        &mut self,
        request: &RampRequest,
        device: &mut dyn TemperatureController,
        ctx: &mut ScanContext<'_, W>,
    ) -> VtResult<RampReport> {
        if self.state != ControllerState::Idle {
            return Err(VtError::Configuration(format!(
                "Controller session already used (state {:?})",
                self.state
            )));
        }
        request.validate()?;

        let session_id = Uuid::new_v4();
        let span = info_span!(
            "vt_ramp",
            session = %session_id,
            start = request.start_temperature,
            target = request.target_temperature
        );

        async {
            info!(
                "Performing variable temperature scans in range {} -> {}",
                request.start_temperature, request.target_temperature
            );

            let (initial_temperature, soak_polls) = self.soak(request, device, ctx).await?;
            let outcome = self.ramp(request, device, ctx).await?;

            self.state = ControllerState::Done;
            Ok::<_, VtError>(RampReport {
                session_id,
                request: request.clone(),
                initial_temperature,
                soak_polls,
                outcome,
            })
        }
        .instrument(span)
        .await
    }

    /// Bring the controller to the start temperature without scanning.
    async fn soak<W: Write + Send>(
        &mut self,
        request: &RampRequest,
        device: &mut dyn TemperatureController,
        ctx: &mut ScanContext<'_, W>,
    ) -> VtResult<(f64, u32)> {
        self.state = ControllerState::SoakingToStart;

        device.set_point(request.start_temperature).await?;
        let initial = device.current_temperature().await?;
        let leg = RampLeg::new(initial, request.start_temperature);

        device.set_ramp_rate(leg.signed_rate(request.ramp_rate)).await?;
        device.start().await?;

        let mut polls = 0;
        if !leg.is_degenerate() {
            loop {
                ctx.abort().check()?;
                let current = device.current_temperature().await?;
                polls += 1;
                if leg.is_complete(current) {
                    break;
                }
                ctx.clock().sleep(self.settings.poll_interval()).await;
            }
        }

        info!(
            temperature = device.state().read(),
            polls,
            "Reached start temperature, beginning ramp to {}",
            request.target_temperature
        );
        Ok((initial, polls))
    }

    /// Ramp to the target while scanning, then finalize.
    async fn ramp<W: Write + Send>(
        &mut self,
        request: &RampRequest,
        device: &mut dyn TemperatureController,
        ctx: &mut ScanContext<'_, W>,
    ) -> VtResult<LoopOutcome> {
        self.state = ControllerState::RampingToTarget;

        device.set_point(request.target_temperature).await?;
        let leg = RampLeg::new(request.start_temperature, request.target_temperature);
        device.set_ramp_rate(leg.signed_rate(request.ramp_rate)).await?;
        device.start().await?;

        let scan_loop = BoundedScanLoop::new(request.max_scans, self.settings.finalize_count);
        let mut outcome = scan_loop
            .run_until(ctx, &mut *device, |current| leg.is_complete(current))
            .await?;

        if outcome.stop_reached {
            info!(
                temperature = ?outcome.last_context,
                "Reached target temperature"
            );
            self.state = ControllerState::Finalizing;
            scan_loop.finalize(ctx, &mut *device, &mut outcome).await?;
        } else {
            debug!(iterations = outcome.iterations, "Ramp ended on scan budget");
        }
        Ok(outcome)
    }
}
