//! Ramping temperature controllers (hot air blower, cryostream).
//!
//! `RampController` is the device proxy for one temperature controller. It
//! issues setpoint, rate and trigger commands through the session's
//! `CommandChannel` and keeps a local `RampState`. Where readings come from is
//! decided by the `TemperatureSensor` it is built with:
//!
//! - `SimulatedController` advances the linear ramp model on every poll
//! - `EpicsController` reads a temperature PV with `caget`
//!
//! Every command is sent before the local state is updated, mirroring the
//! order in which the physical device sees the change.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{VtError, VtResult};
use crate::hardware::capabilities::{Clock, TemperatureController, TemperatureSensor};
use crate::hardware::channel::{CommandChannel, RampChannels};
use crate::hardware::ramp::RampState;

/// Temperature controller reached through a command channel.
pub struct RampController<S> {
    state: RampState,
    sensor: S,
    channel: CommandChannel,
    channels: RampChannels,
    clock: Arc<dyn Clock>,
}

/// Controller driven by the linear ramp model.
pub type SimulatedController = RampController<SimulatedSensor>;

/// Controller reading a live temperature PV.
pub type EpicsController = RampController<CagetSensor>;

impl<S: TemperatureSensor> RampController<S> {
    /// Build a controller with explicit state, readout and transport.
    pub fn new(
        state: RampState,
        sensor: S,
        channel: CommandChannel,
        channels: RampChannels,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state,
            sensor,
            channel,
            channels,
            clock,
        }
    }

    /// The PVs this controller writes to.
    pub fn channels(&self) -> &RampChannels {
        &self.channels
    }
}

impl SimulatedController {
    /// Simulated controller idling at `initial_temperature`.
    pub fn simulated(
        initial_temperature: f64,
        channel: CommandChannel,
        channels: RampChannels,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            RampState::new(initial_temperature),
            SimulatedSensor,
            channel,
            channels,
            clock,
        )
    }
}

#[async_trait]
impl<S: TemperatureSensor> TemperatureController for RampController<S> {
    async fn set_point(&mut self, value: f64) -> VtResult<()> {
        debug!(set_point = value, "Setting temperature set point");
        self.channel.send(&self.channels.set_point, Some(value)).await?;
        self.state.update_set_point(value);
        Ok(())
    }

    async fn set_ramp_rate(&mut self, value: f64) -> VtResult<()> {
        debug!(ramp_rate = value, "Setting ramp rate (degrees/s)");
        self.channel.send(&self.channels.ramp_rate, Some(value)).await?;
        self.state.update_ramp_rate(value);
        Ok(())
    }

    async fn start(&mut self) -> VtResult<()> {
        self.state.begin(self.clock.now())?;

        info!(
            from = self.state.read(),
            to = self.state.set_point(),
            ramp_rate = self.state.ramp_rate(),
            eta_minutes = self.state.eta_minutes(),
            "Initialising temperature ramp"
        );

        if let Some(trigger) = &self.channels.trigger {
            self.channel.send(trigger, None).await?;
        }
        Ok(())
    }

    async fn current_temperature(&mut self) -> VtResult<f64> {
        let now = self.clock.now();
        let reading = self.sensor.read(&mut self.state, now).await?;
        debug!(temperature = reading, "Temperature reading");
        Ok(reading)
    }

    fn state(&self) -> &RampState {
        &self.state
    }
}

// =============================================================================
// Sensors
// =============================================================================

/// Readout that advances the ramp model.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedSensor;

#[async_trait]
impl TemperatureSensor for SimulatedSensor {
    async fn read(&mut self, model: &mut RampState, now: Duration) -> VtResult<f64> {
        Ok(model.advance(now))
    }
}

/// Readout of a temperature PV via the EPICS `caget` tool.
#[derive(Debug, Clone)]
pub struct CagetSensor {
    program: String,
    pv: String,
}

impl CagetSensor {
    /// Read `pv` using `program` (usually `caget`).
    pub fn new(program: impl Into<String>, pv: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            pv: pv.into(),
        }
    }
}

/// Parse terse `caget -t` output.
pub(crate) fn parse_caget_output(pv: &str, stdout: &str) -> VtResult<f64> {
    let text = stdout.trim();
    text.parse::<f64>()
        .map_err(|_| VtError::Device(format!("Unexpected reading for {}: '{}'", pv, text)))
}

#[async_trait]
impl TemperatureSensor for CagetSensor {
    async fn read(&mut self, model: &mut RampState, _now: Duration) -> VtResult<f64> {
        let output = Command::new(&self.program)
            .arg("-t")
            .arg(&self.pv)
            .output()
            .await
            .map_err(|e| VtError::Device(format!("Failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(VtError::Device(format!(
                "{} {} failed: {}",
                self.program,
                self.pv,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let reading = parse_caget_output(&self.pv, &String::from_utf8_lossy(&output.stdout))?;
        model.observe(reading);
        Ok(reading)
    }
}
