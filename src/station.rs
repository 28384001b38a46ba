//! The set of devices one session works with.
//!
//! A `Station` owns the temperature controller, detector trigger, file-number
//! issuer, clock and ancillary axes, built from configuration either as a
//! deterministic simulation or against EPICS and an external scan executor.
//! Procedures borrow what they need through `Station::parts`, which hands out
//! disjoint borrows together with a ready `ScanContext`.

use std::io::Write;
use std::sync::Arc;

use tracing::info;

use crate::config::{DeviceMode, VtConfig};
use crate::error::{VtError, VtResult};
use crate::experiment::abort::AbortFlag;
use crate::experiment::limits::secs_to_duration;
use crate::experiment::scan_log::ScanLogger;
use crate::experiment::scan_loop::{ScanContext, ScanErrorPolicy};
use crate::hardware::beamline::{Beam, Beamline, NumTracker, Spinner};
use crate::hardware::capabilities::{
    Clock, FileNumberIssuer, PvWriter, ScanTrigger, TemperatureController,
};
use crate::hardware::channel::{CaputWriter, CommandChannel, RecordingWriter};
use crate::hardware::clock::{SimulatedClock, SystemClock};
use crate::hardware::cryostream::{CagetSensor, RampController, SimulatedSensor};
use crate::hardware::detector::{CommandScanTrigger, ScanCommand, SimulatedDetector};
use crate::hardware::ramp::RampState;
use crate::hardware::sample::{Motor, SampleProxy};

/// Devices of one beamline session.
pub struct Station {
    controller: Box<dyn TemperatureController>,
    trigger: Box<dyn ScanTrigger>,
    issuer: Box<dyn FileNumberIssuer>,
    clock: Arc<dyn Clock>,
    command: ScanCommand,
    policy: ScanErrorPolicy,
    abort: AbortFlag,
    pub sample: SampleProxy,
    pub tlx: Motor,
    pub spos: Motor,
    pub beam: Beam,
    pub spinner: Spinner,
}

/// Disjoint borrows of a station plus a scan context over its detector.
pub struct StationParts<'a, W: Write> {
    pub controller: &'a mut dyn TemperatureController,
    pub sample: &'a mut SampleProxy,
    pub tlx: &'a mut Motor,
    pub spos: &'a mut Motor,
    pub ctx: ScanContext<'a, W>,
}

impl Station {
    /// Build the station the configuration asks for.
    ///
    /// Simulated stations get a fresh virtual clock and a recording channel.
    pub fn from_config(config: &VtConfig) -> VtResult<Self> {
        match config.device.mode {
            DeviceMode::Simulated => Self::simulated(config, SimulatedClock::new(), RecordingWriter::new()),
            DeviceMode::Epics => Self::epics(config),
        }
    }

    /// Simulated controller and detector sharing `clock`.
    pub fn simulated(config: &VtConfig, clock: SimulatedClock, writer: RecordingWriter) -> VtResult<Self> {
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let channel = Self::channel(config, writer);

        let state = RampState::new(config.device.initial_temperature)
            .with_snap_tolerance(config.ramp.snap_tolerance);
        let controller = RampController::new(
            state,
            SimulatedSensor,
            channel.clone(),
            config.device.controller.channels(),
            shared.clone(),
        );

        info!(
            controller = ?config.device.controller,
            initial_temperature = config.device.initial_temperature,
            "Building simulated station"
        );
        Self::assemble(
            config,
            Box::new(controller),
            Box::new(SimulatedDetector::new(clock)),
            shared,
            channel,
        )
    }

    /// Controller over `caput`/`caget`, scans through the configured executor.
    pub fn epics(config: &VtConfig) -> VtResult<Self> {
        let temperature_pv = config.device.temperature_pv.clone().ok_or_else(|| {
            VtError::Configuration("device.temperature_pv is required in epics mode".to_string())
        })?;
        let executor = config.scan.executor.clone().ok_or_else(|| {
            VtError::Configuration("scan.executor is required in epics mode".to_string())
        })?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let channel = Self::channel(config, CaputWriter::new(config.device.caput_program.clone()));

        let controller = RampController::new(
            RampState::new(config.device.initial_temperature),
            CagetSensor::new(config.device.caget_program.clone(), temperature_pv.clone()),
            channel.clone(),
            config.device.controller.channels(),
            clock.clone(),
        );
        let trigger = CommandScanTrigger::new(
            executor.clone(),
            config.scan.executor_args.clone(),
            config.scan.template.clone(),
        );

        info!(
            controller = ?config.device.controller,
            temperature_pv = %temperature_pv,
            executor = %executor,
            "Building EPICS station"
        );
        Self::assemble(config, Box::new(controller), Box::new(trigger), clock, channel)
    }

    fn channel(config: &VtConfig, writer: impl PvWriter + 'static) -> CommandChannel {
        let mut known = config.device.known_parameters.clone();
        known.extend(config.device.tlx_pv.iter().cloned());
        known.extend(config.device.spos_pv.iter().cloned());
        CommandChannel::new(writer).with_known_parameters(known)
    }

    fn assemble(
        config: &VtConfig,
        controller: Box<dyn TemperatureController>,
        trigger: Box<dyn ScanTrigger>,
        clock: Arc<dyn Clock>,
        channel: CommandChannel,
    ) -> VtResult<Self> {
        let issuer: Box<dyn FileNumberIssuer> = match &config.scan.file_number_tracker {
            Some(path) => Box::new(NumTracker::new(path.clone())),
            None => Box::new(Beamline::new(config.scan.first_file_number)),
        };

        let settle = secs_to_duration("device.sample_settle_secs", config.device.sample_settle_secs)?;

        Ok(Self {
            controller,
            trigger,
            issuer,
            sample: SampleProxy::new(clock.clone()).with_settle(settle),
            tlx: Motor::new(
                "tlx",
                config.device.tlx_pv.clone(),
                config.campaign.tlx_park,
                channel.clone(),
            ),
            spos: Motor::new("spos", config.device.spos_pv.clone(), 0.0, channel),
            beam: Beam::default(),
            spinner: Spinner::default(),
            clock,
            command: config.scan.command(),
            policy: config.scan.policy(),
            abort: AbortFlag::new(),
        })
    }

    /// Share an externally owned abort flag (e.g. one raised on Ctrl-C).
    pub fn with_abort(mut self, abort: AbortFlag) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort(&self) -> &AbortFlag {
        &self.abort
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn controller(&self) -> &dyn TemperatureController {
        self.controller.as_ref()
    }

    /// Borrow the devices a procedure needs, scanning into `logger`.
    pub fn parts<'a, W: Write + Send>(&'a mut self, logger: &'a mut ScanLogger<W>) -> StationParts<'a, W> {
        let ctx = ScanContext::new(
            self.trigger.as_mut(),
            self.issuer.as_mut(),
            logger,
            self.clock.as_ref(),
        )
        .with_command(self.command.clone())
        .with_policy(self.policy.clone())
        .with_abort(self.abort.clone());

        StationParts {
            controller: self.controller.as_mut(),
            sample: &mut self.sample,
            tlx: &mut self.tlx,
            spos: &mut self.spos,
            ctx,
        }
    }
}
