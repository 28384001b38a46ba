//! Hardware Capabilities
//!
//! Small capability traits for the devices a variable-temperature experiment
//! touches. The controller and scan loops are written against these traits,
//! so a session can be assembled from real beamline adapters or from the
//! deterministic simulation adapters without either side knowing:
//!
//! - A temperature controller implements: `TemperatureController`
//! - Its readout implements: `TemperatureSensor`
//! - A detector implements: `ScanTrigger`
//! - The beamline file counter implements: `FileNumberIssuer`
//! - A channel-access transport implements: `PvWriter`
//! - Wall time (or simulated time) implements: `Clock`
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses `VtResult` so callers can tell recoverable scan errors from fatal ones
//! - Focuses on ONE thing
//!
//! Device state is owned. Methods that change device state take `&mut self`,
//! and a session holds exactly one instance of each device.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::VtResult;
use crate::hardware::detector::ScanCommand;
use crate::hardware::ramp::RampState;

/// Capability: Time Source
///
/// All pauses and elapsed-time calculations go through a clock so the
/// simulation can run a multi-hour ramp in microseconds.
///
/// # Contract
/// - `now` is monotonic, measured from an arbitrary origin
/// - `sleep` returns once at least `duration` has passed on this clock
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock origin.
    fn now(&self) -> Duration;

    /// Pause the control loop.
    async fn sleep(&self, duration: Duration);
}

/// Capability: Temperature Ramp Control
///
/// Devices that drive a sample temperature toward a setpoint at a given
/// ramp rate (hot air blowers, cryostreams).
///
/// # Contract
/// - `set_point` and `set_ramp_rate` issue the device command before the
///   local state changes
/// - `ramp_rate` units are degrees per second, the sign encodes direction
/// - `start` fails with `VtError::Configuration` when the rate is zero
/// - `current_temperature` may advance a simulated reading; poll no more
///   often than needed
#[async_trait]
pub trait TemperatureController: Send + Sync {
    /// Change the setpoint.
    async fn set_point(&mut self, value: f64) -> VtResult<()>;

    /// Change the ramp rate (degrees per second, signed).
    async fn set_ramp_rate(&mut self, value: f64) -> VtResult<()>;

    /// Begin ramping from the current reading toward the setpoint.
    async fn start(&mut self) -> VtResult<()>;

    /// Read the current temperature.
    async fn current_temperature(&mut self) -> VtResult<f64>;

    /// Locally tracked ramp state.
    fn state(&self) -> &RampState;
}

/// Capability: Temperature Readout
///
/// Where a controller's readings come from. Hardware sensors measure and
/// record the value into the ramp model, simulated sensors advance the model
/// to `now`.
#[async_trait]
pub trait TemperatureSensor: Send + Sync {
    /// Take one reading.
    async fn read(&mut self, model: &mut RampState, now: Duration) -> VtResult<f64>;
}

/// Capability: Detector Acquisition
///
/// # Contract
/// - One successful call is one acquisition
/// - A malformed command is reported as `VtError::ScanSyntax`, never a panic
#[async_trait]
pub trait ScanTrigger: Send + Sync {
    /// Perform one scan and wait for it to finish.
    async fn trigger(&mut self, command: &ScanCommand) -> VtResult<()>;
}

/// Capability: Acquisition File Numbering
///
/// # Contract
/// - Every call returns a number strictly greater than the previous one
/// - A number is never handed out twice
#[async_trait]
pub trait FileNumberIssuer: Send + Sync {
    /// Claim the file number of the next acquisition.
    async fn next_file_number(&mut self) -> VtResult<u64>;
}

/// Capability: Process Variable Writes
///
/// The transport underneath `CommandChannel`. Whitelisting and logging live in
/// the channel, writers only move bytes.
#[async_trait]
pub trait PvWriter: Send + Sync {
    /// Write `value` to `parameter`, or process the record when `value` is `None`.
    async fn put(&mut self, parameter: &str, value: Option<f64>) -> VtResult<()>;
}
