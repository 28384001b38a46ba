//! Device command channel.
//!
//! Named parameter writes to beamline devices (EPICS process variables). The
//! channel knows the set of parameters this crate is expected to address. A
//! write outside that set is still attempted, it only produces a warning so a
//! mistyped PV name shows up in the experiment log.
//!
//! Two transports implement `PvWriter`:
//! - `CaputWriter` shells out to the EPICS `caput` tool
//! - `RecordingWriter` keeps an in-memory history (simulation sessions, tests)

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::error::{VtError, VtResult};
use crate::hardware::capabilities::PvWriter;

/// Parameters the command channel is known to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceParameter {
    /// Hot air blower setpoint
    BlowerSetPoint,
    /// Hot air blower ramp rate
    BlowerRampRate,
    /// Cryostream ramp rate
    CryostreamRampRate,
    /// Cryostream target temperature
    CryostreamTarget,
    /// Start the cryostream ramp (no value)
    CryostreamRampTrigger,
}

impl DeviceParameter {
    /// Every known parameter.
    pub const ALL: [DeviceParameter; 5] = [
        DeviceParameter::BlowerSetPoint,
        DeviceParameter::BlowerRampRate,
        DeviceParameter::CryostreamRampRate,
        DeviceParameter::CryostreamTarget,
        DeviceParameter::CryostreamRampTrigger,
    ];

    /// Process variable name.
    pub fn pv(self) -> &'static str {
        match self {
            DeviceParameter::BlowerSetPoint => "BL11I-EA-BLOW-02:LOOP1:SP",
            DeviceParameter::BlowerRampRate => "BL11I-EA-BLOW-02:LOOP1:RR",
            DeviceParameter::CryostreamRampRate => "BL11I-CG-CSTRM-02:RRATE",
            DeviceParameter::CryostreamTarget => "BL11I-CG-CSTRM-02:RTEMP",
            DeviceParameter::CryostreamRampTrigger => "BL11I-CG-CSTRM-02:RAMP.PROC",
        }
    }

    /// Look up a parameter by PV name.
    pub fn from_pv(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.pv() == name)
    }
}

impl fmt::Display for DeviceParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pv())
    }
}

/// The PVs a ramping controller writes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RampChannels {
    pub set_point: String,
    pub ramp_rate: String,
    /// Record processed to start a ramp, if the device needs one.
    pub trigger: Option<String>,
}

impl RampChannels {
    /// Hot air blower: the ramp follows setpoint changes on its own.
    pub fn hot_air_blower() -> Self {
        Self {
            set_point: DeviceParameter::BlowerSetPoint.pv().to_string(),
            ramp_rate: DeviceParameter::BlowerRampRate.pv().to_string(),
            trigger: None,
        }
    }

    /// Cryostream: target and rate are staged, then the ramp record is processed.
    pub fn cryostream() -> Self {
        Self {
            set_point: DeviceParameter::CryostreamTarget.pv().to_string(),
            ramp_rate: DeviceParameter::CryostreamRampRate.pv().to_string(),
            trigger: Some(DeviceParameter::CryostreamRampTrigger.pv().to_string()),
        }
    }
}

/// Whitelist-checked parameter writes.
///
/// Clones share the same transport, so one channel can be handed to every
/// device of a session.
#[derive(Clone)]
pub struct CommandChannel {
    writer: Arc<AsyncMutex<Box<dyn PvWriter>>>,
    extra_known: Arc<Vec<String>>,
}

impl CommandChannel {
    /// Channel over `writer`, knowing only the built-in parameters.
    pub fn new(writer: impl PvWriter + 'static) -> Self {
        Self {
            writer: Arc::new(AsyncMutex::new(Box::new(writer))),
            extra_known: Arc::new(Vec::new()),
        }
    }

    /// Additional parameter names (e.g. motor PVs) that should not warn.
    pub fn with_known_parameters(mut self, names: Vec<String>) -> Self {
        self.extra_known = Arc::new(names);
        self
    }

    /// Whether `name` is an addressable parameter.
    pub fn is_known(&self, name: &str) -> bool {
        DeviceParameter::from_pv(name).is_some() || self.extra_known.iter().any(|n| n == name)
    }

    /// Write `value` to `parameter`.
    pub async fn send(&self, parameter: &str, value: Option<f64>) -> VtResult<()> {
        if !self.is_known(parameter) {
            warn!(parameter, "Parameter not in known parameters for caput");
        }

        self.writer.lock().await.put(parameter, value).await?;
        debug!(parameter, ?value, "Executed caput");
        Ok(())
    }

    /// Write to one of the known parameters.
    pub async fn send_known(&self, parameter: DeviceParameter, value: Option<f64>) -> VtResult<()> {
        self.send(parameter.pv(), value).await
    }
}

impl fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandChannel")
            .field("extra_known", &self.extra_known)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Transports
// =============================================================================

/// One write seen by a `RecordingWriter`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PvWrite {
    pub parameter: String,
    pub value: Option<f64>,
}

/// Simulation transport: accepts every write and remembers it.
#[derive(Debug, Clone, Default)]
pub struct RecordingWriter {
    history: Arc<Mutex<Vec<PvWrite>>>,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes received so far, oldest first.
    pub fn history(&self) -> Vec<PvWrite> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Writes to a single parameter, oldest first.
    pub fn writes_to(&self, parameter: &str) -> Vec<Option<f64>> {
        self.history()
            .into_iter()
            .filter(|w| w.parameter == parameter)
            .map(|w| w.value)
            .collect()
    }
}

#[async_trait]
impl PvWriter for RecordingWriter {
    async fn put(&mut self, parameter: &str, value: Option<f64>) -> VtResult<()> {
        if let Ok(mut history) = self.history.lock() {
            history.push(PvWrite {
                parameter: parameter.to_string(),
                value,
            });
        }
        Ok(())
    }
}

/// Channel Access transport using the EPICS `caput` command line tool.
#[derive(Debug, Clone)]
pub struct CaputWriter {
    program: String,
}

impl CaputWriter {
    /// Use `program` (usually `caput`) for writes.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CaputWriter {
    fn default() -> Self {
        Self::new("caput")
    }
}

#[async_trait]
impl PvWriter for CaputWriter {
    async fn put(&mut self, parameter: &str, value: Option<f64>) -> VtResult<()> {
        // Processing a record is a write of 1 to its .PROC field.
        let value = value.map_or_else(|| "1".to_string(), |v| v.to_string());
        let output = Command::new(&self.program)
            .arg(parameter)
            .arg(&value)
            .output()
            .await
            .map_err(|e| VtError::Device(format!("Failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(VtError::Device(format!(
                "{} {} {} failed: {}",
                self.program,
                parameter,
                value,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn known_parameters_round_trip_through_pv_names() {
        for parameter in DeviceParameter::ALL {
            assert_eq!(DeviceParameter::from_pv(parameter.pv()), Some(parameter));
        }
        assert_eq!(DeviceParameter::from_pv("BL11I-MO-TABLE-01:X"), None);
    }

    #[test]
    fn presets_use_known_parameters() {
        let channel = CommandChannel::new(RecordingWriter::new());
        for preset in [RampChannels::hot_air_blower(), RampChannels::cryostream()] {
            assert!(channel.is_known(&preset.set_point));
            assert!(channel.is_known(&preset.ramp_rate));
            if let Some(trigger) = &preset.trigger {
                assert!(channel.is_known(trigger));
            }
        }
    }

    #[traced_test]
    #[tokio::test]
    async fn unknown_parameter_warns_but_still_writes() {
        let writer = RecordingWriter::new();
        let channel = CommandChannel::new(writer.clone());

        channel.send("BL11I-XX-BOGUS-01:SP", Some(3.0)).await.unwrap();

        assert!(logs_contain("not in known parameters"));
        assert_eq!(writer.writes_to("BL11I-XX-BOGUS-01:SP"), vec![Some(3.0)]);
    }

    #[traced_test]
    #[tokio::test]
    async fn configured_extra_parameters_do_not_warn() {
        let writer = RecordingWriter::new();
        let channel = CommandChannel::new(writer.clone())
            .with_known_parameters(vec!["BL11I-MO-TABLE-01:X".to_string()]);

        channel.send("BL11I-MO-TABLE-01:X", Some(300.0)).await.unwrap();
        channel
            .send_known(DeviceParameter::CryostreamRampTrigger, None)
            .await
            .unwrap();

        assert!(!logs_contain("not in known parameters"));
        assert_eq!(writer.history().len(), 2);
        assert_eq!(writer.history()[1].value, None);
    }

    #[tokio::test]
    async fn caput_failure_is_a_device_error() {
        let mut writer = CaputWriter::new("/nonexistent/caput");
        let err = writer
            .put(DeviceParameter::BlowerSetPoint.pv(), Some(30.0))
            .await
            .unwrap_err();
        assert!(matches!(err, VtError::Device(_)));
    }
}
