//! Detector scans.
//!
//! A scan steps an axis (usually the `delta` diffractometer circle) from
//! `start` to `stop` and exposes the position-sensitive detector at each point.
//! `ScanCommand` holds the parameters and renders them into the instrument's
//! command syntax through a `strfmt` template. Problems with the command are
//! `VtError::ScanSyntax`, which scan loops absorb.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strfmt::strfmt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{VtError, VtResult};
use crate::hardware::capabilities::ScanTrigger;
use crate::hardware::clock::SimulatedClock;

/// Default instrument command syntax.
pub const DEFAULT_SCAN_TEMPLATE: &str = "scan {axis} {start} {stop} {step} {detector} {exposure}";

/// Parameters of one detector scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanCommand {
    pub axis: String,
    pub start: f64,
    pub stop: f64,
    pub step: f64,
    pub detector: String,
    /// Seconds per point
    pub exposure_time: f64,
}

impl ScanCommand {
    /// Two-point PSD scan over `delta` with the Mythen detector.
    pub fn psd(exposure_time: f64) -> Self {
        Self {
            axis: "delta".to_string(),
            start: 2.0,
            stop: 2.25,
            step: 0.25,
            detector: "smythen".to_string(),
            exposure_time,
        }
    }

    /// Same scan with a different exposure.
    pub fn with_exposure(&self, exposure_time: f64) -> Self {
        Self {
            exposure_time,
            ..self.clone()
        }
    }

    /// Reject commands the instrument would refuse to parse.
    pub fn validate(&self) -> VtResult<()> {
        let syntax = |msg: String| Err(VtError::ScanSyntax(msg));

        for (label, word) in [("axis", &self.axis), ("detector", &self.detector)] {
            if word.is_empty() || word.chars().any(char::is_whitespace) {
                return syntax(format!("invalid {} name '{}'", label, word));
            }
        }
        for (label, value) in [
            ("start", self.start),
            ("stop", self.stop),
            ("step", self.step),
            ("exposure", self.exposure_time),
        ] {
            if !value.is_finite() {
                return syntax(format!("{} is not a number: {}", label, value));
            }
        }
        if self.step <= 0.0 {
            return syntax(format!("step must be positive, got {}", self.step));
        }
        if self.exposure_time <= 0.0 {
            return syntax(format!("exposure must be positive, got {}", self.exposure_time));
        }
        if self.stop < self.start {
            return syntax(format!("stop {} is before start {}", self.stop, self.start));
        }
        if Duration::try_from_secs_f64(self.total_exposure_secs()).is_err() {
            return syntax(format!("exposure {} is too long", self.exposure_time));
        }
        Ok(())
    }

    /// Number of exposures in the scan.
    pub fn points(&self) -> u32 {
        ((self.stop - self.start) / self.step + 1e-9).floor() as u32 + 1
    }

    fn total_exposure_secs(&self) -> f64 {
        self.exposure_time * f64::from(self.points())
    }

    /// Total detector exposure. Zero for commands that fail `validate`.
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.total_exposure_secs()).unwrap_or(Duration::ZERO)
    }

    /// Render into instrument syntax.
    pub fn render(&self, template: &str) -> VtResult<String> {
        let mut vars = HashMap::new();
        vars.insert("axis".to_string(), self.axis.clone());
        vars.insert("start".to_string(), self.start.to_string());
        vars.insert("stop".to_string(), self.stop.to_string());
        vars.insert("step".to_string(), self.step.to_string());
        vars.insert("detector".to_string(), self.detector.clone());
        vars.insert("exposure".to_string(), self.exposure_time.to_string());

        strfmt(template, &vars)
            .map_err(|e| VtError::ScanSyntax(format!("Failed to format scan command: {}", e)))
    }
}

// =============================================================================
// Triggers
// =============================================================================

/// Simulated detector.
///
/// Validates each command, then moves the shared simulated clock forward by
/// the exposure time of the scan.
#[derive(Debug, Clone)]
pub struct SimulatedDetector {
    clock: SimulatedClock,
    triggered: u64,
    fail_next: u32,
}

impl SimulatedDetector {
    pub fn new(clock: SimulatedClock) -> Self {
        Self {
            clock,
            triggered: 0,
            fail_next: 0,
        }
    }

    /// Reject the next `count` scans with a syntax error.
    pub fn fail_next(&mut self, count: u32) {
        self.fail_next = count;
    }

    /// Successful scans so far.
    pub fn triggered(&self) -> u64 {
        self.triggered
    }
}

#[async_trait]
impl ScanTrigger for SimulatedDetector {
    async fn trigger(&mut self, command: &ScanCommand) -> VtResult<()> {
        command.validate()?;
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(VtError::ScanSyntax(format!(
                "simulated rejection of scan over {}",
                command.axis
            )));
        }

        self.clock.advance(command.duration());
        self.triggered += 1;
        debug!(scan = self.triggered, axis = %command.axis, "Simulated scan complete");
        Ok(())
    }
}

/// Runs each scan through an external command (e.g. a GDA client).
///
/// The rendered scan is passed as the last argument. A non-zero exit whose
/// stderr mentions `SyntaxError` is a scan syntax error, anything else is a
/// device failure.
#[derive(Debug, Clone)]
pub struct CommandScanTrigger {
    program: String,
    args: Vec<String>,
    template: String,
}

impl CommandScanTrigger {
    pub fn new(program: impl Into<String>, args: Vec<String>, template: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            template: template.into(),
        }
    }
}

#[async_trait]
impl ScanTrigger for CommandScanTrigger {
    async fn trigger(&mut self, command: &ScanCommand) -> VtResult<()> {
        command.validate()?;
        let rendered = command.render(&self.template)?;
        debug!(command = %rendered, "Executing scan");

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&rendered)
            .output()
            .await
            .map_err(|e| VtError::Device(format!("Failed to run {}: {}", self.program, e)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("SyntaxError") {
            Err(VtError::ScanSyntax(format!("{}: {}", rendered, stderr.trim())))
        } else {
            Err(VtError::Device(format!(
                "Scan '{}' failed: {}",
                rendered,
                stderr.trim()
            )))
        }
    }
}
