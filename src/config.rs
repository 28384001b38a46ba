//! Configuration System using Figment
//!
//! Strongly-typed configuration for a variable-temperature session.
//! Configuration is layered:
//! 1. serde defaults (every field has one, an empty file is valid)
//! 2. a TOML file (`config/vt_scan.toml` unless another path is given)
//! 3. environment variables prefixed with `VT_SCAN_`, using `__` between
//!    nested keys, e.g. `VT_SCAN_RAMP__MAX_SCANS=200`
//!
//! # Example
//! ```no_run
//! use vt_scan::config::VtConfig;
//!
//! let config = VtConfig::load()?;
//! config.validate()?;
//! println!("Ramp rate: {}", config.ramp.ramp_rate);
//! # Ok::<(), vt_scan::error::VtError>(())
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{VtError, VtResult};
use crate::experiment::campaign::CampaignPlan;
use crate::experiment::limits::{secs_to_duration, RampSettings};
use crate::experiment::scan_loop::ScanErrorPolicy;
use crate::hardware::channel::RampChannels;
use crate::hardware::detector::{ScanCommand, DEFAULT_SCAN_TEMPLATE};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/vt_scan.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "VT_SCAN_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VtConfig {
    #[serde(default)]
    pub application: ApplicationConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub ramp: RampSettings,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub campaign: CampaignPlan,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// How devices are reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    /// Simulated controller, detector and file counter on a virtual clock
    #[default]
    Simulated,
    /// EPICS `caput`/`caget` and an external scan executor
    Epics,
}

/// Which temperature controller the session drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    #[default]
    HotAirBlower,
    Cryostream,
}

impl ControllerKind {
    pub fn channels(self) -> RampChannels {
        match self {
            ControllerKind::HotAirBlower => RampChannels::hot_air_blower(),
            ControllerKind::Cryostream => RampChannels::cryostream(),
        }
    }
}

/// Device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub mode: DeviceMode,
    #[serde(default)]
    pub controller: ControllerKind,
    /// Starting reading of the simulated controller
    #[serde(default = "default_initial_temperature")]
    pub initial_temperature: f64,
    /// Temperature readback PV (required in EPICS mode)
    #[serde(default)]
    pub temperature_pv: Option<String>,
    #[serde(default = "default_caput")]
    pub caput_program: String,
    #[serde(default = "default_caget")]
    pub caget_program: String,
    /// Parameter names accepted without a warning, besides the built-in ones
    #[serde(default)]
    pub known_parameters: Vec<String>,
    /// Table translation PV, bookkeeping only when unset
    #[serde(default)]
    pub tlx_pv: Option<String>,
    /// Sample stage PV, bookkeeping only when unset
    #[serde(default)]
    pub spos_pv: Option<String>,
    /// Pause after each sample changer move (seconds)
    #[serde(default = "default_sample_settle")]
    pub sample_settle_secs: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mode: DeviceMode::default(),
            controller: ControllerKind::default(),
            initial_temperature: default_initial_temperature(),
            temperature_pv: None,
            caput_program: default_caput(),
            caget_program: default_caget(),
            known_parameters: Vec::new(),
            tlx_pv: None,
            spos_pv: None,
            sample_settle_secs: default_sample_settle(),
        }
    }
}

/// Scan configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_axis")]
    pub axis: String,
    #[serde(default = "default_scan_start")]
    pub start: f64,
    #[serde(default = "default_scan_stop")]
    pub stop: f64,
    #[serde(default = "default_scan_step")]
    pub step: f64,
    #[serde(default = "default_detector")]
    pub detector: String,
    /// Seconds per point
    #[serde(default = "default_exposure")]
    pub exposure_time: f64,
    /// `strfmt` template for the rendered scan command
    #[serde(default = "default_template")]
    pub template: String,
    /// Program that executes a rendered scan (required in EPICS mode)
    #[serde(default)]
    pub executor: Option<String>,
    #[serde(default)]
    pub executor_args: Vec<String>,
    /// Pause after a rejected scan (seconds)
    #[serde(default)]
    pub syntax_error_pause_secs: f64,
    /// Log rejected scans as errors rather than debug events
    #[serde(default)]
    pub strict: bool,
    /// Persistent file-number counter; an in-memory counter is used when unset
    #[serde(default)]
    pub file_number_tracker: Option<PathBuf>,
    #[serde(default = "default_first_file_number")]
    pub first_file_number: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let psd = ScanCommand::psd(default_exposure());
        Self {
            axis: psd.axis,
            start: psd.start,
            stop: psd.stop,
            step: psd.step,
            detector: psd.detector,
            exposure_time: psd.exposure_time,
            template: default_template(),
            executor: None,
            executor_args: Vec::new(),
            syntax_error_pause_secs: 0.0,
            strict: false,
            file_number_tracker: None,
            first_file_number: default_first_file_number(),
        }
    }
}

impl ScanConfig {
    pub fn command(&self) -> ScanCommand {
        ScanCommand {
            axis: self.axis.clone(),
            start: self.start,
            stop: self.stop,
            step: self.step,
            detector: self.detector.clone(),
            exposure_time: self.exposure_time,
        }
    }

    pub fn policy(&self) -> ScanErrorPolicy {
        ScanErrorPolicy {
            pause_secs: self.syntax_error_pause_secs,
            strict: self.strict,
        }
    }
}

/// Output file configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for scan logs
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
    /// Experiment journal, relative to `directory`
    #[serde(default = "default_journal")]
    pub journal: String,
    /// Room-temperature batch log, relative to `directory`
    #[serde(default = "default_batch_log")]
    pub batch_log: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            journal: default_journal(),
            batch_log: default_batch_log(),
        }
    }
}

impl OutputConfig {
    pub fn journal_path(&self) -> PathBuf {
        self.directory.join(&self.journal)
    }

    pub fn batch_log_path(&self) -> PathBuf {
        self.directory.join(&self.batch_log)
    }
}

// Default value functions
fn default_app_name() -> String {
    "vt-scan".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_initial_temperature() -> f64 {
    30.0
}

fn default_caput() -> String {
    "caput".to_string()
}

fn default_caget() -> String {
    "caget".to_string()
}

fn default_sample_settle() -> f64 {
    1.0
}

fn default_axis() -> String {
    "delta".to_string()
}

fn default_scan_start() -> f64 {
    2.0
}

fn default_scan_stop() -> f64 {
    2.25
}

fn default_scan_step() -> f64 {
    0.25
}

fn default_detector() -> String {
    "smythen".to_string()
}

fn default_exposure() -> f64 {
    6.0
}

fn default_template() -> String {
    DEFAULT_SCAN_TEMPLATE.to_string()
}

fn default_first_file_number() -> u64 {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_journal() -> String {
    "vt_journal.log".to_string()
}

fn default_batch_log() -> String {
    "room_temperature_batch.log".to_string()
}

impl VtConfig {
    /// Load from the default file location and the environment.
    pub fn load() -> VtResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file is not an error, defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> VtResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> VtResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(VtError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(VtError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        self.ramp.validate()?;

        // A command the executor would reject is a configuration problem here
        self.scan
            .command()
            .validate()
            .map_err(|e| VtError::Configuration(e.to_string()))?;

        secs_to_duration("device.sample_settle_secs", self.device.sample_settle_secs)?;
        secs_to_duration("scan.syntax_error_pause_secs", self.scan.syntax_error_pause_secs)?;

        if self.device.mode == DeviceMode::Epics {
            if self.device.temperature_pv.is_none() {
                return Err(VtError::Configuration(
                    "device.temperature_pv is required in epics mode".to_string(),
                ));
            }
            if self.scan.executor.is_none() {
                return Err(VtError::Configuration(
                    "scan.executor is required in epics mode".to_string(),
                ));
            }
        }

        let mut ids = HashSet::new();
        for sample in &self.campaign.samples {
            if sample.id.trim().is_empty() {
                return Err(VtError::Configuration("Campaign sample with empty id".to_string()));
            }
            if !ids.insert(&sample.id) {
                return Err(VtError::Configuration(format!(
                    "Duplicate campaign sample id: {}",
                    sample.id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let config = VtConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scan.command(), ScanCommand::psd(6.0));
        assert_eq!(config.ramp.max_scans, 1000);
        assert_eq!(config.device.mode, DeviceMode::Simulated);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        Jail::expect_with(|_jail| {
            let config = VtConfig::load_from("does_not_exist.toml").map_err(|e| e.to_string())?;
            assert_eq!(config, VtConfig::default());
            Ok(())
        });
    }

    #[test]
    fn file_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "vt.toml",
                r#"
                [device]
                controller = "cryostream"
                initial_temperature = 100.0

                [ramp]
                ramp_rate = 0.1
                max_scans = 50

                [[campaign.samples]]
                id = "FHT02"
                position = 11
                "#,
            )?;
            jail.set_env("VT_SCAN_RAMP__MAX_SCANS", "200");
            jail.set_env("VT_SCAN_APPLICATION__LOG_LEVEL", "debug");

            let config = VtConfig::load_from("vt.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.device.controller, ControllerKind::Cryostream);
            assert_eq!(config.device.initial_temperature, 100.0);
            assert_eq!(config.ramp.ramp_rate, 0.1);
            assert_eq!(config.ramp.max_scans, 200);
            // untouched keys keep their defaults
            assert_eq!(config.ramp.finalize_count, 5);
            assert_eq!(config.application.log_level, "debug");
            assert_eq!(config.campaign.samples[0].id, "FHT02");
            Ok(())
        });
    }

    #[test]
    fn invalid_log_level_rejected() {
        let mut config = VtConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(matches!(config.validate(), Err(VtError::Configuration(_))));
    }

    #[test]
    fn epics_mode_needs_pv_and_executor() {
        let mut config = VtConfig::default();
        config.device.mode = DeviceMode::Epics;
        assert!(config.validate().is_err());

        config.device.temperature_pv = Some("BL11I-EA-BLOW-02:LOOP1:PV:RBV".into());
        assert!(config.validate().is_err());

        config.scan.executor = Some("gda-scan".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bad_scan_command_is_configuration_error() {
        let mut config = VtConfig::default();
        config.scan.step = 0.0;
        assert!(matches!(config.validate(), Err(VtError::Configuration(_))));
    }

    #[test]
    fn out_of_range_durations_rejected() {
        let mut config = VtConfig::default();
        config.scan.syntax_error_pause_secs = 1e30;
        assert!(matches!(config.validate(), Err(VtError::Configuration(_))));

        let mut config = VtConfig::default();
        config.ramp.poll_interval_secs = 1e30;
        assert!(matches!(config.validate(), Err(VtError::Configuration(_))));

        let mut config = VtConfig::default();
        config.device.sample_settle_secs = f64::INFINITY;
        assert!(matches!(config.validate(), Err(VtError::Configuration(_))));

        let mut config = VtConfig::default();
        config.scan.exposure_time = 1e300;
        assert!(matches!(config.validate(), Err(VtError::Configuration(_))));
    }
}
