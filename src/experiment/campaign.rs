//! Multi-sample variable-temperature campaign.
//!
//! Runs the two-phase controller over a list of carousel samples. The station
//! is prepared once (table parked, sample changer started, spinner and beam
//! on). Each sample then gets a journal entry and its own directory and scan
//! log, is loaded and driven into the beam, and is ramped from the start
//! temperature to the target. Unless disabled, a second session ramps it back.
//! Whatever happens, the station is left with no sample loaded, the spinner
//! stopped and the beam off.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, info_span, Instrument};

use crate::error::VtResult;
use crate::experiment::controller::{RampReport, RampRequest, VariableTemperatureController};
use crate::experiment::limits::RampSettings;
use crate::experiment::scan_log::{Journal, ScanLogger};
use crate::station::{Station, StationParts};

/// One carousel sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSample {
    pub id: String,
    pub position: u32,
}

/// Samples and temperatures of a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignPlan {
    #[serde(default)]
    pub samples: Vec<CampaignSample>,
    #[serde(default = "default_start_temperature")]
    pub start_temperature: f64,
    #[serde(default = "default_target_temperature")]
    pub target_temperature: f64,
    /// Table position clear of the blower
    #[serde(default = "default_tlx_park")]
    pub tlx_park: f64,
    /// Table position with the sample in the blower
    #[serde(default)]
    pub tlx_measure: f64,
    /// Ramp back to the start temperature after reaching the target
    #[serde(default = "default_return_leg")]
    pub return_leg: bool,
}

fn default_start_temperature() -> f64 {
    30.0
}

fn default_target_temperature() -> f64 {
    600.0
}

fn default_tlx_park() -> f64 {
    300.0
}

fn default_return_leg() -> bool {
    true
}

impl Default for CampaignPlan {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            start_temperature: default_start_temperature(),
            target_temperature: default_target_temperature(),
            tlx_park: default_tlx_park(),
            tlx_measure: 0.0,
            return_leg: default_return_leg(),
        }
    }
}

/// Directory holding one sample's heating data.
pub fn heating_dir_name(sample_id: &str, start: f64, target: f64) -> String {
    format!("{}_heating_{}C-{}C", sample_id, start, target)
}

/// Scan log of one sample's heating run.
pub fn heating_log_name(sample_id: &str, start: f64, target: f64) -> String {
    format!("{}_heating_{}C_to_{}C.log", sample_id, start, target)
}

/// What happened to one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleReport {
    pub sample_id: String,
    pub log_path: PathBuf,
    /// Heating leg, then the return leg if one ran
    pub legs: Vec<RampReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CampaignReport {
    pub samples: Vec<SampleReport>,
}

/// Campaign runner.
#[derive(Debug, Clone)]
pub struct Campaign {
    plan: CampaignPlan,
    settings: RampSettings,
    output_dir: PathBuf,
}

impl Campaign {
    pub fn new(plan: CampaignPlan, settings: RampSettings, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            plan,
            settings,
            output_dir: output_dir.into(),
        }
    }

    pub fn plan(&self) -> &CampaignPlan {
        &self.plan
    }

    pub async fn run<J: Write + Send>(
        &self,
        station: &mut Station,
        journal: &mut Journal<J>,
    ) -> VtResult<CampaignReport> {
        info!(samples = self.plan.samples.len(), "Starting VT campaign");

        let result = match self.setup(station).await {
            Ok(()) => self.run_samples(station, journal).await,
            Err(e) => Err(e),
        };

        station.sample.clear_sample();
        station.spinner.off();
        station.beam.off();
        info!("Campaign finished, station made safe");
        result
    }

    async fn setup(&self, station: &mut Station) -> VtResult<()> {
        station.tlx.move_to(self.plan.tlx_park).await?;
        station.sample.start();
        station.spinner.on();
        station.beam.on();
        Ok(())
    }

    async fn run_samples<J: Write + Send>(
        &self,
        station: &mut Station,
        journal: &mut Journal<J>,
    ) -> VtResult<CampaignReport> {
        let mut report = CampaignReport::default();
        for sample in &self.plan.samples {
            station.abort().check()?;
            let span = info_span!("sample", id = %sample.id, position = sample.position);
            let sample_report = self.run_sample(station, journal, sample).instrument(span).await?;
            report.samples.push(sample_report);
        }
        Ok(report)
    }

    async fn run_sample<J: Write + Send>(
        &self,
        station: &mut Station,
        journal: &mut Journal<J>,
        sample: &CampaignSample,
    ) -> VtResult<SampleReport> {
        let start = self.plan.start_temperature;
        let target = self.plan.target_temperature;

        let dir = self.output_dir.join(heating_dir_name(&sample.id, start, target));
        tokio::fs::create_dir_all(&dir).await?;
        let log_path = dir.join(heating_log_name(&sample.id, start, target));

        journal.note(format!("Running VT on {}", sample.id))?;
        journal.note(format!(
            "\tsample {} placed into the blower at {}C, ramping to {}C",
            sample.position, start, target
        ))?;
        journal.note(format!("\tsee log file: {}", display_name(&log_path)))?;

        let mut logger = ScanLogger::append_to(&log_path)?;
        let request = RampRequest::with_settings(start, target, &self.settings);

        let StationParts {
            controller,
            sample: changer,
            tlx,
            mut ctx,
            ..
        } = station.parts(&mut logger);

        changer.move_to(f64::from(sample.position)).await;
        tlx.move_to(self.plan.tlx_measure).await?;

        let mut legs = Vec::new();
        let heating = VariableTemperatureController::new(self.settings.clone())
            .run(&request, &mut *controller, &mut ctx)
            .await?;
        legs.push(heating);

        if self.plan.return_leg {
            let back = VariableTemperatureController::new(self.settings.clone())
                .run(&request.reversed(), &mut *controller, &mut ctx)
                .await?;
            legs.push(back);
        }

        tlx.move_to(self.plan.tlx_park).await?;

        Ok(SampleReport {
            sample_id: sample.id.clone(),
            log_path,
            legs,
        })
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
