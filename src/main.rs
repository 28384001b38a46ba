//! CLI Entry Point for vt-scan
//!
//! Runs variable-temperature procedures against the configured station:
//! - `ramp`: two-phase soak-then-ramp session, optionally followed by the return leg
//! - `hot-air`: single-phase hot air blower ramp up or down
//! - `batch`: room-temperature CSV batch
//! - `campaign`: multi-sample heating campaign from the configuration file
//!
//! # Usage
//!
//! ```bash
//! vt-scan --simulate ramp --start 30 --target 600 --return-leg
//! vt-scan hot-air down --target 30
//! vt-scan --config config/vt_scan.toml batch samples.csv
//! ```
//!
//! Ctrl-C raises the abort flag. The running procedure stops at its next
//! scan or poll and the scan log keeps every line written so far.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};

use vt_scan::config::{DeviceMode, VtConfig, DEFAULT_CONFIG_PATH};
use vt_scan::experiment::batch::RoomTemperatureBatch;
use vt_scan::experiment::campaign::{heating_log_name, Campaign};
use vt_scan::experiment::hot_air::{HotAirDirection, HotAirRamp};
use vt_scan::experiment::{AbortFlag, Journal, RampRequest, ScanLogger, VariableTemperatureController};
use vt_scan::logging;
use vt_scan::station::{Station, StationParts};

#[derive(Parser)]
#[command(name = "vt-scan")]
#[command(about = "Variable-temperature scan control", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use simulated devices regardless of configuration
    #[arg(long)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Soak at the start temperature, then scan while ramping to the target
    Ramp {
        #[arg(long)]
        start: f64,
        #[arg(long)]
        target: f64,
        /// Ramp rate magnitude (degrees/s), defaults to configuration
        #[arg(long)]
        rate: Option<f64>,
        #[arg(long)]
        max_scans: Option<u32>,
        /// Sample id used in the log file name
        #[arg(long, default_value = "sample")]
        sample_id: String,
        /// Ramp back to the start temperature afterwards
        #[arg(long)]
        return_leg: bool,
    },

    /// Hot air blower ramp without a soak phase
    HotAir {
        #[arg(value_enum)]
        direction: Direction,
        #[arg(long)]
        target: f64,
        #[arg(long)]
        rate: Option<f64>,
        #[arg(long, default_value = "sample")]
        sample_id: String,
    },

    /// Room-temperature scans of the samples listed in a CSV file
    Batch {
        /// CSV with header position,sample_id,exposure_time,spos
        csv: PathBuf,
    },

    /// Heat every sample of the configured campaign
    Campaign,
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    Up,
    Down,
}

impl From<Direction> for HotAirDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Up => HotAirDirection::Up,
            Direction::Down => HotAirDirection::Down,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = VtConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if cli.simulate {
        config.device.mode = DeviceMode::Simulated;
    }
    config.validate()?;
    logging::init_from_config(&config)?;

    info!(
        application = %config.application.name,
        mode = ?config.device.mode,
        controller = ?config.device.controller,
        "Starting"
    );

    let abort = AbortFlag::new();
    spawn_interrupt_handler(abort.clone());

    let mut station = Station::from_config(&config)?.with_abort(abort);
    tokio::fs::create_dir_all(&config.output.directory)
        .await
        .with_context(|| {
            format!(
                "Failed to create output directory {}",
                config.output.directory.display()
            )
        })?;

    match cli.command {
        Commands::Ramp {
            start,
            target,
            rate,
            max_scans,
            sample_id,
            return_leg,
        } => {
            let mut request = RampRequest::with_settings(start, target, &config.ramp);
            if let Some(rate) = rate {
                request = request.with_ramp_rate(rate);
            }
            if let Some(max_scans) = max_scans {
                request = request.with_max_scans(max_scans);
            }

            let log_path = config
                .output
                .directory
                .join(heating_log_name(&sample_id, start, target));
            let mut logger = ScanLogger::append_to(&log_path)?;
            let StationParts {
                controller, mut ctx, ..
            } = station.parts(&mut logger);

            let mut reports = vec![
                VariableTemperatureController::new(config.ramp.clone())
                    .run(&request, &mut *controller, &mut ctx)
                    .await?,
            ];
            if return_leg {
                reports.push(
                    VariableTemperatureController::new(config.ramp.clone())
                        .run(&request.reversed(), &mut *controller, &mut ctx)
                        .await?,
                );
            }
            print_report(&reports)?;
        }

        Commands::HotAir {
            direction,
            target,
            rate,
            sample_id,
        } => {
            let mut ramp = HotAirRamp::new(direction.into(), target, &config.ramp);
            if let Some(rate) = rate {
                ramp = ramp.with_ramp_rate(rate);
            }

            let log_path = config
                .output
                .directory
                .join(format!("{}_hot_air_{}C.log", sample_id, target));
            let mut logger = ScanLogger::append_to(&log_path)?;
            let StationParts {
                controller, mut ctx, ..
            } = station.parts(&mut logger);

            let outcome = ramp.run(controller, &mut ctx).await?;
            if outcome.budget_exhausted() {
                warn!(target, "Hot air ramp ended before reaching the target");
            }
            print_report(&outcome)?;
        }

        Commands::Batch { csv } => {
            let batch = RoomTemperatureBatch::from_csv(&csv)
                .with_context(|| format!("Failed to read batch file {}", csv.display()))?;

            let mut logger = ScanLogger::append_to(config.output.batch_log_path())?;
            let StationParts {
                sample, spos, mut ctx, ..
            } = station.parts(&mut logger);

            let outcome = batch.run(sample, spos, &mut ctx).await?;
            print_report(&outcome)?;
        }

        Commands::Campaign => {
            let mut journal = Journal::append_to(config.output.journal_path())?;
            let campaign = Campaign::new(
                config.campaign.clone(),
                config.ramp.clone(),
                config.output.directory.clone(),
            );
            let report = campaign.run(&mut station, &mut journal).await?;
            print_report(&report)?;
        }
    }

    Ok(())
}

fn spawn_interrupt_handler(abort: AbortFlag) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, aborting at the next scan");
                abort.trigger("Interrupted by operator");
            }
            Err(e) => warn!(error = %e, "Unable to listen for interrupts"),
        }
    });
}

fn print_report<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
