//! Room-temperature CSV batch.
//!
//! Each row of the batch file names a carousel position, a sample id, an
//! exposure time and a sample-stage offset:
//!
//! ```text
//! position,sample_id,exposure_time,spos
//! 1,LiFePO4_A,6,0.0
//! 2,LiFePO4_B,12,1.5
//! ```
//!
//! Rows run in order. Each loads the sample, moves `spos`, takes one PSD scan
//! and appends a descriptive line to the scan log. The sample is released once
//! the batch is done, or when it fails part way.

use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::VtResult;
use crate::experiment::limits::BATCH_PAUSE;
use crate::experiment::scan_loop::ScanContext;
use crate::hardware::sample::{Motor, SampleProxy};

/// One row of the batch file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRow {
    pub position: u32,
    pub sample_id: String,
    /// Seconds per scan point
    pub exposure_time: f64,
    /// Sample stage offset (mm)
    pub spos: f64,
}

/// Read batch rows from a CSV file with a header line.
pub fn read_rows(path: impl AsRef<Path>) -> VtResult<Vec<BatchRow>> {
    let file = std::fs::File::open(path.as_ref())?;
    parse_rows(file)
}

/// Read batch rows from any CSV source with a header line.
pub fn parse_rows<R: Read>(reader: R) -> VtResult<Vec<BatchRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Scan log line for one batch acquisition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchRecord {
    pub file_number: u64,
    pub sample_id: String,
    pub position: u32,
    /// Total counting time of the PSD scan (two points)
    pub counting_time: f64,
    pub spos: f64,
    pub timestamp: DateTime<Local>,
}

impl fmt::Display for BatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} seconds PSD scan at room temperature, spos = {} mm, {}",
            self.file_number,
            self.sample_id,
            self.position,
            self.counting_time,
            self.spos,
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.6f")
        )
    }
}

/// What a batch did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub records: Vec<BatchRecord>,
    /// Rows whose scan was rejected as malformed
    pub rejected: Vec<String>,
}

/// Runs batch rows one after another at room temperature.
#[derive(Debug, Clone)]
pub struct RoomTemperatureBatch {
    rows: Vec<BatchRow>,
}

impl RoomTemperatureBatch {
    pub fn new(rows: Vec<BatchRow>) -> Self {
        Self { rows }
    }

    pub fn from_csv(path: impl AsRef<Path>) -> VtResult<Self> {
        Ok(Self::new(read_rows(path)?))
    }

    pub fn rows(&self) -> &[BatchRow] {
        &self.rows
    }

    pub async fn run<W: Write + Send>(
        &self,
        sample: &mut SampleProxy,
        spos: &mut Motor,
        ctx: &mut ScanContext<'_, W>,
    ) -> VtResult<BatchOutcome> {
        info!(rows = self.rows.len(), "Starting room temperature batch");
        let result = self.run_rows(sample, spos, ctx).await;
        sample.clear_sample();
        result
    }

    async fn run_rows<W: Write + Send>(
        &self,
        sample: &mut SampleProxy,
        spos: &mut Motor,
        ctx: &mut ScanContext<'_, W>,
    ) -> VtResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for row in &self.rows {
            ctx.abort().check()?;
            info!(sample = %row.sample_id, position = row.position, "Measuring");

            sample.move_to(f64::from(row.position)).await;
            spos.move_to(row.spos).await?;

            let command = ctx.command().with_exposure(row.exposure_time);
            match ctx.acquire(&command).await? {
                Some(file_number) => {
                    let record = BatchRecord {
                        file_number,
                        sample_id: row.sample_id.clone(),
                        position: row.position,
                        counting_time: 2.0 * row.exposure_time,
                        spos: row.spos,
                        timestamp: Local::now(),
                    };
                    ctx.logger().append(file_number, &record)?;
                    outcome.records.push(record);
                }
                None => {
                    warn!(sample = %row.sample_id, "Scan rejected, no record written");
                    outcome.rejected.push(row.sample_id.clone());
                }
            }

            ctx.clock().sleep(BATCH_PAUSE).await;
        }
        Ok(outcome)
    }
}
