//! Append-only scan log and experiment journal.
//!
//! The scan log is the primary record of a variable-temperature experiment:
//! one whitespace-delimited line per acquisition, `<file_number> <context>`,
//! where the context is the temperature (ramp experiments) or a position
//! (room-temperature batches use a longer line, see `batch`). Every line is
//! flushed as soon as it is written, so a crash loses at most the scan in
//! flight. A failed write is fatal to the loop that issued it.
//!
//! The journal is a free-text notebook for humans, flushed the same way.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::{VtError, VtResult};

/// One logged acquisition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRecord {
    pub file_number: u64,
    /// Temperature or linear position, depending on the experiment
    pub context_value: f64,
    /// Wall-clock time of the write (not persisted in the line)
    pub timestamp: DateTime<Local>,
}

impl fmt::Display for ScanRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.file_number, self.context_value)
    }
}

/// Flushed, file-number-ordered scan log.
pub struct ScanLogger<W: Write> {
    writer: W,
    last_file_number: Option<u64>,
    records_written: u64,
}

impl ScanLogger<BufWriter<File>> {
    /// Open `path` for appending, creating it if needed.
    pub fn append_to(path: impl AsRef<Path>) -> VtResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(VtError::LogWrite)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> ScanLogger<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            last_file_number: None,
            records_written: 0,
        }
    }

    /// Append `<file_number> <context_value>`.
    pub fn record(&mut self, file_number: u64, context_value: f64) -> VtResult<ScanRecord> {
        let record = ScanRecord {
            file_number,
            context_value,
            timestamp: Local::now(),
        };
        self.append(file_number, &record)?;
        Ok(record)
    }

    /// Append an arbitrary line for `file_number`.
    ///
    /// File numbers must strictly increase across calls.
    pub fn append(&mut self, file_number: u64, line: impl fmt::Display) -> VtResult<()> {
        if let Some(previous) = self.last_file_number {
            if file_number <= previous {
                return Err(VtError::FileNumberRegression {
                    previous,
                    got: file_number,
                });
            }
        }

        writeln!(self.writer, "{}", line).map_err(VtError::LogWrite)?;
        self.writer.flush().map_err(VtError::LogWrite)?;

        self.last_file_number = Some(file_number);
        self.records_written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn last_file_number(&self) -> Option<u64> {
        self.last_file_number
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

impl<W: Write> Drop for ScanLogger<W> {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Free-text experiment notebook.
pub struct Journal<W: Write> {
    writer: W,
}

impl Journal<BufWriter<File>> {
    /// Open `path` for appending, creating it if needed.
    pub fn append_to(path: impl AsRef<Path>) -> VtResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(VtError::LogWrite)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> Journal<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one line and flush.
    pub fn note(&mut self, text: impl fmt::Display) -> VtResult<()> {
        writeln!(self.writer, "{}", text).map_err(VtError::LogWrite)?;
        self.writer.flush().map_err(VtError::LogWrite)
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

impl<W: Write> Drop for Journal<W> {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
