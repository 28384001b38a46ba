//! Custom error types for the application.
//!
//! This module defines the primary error type, `VtError`, for the whole crate.
//! Using the `thiserror` crate, it provides a consistent way to report the
//! conditions a variable-temperature experiment can run into, from a ramp
//! started without a rate to a scan log that can no longer be written.
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: Semantic configuration problems. Starting a ramp with a
//!   zero rate lands here. Fatal to the current controller session.
//! - **`ScanSyntax`**: The scan trigger rejected a malformed scan command. This is
//!   the only recoverable variant: scan loops pause and carry on.
//! - **`LogWrite`**: Appending or flushing a scan record failed. Fatal, because
//!   continuing without a durable record risks silent data loss.
//! - **`FileNumberRegression`**: A file number arrived out of order for the scan
//!   log. Fatal, the log must stay ordered by file number.
//! - **`Device`**: Command channel, sensor or motion failures.
//! - **`Aborted`**: An operator raised the abort flag.
//! - **`Io`**, **`Config`**, **`Csv`**: Wrapped errors from the standard library,
//!   `figment` and the `csv` reader.
//!
//! Two conditions deliberately have no variant. Writes to a parameter outside the
//! known whitelist only produce a warning, and a scan loop that exhausts its
//! iteration budget reports it through `LoopOutcome::budget_exhausted`.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type VtResult<T> = std::result::Result<T, VtError>;

#[derive(Error, Debug)]
pub enum VtError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Scan syntax error: {0}")]
    ScanSyntax(String),

    #[error("Failed to write scan log: {0}")]
    LogWrite(#[source] std::io::Error),

    #[error("File number {got} does not follow previously logged file number {previous}")]
    FileNumberRegression { previous: u64, got: u64 },

    #[error("Device error: {0}")]
    Device(String),

    #[error("Experiment aborted: {0}")]
    Aborted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration loading error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl VtError {
    /// Whether a scan loop may absorb this error and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, VtError::ScanSyntax(_))
    }
}

impl From<figment::Error> for VtError {
    fn from(value: figment::Error) -> Self {
        VtError::Config(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_scan_syntax_is_recoverable() {
        assert!(VtError::ScanSyntax("scan delta".into()).is_recoverable());
        assert!(!VtError::Configuration("No ramp rate set".into()).is_recoverable());
        assert!(!VtError::LogWrite(std::io::Error::other("disk full")).is_recoverable());
        assert!(!VtError::Aborted("operator".into()).is_recoverable());
    }

    #[test]
    fn regression_message_names_both_numbers() {
        let err = VtError::FileNumberRegression {
            previous: 1407334,
            got: 1407330,
        };
        let msg = err.to_string();
        assert!(msg.contains("1407334"));
        assert!(msg.contains("1407330"));
    }
}
