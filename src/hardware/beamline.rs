//! Beamline-wide state: acquisition file numbering, beam shutter, spinner.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{VtError, VtResult};
use crate::hardware::capabilities::FileNumberIssuer;

/// In-memory file counter used by simulation sessions.
#[derive(Debug, Clone)]
pub struct Beamline {
    next: u64,
    last: Option<u64>,
}

impl Beamline {
    /// The first issued number will be `first_file_number`.
    pub fn new(first_file_number: u64) -> Self {
        Self {
            next: first_file_number,
            last: None,
        }
    }

    /// Last issued number, if any.
    pub fn last_file_number(&self) -> Option<u64> {
        self.last
    }
}

impl Default for Beamline {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl FileNumberIssuer for Beamline {
    async fn next_file_number(&mut self) -> VtResult<u64> {
        let issued = self.next;
        self.next = issued
            .checked_add(1)
            .ok_or_else(|| VtError::Device("File numbers exhausted".to_string()))?;
        self.last = Some(issued);
        Ok(issued)
    }
}

/// File counter persisted in a plain text file.
///
/// The file holds the last issued number. Each call reads it, increments,
/// and replaces it before returning, so a restarted session never reuses a
/// number. The new value is synced to a sibling `.tmp` file and renamed over
/// the tracker, which therefore always holds a complete number.
#[derive(Debug, Clone)]
pub struct NumTracker {
    path: PathBuf,
}

impl NumTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "numtracker".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn last(&self) -> VtResult<u64> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text.trim().parse::<u64>().map_err(|_| {
                VtError::Device(format!(
                    "Corrupt file number tracker {}: '{}'",
                    self.path.display(),
                    text.trim()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl FileNumberIssuer for NumTracker {
    async fn next_file_number(&mut self) -> VtResult<u64> {
        let next = self.last().await?.checked_add(1).ok_or_else(|| {
            VtError::Device(format!("File numbers exhausted in {}", self.path.display()))
        })?;

        let staging = self.staging_path();
        let mut file = tokio::fs::File::create(&staging).await?;
        file.write_all(format!("{}\n", next).as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&staging, &self.path).await?;

        debug!(file_number = next, tracker = %self.path.display(), "Issued file number");
        Ok(next)
    }
}

/// Beam shutter state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Beam {
    on: bool,
}

impl Beam {
    pub fn on(&mut self) {
        info!("Beam on");
        self.on = true;
    }

    pub fn off(&mut self) {
        info!("Beam off");
        self.on = false;
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

/// Capillary spinner state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Spinner {
    spinning: bool,
}

impl Spinner {
    pub fn on(&mut self) {
        info!("Spinner on");
        self.spinning = true;
    }

    pub fn off(&mut self) {
        info!("Spinner off");
        self.spinning = false;
    }

    pub fn is_spinning(&self) -> bool {
        self.spinning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn beamline_counts_from_first_number() {
        let mut beamline = Beamline::new(1407330);
        assert_eq!(beamline.next_file_number().await.unwrap(), 1407330);
        assert_eq!(beamline.next_file_number().await.unwrap(), 1407331);
        assert_eq!(beamline.last_file_number(), Some(1407331));
    }

    #[tokio::test]
    async fn beamline_can_start_at_zero() {
        let mut beamline = Beamline::new(0);
        assert_eq!(beamline.last_file_number(), None);
        assert_eq!(beamline.next_file_number().await.unwrap(), 0);
        assert_eq!(beamline.next_file_number().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn num_tracker_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i11.tracker");

        let mut tracker = NumTracker::new(&path);
        assert_eq!(tracker.next_file_number().await.unwrap(), 1);
        assert_eq!(tracker.next_file_number().await.unwrap(), 2);

        let mut reopened = NumTracker::new(&path);
        assert_eq!(reopened.next_file_number().await.unwrap(), 3);
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "3");
        assert!(!dir.path().join("i11.tracker.tmp").exists());
    }

    #[tokio::test]
    async fn interrupted_write_leaves_tracker_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i11.tracker");
        std::fs::write(&path, "41\n").unwrap();
        // Staging file left behind by a session that died before the rename
        std::fs::write(dir.path().join("i11.tracker.tmp"), "").unwrap();

        let mut tracker = NumTracker::new(&path);
        assert_eq!(tracker.next_file_number().await.unwrap(), 42);
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "42");
    }

    #[tokio::test]
    async fn corrupt_tracker_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i11.tracker");
        std::fs::write(&path, "not-a-number").unwrap();

        let err = NumTracker::new(&path).next_file_number().await.unwrap_err();
        assert!(matches!(err, VtError::Device(_)));
    }

    #[test]
    fn ancillaries_toggle() {
        let mut beam = Beam::default();
        let mut spinner = Spinner::default();
        beam.on();
        spinner.on();
        assert!(beam.is_on() && spinner.is_spinning());
        beam.off();
        spinner.off();
        assert!(!beam.is_on() && !spinner.is_spinning());
    }
}
