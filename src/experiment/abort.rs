//! Operator abort.
//!
//! Scan loops are bounded by their iteration cap. The abort flag adds a way to
//! stop a long unattended ramp from outside (Ctrl-C in the CLI). It is checked
//! before every soak poll and every scan.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{VtError, VtResult};

/// A shared flag for requesting an abort.
#[derive(Clone, Debug)]
pub struct AbortFlag {
    flag: Arc<AtomicBool>,
    reason: Arc<RwLock<Option<String>>>,
}

impl Default for AbortFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortFlag {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            reason: Arc::new(RwLock::new(None)),
        }
    }

    /// Request an abort.
    pub fn trigger(&self, reason: impl Into<String>) {
        if let Ok(mut r) = self.reason.write() {
            *r = Some(reason.into());
        }
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.read().ok().and_then(|r| r.clone())
    }

    /// `Err(VtError::Aborted)` once triggered.
    pub fn check(&self) -> VtResult<()> {
        if self.is_triggered() {
            let reason = self.reason().unwrap_or_else(|| "abort requested".to_string());
            return Err(VtError::Aborted(reason));
        }
        Ok(())
    }
}
