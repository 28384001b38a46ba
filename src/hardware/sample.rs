//! Sample changer and motor axes.
//!
//! `SampleProxy` models the carousel sample changer. Moving it to a carousel
//! position loads that sample into the beam and records where it came from
//! (`sample_in_position`), so it can later be returned there by `recover`.
//!
//! `Motor` is a named axis such as the `tlx` table translation. When it has a
//! PV, moves are written through the command channel. Otherwise it is a pure
//! bookkeeping axis.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::VtResult;
use crate::hardware::capabilities::Clock;
use crate::hardware::channel::CommandChannel;

/// Pause after the sample changer moves.
pub const SAMPLE_SETTLE: Duration = Duration::from_secs(1);

/// Carousel sample changer.
pub struct SampleProxy {
    name: String,
    position: f64,
    sample_in_position: Option<f64>,
    settle: Duration,
    clock: Arc<dyn Clock>,
}

impl SampleProxy {
    /// Changer named `sample`, parked at position 0 with nothing checked out.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            name: "sample".to_string(),
            position: 0.0,
            sample_in_position: None,
            settle: SAMPLE_SETTLE,
            clock,
        }
    }

    /// Override the post-move pause.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Carousel position of the sample currently checked out, if any.
    pub fn sample_in_position(&self) -> Option<f64> {
        self.sample_in_position
    }

    /// Check out the sample at the current position, unless one already is.
    pub fn start(&mut self) {
        if self.sample_in_position.is_none() {
            self.sample_in_position = Some(self.position);
        }
    }

    /// Load the sample at `position`.
    pub async fn move_to(&mut self, position: f64) {
        debug!(position, "Moving sample into position");
        self.clock.sleep(self.settle).await;
        self.position = position;
        self.sample_in_position = Some(position);
    }

    /// Return to the checked-out sample's position and release it.
    pub fn recover(&mut self) {
        if let Some(position) = self.sample_in_position.take() {
            self.position = position;
        }
    }

    /// Release the current sample.
    pub fn clear_sample(&mut self) {
        self.recover();
    }
}

/// A named motor axis.
pub struct Motor {
    name: String,
    pv: Option<String>,
    position: f64,
    channel: CommandChannel,
}

impl Motor {
    pub fn new(name: impl Into<String>, pv: Option<String>, position: f64, channel: CommandChannel) -> Self {
        Self {
            name: name.into(),
            pv,
            position,
            channel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Move to an absolute position.
    pub async fn move_to(&mut self, position: f64) -> VtResult<()> {
        debug!(motor = %self.name, from = self.position, to = position, "Moving motor");
        if let Some(pv) = &self.pv {
            self.channel.send(pv, Some(position)).await?;
        }
        self.position = position;
        Ok(())
    }
}
