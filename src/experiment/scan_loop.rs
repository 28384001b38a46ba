//! Bounded scan-and-poll loop.
//!
//! Every scanning procedure runs the same loop: trigger a scan, read the
//! context value (temperature), log the pair, test the stop condition. The
//! loop runs at most `max_iterations` times. Once the stop condition first
//! holds it performs a finalization burst of `finalize_count` more scans with
//! no further checks. If the budget runs out first there is no burst, and the
//! caller carries on: an exhausted budget is reported, not raised.
//!
//! A scan rejected with `VtError::ScanSyntax` is absorbed according to the
//! session's `ScanErrorPolicy` and produces no log line. Any other error ends
//! the loop.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{VtError, VtResult};
use crate::experiment::abort::AbortFlag;
use crate::experiment::scan_log::ScanLogger;
use crate::hardware::capabilities::{Clock, FileNumberIssuer, ScanTrigger, TemperatureController};
use crate::hardware::detector::ScanCommand;

/// Source of the value logged next to each file number.
#[async_trait]
pub trait ContextProbe: Send {
    async fn poll(&mut self) -> VtResult<f64>;
}

#[async_trait]
impl<T: TemperatureController + ?Sized> ContextProbe for T {
    async fn poll(&mut self) -> VtResult<f64> {
        self.current_temperature().await
    }
}

/// What to do when the scan trigger reports a syntax error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanErrorPolicy {
    /// Pause before the loop continues (seconds)
    #[serde(default)]
    pub pause_secs: f64,
    /// Log rejected scans at error level. Lenient sessions log them at debug.
    #[serde(default)]
    pub strict: bool,
}

impl Default for ScanErrorPolicy {
    fn default() -> Self {
        Self {
            pause_secs: 0.0,
            strict: false,
        }
    }
}

impl ScanErrorPolicy {
    pub fn strict(pause: Duration) -> Self {
        Self {
            pause_secs: pause.as_secs_f64(),
            strict: true,
        }
    }

    pub fn lenient() -> Self {
        Self::default()
    }

    /// Pause after a rejected scan. Out-of-range values mean no pause.
    pub fn pause(&self) -> Duration {
        Duration::try_from_secs_f64(self.pause_secs).unwrap_or(Duration::ZERO)
    }
}

/// Devices and sinks one scanning procedure works with.
pub struct ScanContext<'a, W: Write> {
    trigger: &'a mut dyn ScanTrigger,
    issuer: &'a mut dyn FileNumberIssuer,
    logger: &'a mut ScanLogger<W>,
    clock: &'a dyn Clock,
    command: ScanCommand,
    policy: ScanErrorPolicy,
    abort: AbortFlag,
}

impl<'a, W: Write + Send> ScanContext<'a, W> {
    /// Context running the default PSD scan with a lenient policy.
    pub fn new(
        trigger: &'a mut dyn ScanTrigger,
        issuer: &'a mut dyn FileNumberIssuer,
        logger: &'a mut ScanLogger<W>,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            trigger,
            issuer,
            logger,
            clock,
            command: ScanCommand::psd(6.0),
            policy: ScanErrorPolicy::default(),
            abort: AbortFlag::new(),
        }
    }

    pub fn with_command(mut self, command: ScanCommand) -> Self {
        self.command = command;
        self
    }

    pub fn with_policy(mut self, policy: ScanErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_abort(mut self, abort: AbortFlag) -> Self {
        self.abort = abort;
        self
    }

    pub fn command(&self) -> &ScanCommand {
        &self.command
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock
    }

    pub fn abort(&self) -> &AbortFlag {
        &self.abort
    }

    pub fn logger(&mut self) -> &mut ScanLogger<W> {
        self.logger
    }

    /// Trigger one scan and claim its file number.
    ///
    /// Returns `None` when the scan was rejected as malformed and the policy
    /// absorbed it.
    pub async fn acquire(&mut self, command: &ScanCommand) -> VtResult<Option<u64>> {
        match self.trigger.trigger(command).await {
            Ok(()) => Ok(Some(self.issuer.next_file_number().await?)),
            Err(VtError::ScanSyntax(msg)) => {
                if self.policy.strict {
                    error!(error = %msg, "Syntax error in scan command");
                } else {
                    debug!(error = %msg, "Scan command rejected");
                }
                self.clock.sleep(self.policy.pause()).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Scan, poll the context, log the pair.
    async fn scan_and_log<P>(&mut self, probe: &mut P, outcome: &mut LoopOutcome) -> VtResult<f64>
    where
        P: ContextProbe + ?Sized,
    {
        let command = self.command.clone();
        let file_number = self.acquire(&command).await?;
        let context = probe.poll().await?;

        match file_number {
            Some(file_number) => {
                self.logger.record(file_number, context)?;
                outcome.scans += 1;
            }
            None => outcome.rejected_scans += 1,
        }
        outcome.last_context = Some(context);
        Ok(context)
    }
}

/// Iteration budget of one loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopLimits {
    pub max_iterations: u32,
    pub finalize_count: u32,
}

/// What a loop did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoopOutcome {
    /// Main-phase iterations performed
    pub iterations: u32,
    /// Scans logged, including the finalization burst
    pub scans: u32,
    /// Scans absorbed as syntax errors
    pub rejected_scans: u32,
    pub stop_reached: bool,
    /// Finalization iterations performed
    pub finalization_scans: u32,
    /// Most recent context reading
    pub last_context: Option<f64>,
}

impl LoopOutcome {
    /// The loop ran out of iterations before its stop condition held.
    pub fn budget_exhausted(&self) -> bool {
        !self.stop_reached
    }

    /// Scan triggers attempted.
    pub fn attempts(&self) -> u32 {
        self.iterations + self.finalization_scans
    }
}

/// The bounded scan-and-poll loop.
#[derive(Debug, Clone, Copy)]
pub struct BoundedScanLoop {
    limits: LoopLimits,
}

impl BoundedScanLoop {
    pub fn new(max_iterations: u32, finalize_count: u32) -> Self {
        Self {
            limits: LoopLimits {
                max_iterations,
                finalize_count,
            },
        }
    }

    pub fn limits(&self) -> LoopLimits {
        self.limits
    }

    /// Main phase followed, if the stop condition held, by the finalization burst.
    pub async fn run<W, P, F>(
        &self,
        ctx: &mut ScanContext<'_, W>,
        probe: &mut P,
        stop: F,
    ) -> VtResult<LoopOutcome>
    where
        W: Write + Send,
        P: ContextProbe + ?Sized,
        F: FnMut(f64) -> bool,
    {
        let mut outcome = self.run_until(ctx, probe, stop).await?;
        if outcome.stop_reached {
            self.finalize(ctx, probe, &mut outcome).await?;
        }
        Ok(outcome)
    }

    /// Main phase only: scan until `stop` holds or the budget is spent.
    pub async fn run_until<W, P, F>(
        &self,
        ctx: &mut ScanContext<'_, W>,
        probe: &mut P,
        mut stop: F,
    ) -> VtResult<LoopOutcome>
    where
        W: Write + Send,
        P: ContextProbe + ?Sized,
        F: FnMut(f64) -> bool,
    {
        let mut outcome = LoopOutcome::default();

        while outcome.iterations < self.limits.max_iterations {
            ctx.abort.check()?;
            outcome.iterations += 1;

            let context = ctx.scan_and_log(probe, &mut outcome).await?;
            if stop(context) {
                outcome.stop_reached = true;
                break;
            }
        }

        if !outcome.stop_reached {
            warn!(
                max_iterations = self.limits.max_iterations,
                last = ?outcome.last_context,
                "Scan budget exhausted before stop condition"
            );
        }
        Ok(outcome)
    }

    /// The finalization burst: `finalize_count` unconditional scans.
    pub async fn finalize<W, P>(
        &self,
        ctx: &mut ScanContext<'_, W>,
        probe: &mut P,
        outcome: &mut LoopOutcome,
    ) -> VtResult<()>
    where
        W: Write + Send,
        P: ContextProbe + ?Sized,
    {
        info!(
            count = self.limits.finalize_count,
            "Performing final scans"
        );
        for _ in 0..self.limits.finalize_count {
            ctx.abort.check()?;
            outcome.finalization_scans += 1;
            ctx.scan_and_log(probe, outcome).await?;
        }
        Ok(())
    }
}
