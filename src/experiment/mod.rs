//! Experiment Procedures
//!
//! The scanning procedures of a variable-temperature session and the pieces
//! they share:
//!
//! - `scan_loop`: the bounded scan-and-poll loop every procedure runs
//! - `controller`: two-phase soak-then-ramp controller
//! - `hot_air`: single-phase hot air blower ramps
//! - `batch`: room-temperature CSV batches
//! - `campaign`: multi-sample heating campaigns
//! - `scan_log`: flushed scan log and journal
//! - `target`, `limits`, `abort`: stop predicates, tunables, cancellation

pub mod abort;
pub mod batch;
pub mod campaign;
pub mod controller;
pub mod hot_air;
pub mod limits;
pub mod scan_log;
pub mod scan_loop;
pub mod target;

pub use abort::AbortFlag;
pub use controller::{ControllerState, RampReport, RampRequest, VariableTemperatureController};
pub use limits::RampSettings;
pub use scan_log::{Journal, ScanLogger, ScanRecord};
pub use scan_loop::{BoundedScanLoop, LoopOutcome, ScanContext, ScanErrorPolicy};
