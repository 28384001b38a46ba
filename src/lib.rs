//! # Variable-Temperature Scan Control
//!
//! This crate drives in-situ heating and cooling experiments on a powder
//! diffraction beamline. A temperature controller (hot air blower or
//! cryostream) ramps the sample while detector scans are taken and logged
//! against the temperature at which each was acquired.
//!
//! ## Crate Structure
//!
//! - **`hardware`**: Capability traits for controllers, detectors, file-number
//!   issuers, PV writers and clocks, with EPICS and simulated implementations.
//! - **`experiment`**: The scan procedures. The bounded scan-and-poll loop, the
//!   two-phase soak-then-ramp controller, hot air ramps, room-temperature CSV
//!   batches and multi-sample campaigns.
//! - **`station`**: Builds the set of devices for a session from configuration.
//! - **`config`**: Figment-based configuration (TOML plus `VT_SCAN_` environment).
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: The crate-wide `VtError` type.

pub mod config;
pub mod error;
pub mod experiment;
pub mod hardware;
pub mod logging;
pub mod station;

pub use error::{VtError, VtResult};
