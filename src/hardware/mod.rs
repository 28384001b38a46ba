//! Beamline Hardware
//!
//! Capability traits plus the real (EPICS / external command) and simulated
//! adapters for every device a variable-temperature session touches.

pub mod beamline;
pub mod capabilities;
pub mod channel;
pub mod clock;
pub mod cryostream;
pub mod detector;
pub mod ramp;
pub mod sample;

pub use capabilities::{
    Clock, FileNumberIssuer, PvWriter, ScanTrigger, TemperatureController, TemperatureSensor,
};
pub use channel::{CommandChannel, DeviceParameter, RampChannels};
pub use ramp::RampState;
