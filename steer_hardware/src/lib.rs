//! Drive-side collaborators for the steering core.
//!
//! The field-bus transport itself lives outside this workspace; this crate
//! carries the error vocabulary a transport reports (`HwError`, SDO abort
//! codes) and `SimulatedDrive`, an `ObjectChannel` for bench and CI runs.
pub mod error;
pub mod sim;

pub use error::HwError;
pub use sim::{PowerState, SimulatedDrive};
