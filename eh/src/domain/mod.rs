//! Domain types for escapehub
//!
//! Closed identity enumerations for the game modules and the tasks they
//! report. Which members are required in a deployment is configuration.

mod device;
mod task;

pub use device::{DeviceId, ParseIdError};
pub use task::TaskId;
