//! Presence detection
//!
//! The [`PresenceTracker`] holds one record per required module. The
//! [`LivenessMonitor`] turns elapsed time into `Lost`/`Recovered` transitions,
//! and the [`LivenessTicker`] drives it on a fixed period by feeding ticks into
//! the coordinator queue.

mod monitor;
mod ticker;
mod tracker;

pub use monitor::{LivenessMonitor, PresenceTransition};
pub use ticker::LivenessTicker;
pub use tracker::{DeviceRecord, DeviceStatus, PresenceTracker};
