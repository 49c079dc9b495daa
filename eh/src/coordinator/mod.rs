//! Hub coordinator
//!
//! A single task owns presence and session state. Module messages, operator
//! actions and liveness ticks all arrive as [`CoordRequest`]s on one channel
//! and are applied in arrival order; broadcasts leave through the outbox.

mod config;
mod core;
mod handle;
mod messages;

pub use config::CoordinatorConfig;
pub use core::Coordinator;
pub use handle::CoordinatorHandle;
pub use messages::{CoordRequest, CoordinatorMetrics, HubError, HubSnapshot};
