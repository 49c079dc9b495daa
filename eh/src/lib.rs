//! escapehub - presence detection and session coordination for escape rooms
//!
//! A hub tracks which game modules are reachable from their liveness signals,
//! activates a shared session once every module is present, pauses it when
//! one drops out and resumes it when all are back.
//!
//! # Core Concepts
//!
//! - **Presence is time-based**: only the liveness monitor declares a module
//!   lost, after a configured number of consecutive stale evaluations
//! - **One serialization point**: the coordinator task applies every inbound
//!   event and tick in order
//! - **Fire-and-forget commands**: broadcasts go to every required module,
//!   delivery failures never reach session state
//!
//! # Modules
//!
//! - [`presence`] - Presence tracker, liveness monitor and ticker
//! - [`session`] - Activation gate, pause/resume and victory bookkeeping
//! - [`dispatch`] - Outbound commands and the dispatcher contract
//! - [`coordinator`] - The hub actor tying them together
//! - [`transport`] - Line-delimited JSON over TCP
//! - [`events`] - Event bus and journal
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod domain;
pub mod events;
pub mod presence;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, DispatchConfig, LivenessConfig, SessionConfig, TransportConfig};
pub use coordinator::{CoordRequest, Coordinator, CoordinatorConfig, CoordinatorHandle, CoordinatorMetrics, HubError, HubSnapshot};
pub use dispatch::{Broadcast, ChannelDispatcher, Command, CommandKind, Dispatcher, PacedDispatcher, Publisher};
pub use domain::{DeviceId, ParseIdError, TaskId};
pub use events::{EventBus, EventJournal, EventLogEntry, HubEvent};
pub use presence::{DeviceStatus, LivenessMonitor, LivenessTicker, PresenceTracker, PresenceTransition};
pub use session::{PauseReason, Presence, Session, SessionPhase, SessionStatus};
pub use transport::{Inbound, ProtocolError, Server, TcpPublisher};
