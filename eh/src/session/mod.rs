//! Game session coordination
//!
//! Owns the one-time activation gate, pause/resume bookkeeping and per-task
//! completion flags. Pure state: commands come back as return values and the
//! coordinator actor decides where they go.

mod state;

pub use state::{PauseReason, Presence, Session, SessionPhase, SessionStatus};
