//! Command dispatch
//!
//! The coordinator only ever calls `broadcast(command, targets)`. How a
//! payload reaches a module is the [`Publisher`]'s business.

mod command;
mod dispatcher;
mod outbox;

pub use command::{Broadcast, Command, CommandKind};
pub use dispatcher::{ChannelDispatcher, Dispatcher, PacedDispatcher, Publisher};
pub use outbox::spawn_outbox;
