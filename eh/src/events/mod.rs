//! Event bus for hub observability
//!
//! Every presence transition, task completion, reset and outbound command is
//! published as a [`HubEvent`]. The binary journals them to a JSONL file;
//! tests subscribe to assert on them.
//!
//! ```text
//!   Coordinator ──emit──▶ EventBus (tokio broadcast) ──▶ EventJournal (events.jsonl)
//!                                                  └───▶ tests / observers
//! ```

mod bus;
mod journal;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus};
pub use journal::{EventJournal, read_journal};
pub use types::{EventLogEntry, HubEvent};
