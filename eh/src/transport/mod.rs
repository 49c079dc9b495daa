//! Line-delimited JSON over TCP
//!
//! Modules and operator consoles connect to one listener. Inbound lines are
//! classified and forwarded to the coordinator; [`TcpPublisher`] delivers
//! outbound command payloads back over the same connections.

mod protocol;
mod server;

pub use protocol::{Inbound, MAX_LINE_SIZE, OperatorAction, ProtocolError, classify};
pub use server::{Server, TcpPublisher};
