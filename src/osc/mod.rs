//! OSC transport to and from the synthesis engine
//!
//! Outbound: every state change becomes one [`OutboundMessage`] handed to a
//! [`MessageSink`]. Inbound: the engine's `/led` and `/refresh` requests are
//! decoded by the [`listener`] task and queued for the main loop.

pub mod listener;
pub mod message;
pub mod sink;

pub use listener::{spawn_listener, Request};
pub use message::OutboundMessage;
pub use sink::{MemorySink, MessageSink, OscSink};
