//! Destinations for the outbound control stream

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::OutboundMessage;
use crate::clock::Clock;

/// Receiver of outbound control messages
///
/// Sending never fails from the caller's point of view: a message that
/// cannot be delivered is logged and dropped.
pub trait MessageSink: Send + Sync {
    fn send(&self, message: &OutboundMessage);
}

/// Sends each message as one OSC packet over UDP
pub struct OscSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl OscSink {
    pub fn new(target: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").context("Failed to bind OSC send socket")?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl MessageSink for OscSink {
    fn send(&self, message: &OutboundMessage) {
        let buf = match rosc::encoder::encode(&message.to_packet()) {
            Ok(buf) => buf,
            Err(e) => {
                warn!("Failed to encode {}: {}", message.address(), e);
                return;
            }
        };

        match self.socket.send_to(&buf, self.target) {
            Ok(_) => debug!("OSC -> {:?}", message),
            Err(e) => warn!("Failed to send {} to {}: {}", message.address(), self.target, e),
        }
    }
}

/// Keeps every message in memory, optionally stamped with a clock reading
#[derive(Clone, Default)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<(u64, OutboundMessage)>>>,
    clock: Option<Arc<dyn Clock>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp each message with `clock.now_micros()`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            messages: Arc::default(),
            clock: Some(clock),
        }
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    /// Messages with their send time in microseconds
    pub fn timed(&self) -> Vec<(u64, OutboundMessage)> {
        self.messages.lock().clone()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl MessageSink for MemorySink {
    fn send(&self, message: &OutboundMessage) {
        let at = self.clock.as_ref().map(|c| c.now_micros()).unwrap_or(0);
        self.messages.lock().push((at, message.clone()));
    }
}
