//! Inbound OSC requests from the synthesis engine
//!
//! A tokio task owns the UDP socket, decodes packets and forwards the
//! requests it understands to the main loop over a crossbeam channel. The
//! main loop drains the channel once per iteration.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use crossbeam::channel::Sender;
use rosc::{OscMessage, OscPacket, OscType};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

const RECV_BUF_LEN: usize = 1536;

/// Highest colour index accepted by `/led`
pub const MAX_COLOUR_INDEX: u8 = 7;

/// Request from the engine to the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// `/led i`: show colour `i` on the touche LED
    SetLedColour(u8),
    /// `/refresh`: re-send the full control state
    Refresh,
}

fn first_number(msg: &OscMessage) -> Option<i64> {
    match msg.args.first()? {
        OscType::Int(v) => Some(i64::from(*v)),
        OscType::Long(v) => Some(*v),
        // Pd sends floats unless told otherwise
        OscType::Float(v) => Some(*v as i64),
        OscType::Double(v) => Some(*v as i64),
        _ => None,
    }
}

fn parse_message(msg: &OscMessage) -> Option<Request> {
    match msg.addr.as_str() {
        "/led" => match first_number(msg) {
            Some(index) if (0..=i64::from(MAX_COLOUR_INDEX)).contains(&index) => {
                Some(Request::SetLedColour(index as u8))
            }
            Some(index) => {
                warn!("Ignoring /led with out-of-range colour {}", index);
                None
            }
            None => {
                warn!("Ignoring /led without a numeric argument: {:?}", msg.args);
                None
            }
        },
        "/refresh" => Some(Request::Refresh),
        // Display and lifecycle messages belong to other collaborators
        addr if addr.starts_with("/oled/line") || addr.starts_with("/quit") => {
            trace!("Ignoring {}", addr);
            None
        }
        addr => {
            debug!("Unhandled OSC message {} {:?}", addr, msg.args);
            None
        }
    }
}

/// Requests carried by a packet, bundles flattened in order
pub fn parse_packet(packet: OscPacket) -> Vec<Request> {
    match packet {
        OscPacket::Message(msg) => parse_message(&msg).into_iter().collect(),
        OscPacket::Bundle(bundle) => bundle.content.into_iter().flat_map(parse_packet).collect(),
    }
}

/// Bind the request port and start the listener task
///
/// The task ends when the receiving side of `requests` is dropped.
pub async fn spawn_listener(
    port: u16,
    requests: Sender<Request>,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let socket = UdpSocket::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind OSC listener on port {}", port))?;
    let local = socket.local_addr()?;
    info!("Listening for OSC requests on {}", local);

    let handle = tokio::spawn(async move {
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            let (len, from) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("OSC receive failed: {}", e);
                    continue;
                }
            };

            let packet = match rosc::decoder::decode_udp(&buf[..len]) {
                Ok((_, packet)) => packet,
                Err(e) => {
                    debug!("Undecodable OSC packet from {}: {}", from, e);
                    continue;
                }
            };

            for request in parse_packet(packet) {
                if requests.send(request).is_err() {
                    debug!("Request channel closed, stopping OSC listener");
                    return;
                }
            }
        }
    });

    Ok((local, handle))
}
