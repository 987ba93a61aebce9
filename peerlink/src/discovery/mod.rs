//! LAN discovery.
//!
//! Every node binds a UDP socket on a well-known port (5555 by default) and
//! answers `discover` probes with its public key and the address it saw the
//! probe come from. Responses populate a transient peer table.
//!
//! # Discovery Flow
//!
//! 1. A node sends `{"type":"discover"}` to a peer or the broadcast address
//! 2. Every listener replies to the literal source address with a
//!    `discover_response` carrying its PEM public key
//! 3. The prober records a [`PeerRecord`] keyed by the responder's address
//!
//! Probes are fire-and-forget: nothing is retried and nothing waits.

mod config;
mod service;

pub use config::DiscoveryConfig;
pub use service::DiscoveryService;

use std::net::SocketAddr;
use std::time::Instant;

/// A peer learned from a discovery response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// Address the response came from.
    pub peer_address: SocketAddr,
    /// The peer's PEM public key, kept opaque.
    pub public_key: String,
    /// Our own IP as the peer observed it.
    pub reflected_ip: String,
    /// When the latest response from this peer arrived.
    pub last_seen: Instant,
}

/// Notifications emitted by the receive loop.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A response was recorded, either new or refreshing an existing record.
    PeerDiscovered(PeerRecord),
    /// A datagram could not be decoded and was dropped.
    DatagramDropped { from: SocketAddr, reason: String },
}
