use crate::protocol::constants::{
    DEFAULT_CLEANUP_INTERVAL, DEFAULT_DISCOVERY_PORT, DEFAULT_EVENT_CAPACITY, MAX_DATAGRAM_SIZE,
};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Configuration for [`crate::discovery::DiscoveryService`].
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Local address the discovery socket binds to.
    pub bind_addr: SocketAddr,
    /// Destination used by `scan()`.
    pub broadcast_target: SocketAddr,
    /// Largest accepted datagram; longer reads are dropped as truncated.
    pub max_datagram_size: usize,
    /// Bind with SO_REUSEADDR/SO_REUSEPORT so several nodes can share the port on one host.
    pub reuse_port: bool,
    /// Evict peers not heard from within this window. `None` keeps records forever.
    pub peer_ttl: Option<Duration>,
    /// Sweep interval for TTL eviction.
    pub cleanup_interval: Duration,
    /// Per-subscriber buffer of `events()`.
    pub event_capacity: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), DEFAULT_DISCOVERY_PORT),
            broadcast_target: SocketAddr::new(Ipv4Addr::BROADCAST.into(), DEFAULT_DISCOVERY_PORT),
            max_datagram_size: MAX_DATAGRAM_SIZE,
            reuse_port: false,
            peer_ttl: None,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl DiscoveryConfig {
    /// Default configuration bound to `port` on all interfaces, broadcasting to the same port.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port),
            broadcast_target: SocketAddr::new(Ipv4Addr::BROADCAST.into(), port),
            ..Default::default()
        }
    }
}
