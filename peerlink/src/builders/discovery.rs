use std::net::SocketAddr;
use std::time::Duration;

use crate::discovery::DiscoveryConfig;

/// Configuration builder for [`crate::discovery::DiscoveryService`].
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfigBuilder {
    config: DiscoveryConfig,
}

impl From<DiscoveryConfigBuilder> for DiscoveryConfig {
    fn from(builder: DiscoveryConfigBuilder) -> Self {
        builder.build()
    }
}

impl DiscoveryConfigBuilder {
    /// Creates a builder holding [`DiscoveryConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the port for both the bind address and the broadcast target.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.bind_addr.set_port(port);
        self.config.broadcast_target.set_port(port);
        self
    }

    /// Sets the bind address.
    #[must_use]
    pub fn bind_address(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.config.bind_addr = addr.into();
        self
    }

    /// Sets the destination used by `scan()`.
    #[must_use]
    pub fn broadcast_target(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.config.broadcast_target = addr.into();
        self
    }

    /// Sets the largest accepted datagram.
    #[must_use]
    pub fn max_datagram_size(mut self, size: usize) -> Self {
        self.config.max_datagram_size = size;
        self
    }

    #[must_use]
    pub fn reuse_port(mut self, reuse: bool) -> Self {
        self.config.reuse_port = reuse;
        self
    }

    /// Evicts peers not heard from within `ttl`.
    #[must_use]
    pub fn peer_ttl(mut self, ttl: Duration) -> Self {
        self.config.peer_ttl = Some(ttl);
        self
    }

    /// Sets how often expired peers are swept.
    #[must_use]
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.config.cleanup_interval = interval;
        self
    }

    /// Sets how many events each `events()` subscriber may fall behind.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn build(self) -> DiscoveryConfig {
        self.config
    }
}
