//! Constants for the peerlink discovery and signaling protocols.

use std::time::Duration;

/// Default UDP port used for LAN discovery.
/// Nodes bind this port on all interfaces and answer `discover` probes on it.
pub const DEFAULT_DISCOVERY_PORT: u16 = 5555;

/// Largest discovery datagram accepted by the receive loop (in bytes).
/// Anything that fills the receive buffer beyond this is treated as truncated.
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// Wire discriminator values for discovery messages.
pub const TYPE_DISCOVER: &str = "discover";
pub const TYPE_DISCOVER_RESPONSE: &str = "discover_response";

/// Label of the data channel opened by the host.
pub const DEFAULT_CHANNEL_LABEL: &str = "chat";

/// How long a session waits in `Negotiating` for the adapter to report a ready channel.
pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(30);

/// How often stale peer records are swept when a TTL is configured.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(2);

/// Discovery events buffered per subscriber before the oldest are skipped.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;
