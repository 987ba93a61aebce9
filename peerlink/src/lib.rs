//! Tokio-based LAN peer discovery and manual offer/answer signaling.
//!
//! This crate provides:
//! - [`KeyIdentity`] for the per-process key pair advertised to peers
//! - [`DiscoveryService`] for UDP discovery with public-key exchange
//! - [`SignalingSession`] for the host/guest offer/answer state machine
//! - [`MessageChannel`] for ordered text messaging once a session completes
//! - [`TransportAdapter`] and [`WebRtcAdapter`] as the connection engine seam
//!
//! ## Features
//!
//! - JSON discovery datagrams on UDP port 5555, broadcast or unicast
//! - Ed25519 identities exchanged as PEM public keys
//! - Copy-and-paste signaling: descriptions are plain JSON blobs
//! - Non-trickle WebRTC data channels

pub mod builders;
pub mod channel;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod session;
pub mod signaling;

pub use builders::{DiscoveryConfigBuilder, SessionConfigBuilder};
pub use channel::{ChannelState, MessageChannel};
pub use discovery::{DiscoveryConfig, DiscoveryEvent, DiscoveryService, PeerRecord};
pub use error::{ErrorKind, PeerlinkError, Result};
pub use identity::KeyIdentity;
pub use protocol::{DiscoveryMessage, SdpType, SessionDescription};
pub use session::{
    SessionCancelHandle, SessionConfig, SessionEvent, SessionFailure, SessionRole, SessionState,
    SignalingSession,
};
pub use signaling::{
    AdapterEvent, ChannelHandle, ChannelNotifier, TransportAdapter, WebRtcAdapter, WebRtcChannel,
    WebRtcConfig,
};
