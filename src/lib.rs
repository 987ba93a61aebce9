//! Re-exports the [`peerlink`] library for convenient access to discovery and signaling types.
#[cfg(feature = "peerlink")]
pub use peerlink;
