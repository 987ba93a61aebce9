use std::fmt;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors produced by discovery, signaling sessions and message channels.
#[derive(Debug, Error)]
pub enum PeerlinkError {
    /// The discovery socket could not be bound. Fatal to discovery only.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// WebRTC engine error
    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    /// A discovery datagram could not be decoded
    #[error("Malformed datagram: {0}")]
    MalformedDatagram(String),

    /// Signaling text supplied by the user could not be parsed
    #[error("Malformed session description: {0}")]
    MalformedDescription(String),

    /// The transport adapter rejected an offer, answer or description
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// Send attempted on a channel that is not open
    #[error("Channel not open")]
    ChannelNotOpen,

    /// Data channel error reported by the adapter
    #[error("Data channel error: {0}")]
    DataChannel(String),

    /// Key generation or encoding failure
    #[error("Identity error: {0}")]
    Identity(String),

    /// Session aborted by its owner
    #[error("Session cancelled")]
    Cancelled,

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Coarse classification of a [`PeerlinkError`], stable enough to match on
/// and to record after the error value itself is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Bind,
    Io,
    MalformedDatagram,
    MalformedDescription,
    Negotiation,
    ChannelNotOpen,
    Channel,
    Identity,
    Cancelled,
    Timeout,
    InvalidState,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Bind => "bind",
            ErrorKind::Io => "io",
            ErrorKind::MalformedDatagram => "malformed-datagram",
            ErrorKind::MalformedDescription => "malformed-description",
            ErrorKind::Negotiation => "negotiation",
            ErrorKind::ChannelNotOpen => "channel-not-open",
            ErrorKind::Channel => "channel",
            ErrorKind::Identity => "identity",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidState => "invalid-state",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PeerlinkError {
    /// Returns the kind of this error.
    ///
    /// Engine-level WebRTC errors are reported as [`ErrorKind::Negotiation`],
    /// since every WebRTC call the crate makes is part of a negotiation step.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PeerlinkError::Bind { .. } => ErrorKind::Bind,
            PeerlinkError::Io(_) => ErrorKind::Io,
            PeerlinkError::WebRtc(_) | PeerlinkError::Negotiation(_) => ErrorKind::Negotiation,
            PeerlinkError::MalformedDatagram(_) => ErrorKind::MalformedDatagram,
            PeerlinkError::MalformedDescription(_) => ErrorKind::MalformedDescription,
            PeerlinkError::ChannelNotOpen => ErrorKind::ChannelNotOpen,
            PeerlinkError::DataChannel(_) => ErrorKind::Channel,
            PeerlinkError::Identity(_) => ErrorKind::Identity,
            PeerlinkError::Cancelled => ErrorKind::Cancelled,
            PeerlinkError::Timeout => ErrorKind::Timeout,
            PeerlinkError::InvalidState(_) => ErrorKind::InvalidState,
        }
    }

    /// Returns `true` for conditions that end the owning component.
    ///
    /// Only a bind failure qualifies; everything else is local to a datagram,
    /// a session or a single send.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PeerlinkError::Bind { .. })
    }
}

pub type Result<T> = std::result::Result<T, PeerlinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_taxonomy() {
        let bind = PeerlinkError::Bind {
            addr: "0.0.0.0:5555".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(bind.kind(), ErrorKind::Bind);
        assert!(bind.is_fatal());

        assert_eq!(PeerlinkError::ChannelNotOpen.kind(), ErrorKind::ChannelNotOpen);
        assert!(!PeerlinkError::ChannelNotOpen.is_fatal());
        assert_eq!(
            PeerlinkError::Negotiation("rejected".into()).kind(),
            ErrorKind::Negotiation
        );
        assert_eq!(
            PeerlinkError::MalformedDescription("eof".into()).kind(),
            ErrorKind::MalformedDescription
        );
    }

    #[test]
    fn bind_error_names_address() {
        let err = PeerlinkError::Bind {
            addr: "0.0.0.0:5555".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        };
        let text = err.to_string();
        assert!(text.contains("0.0.0.0:5555"));
        assert!(text.contains("address in use"));
    }
}
