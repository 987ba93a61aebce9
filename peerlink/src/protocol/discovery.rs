//! LAN discovery messages.
//!
//! Discovery datagrams are UTF-8 JSON objects carrying a `type` discriminator:
//!
//! ```text
//! {"type":"discover"}
//! {"type":"discover_response","pub_key":"-----BEGIN PUBLIC KEY-----...","ip":"10.0.0.5"}
//! ```
//!
//! Objects with any other `type` decode to [`Decoded::Unknown`] so that the
//! receive loop can ignore them without treating them as malformed.

use super::constants::{TYPE_DISCOVER, TYPE_DISCOVER_RESPONSE};
use crate::error::{PeerlinkError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Discovery message exchanged over UDP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryMessage {
    /// Probe asking every listener to announce itself.
    Discover,
    /// Answer to a probe.
    DiscoverResponse {
        /// Responder's public key in PEM form.
        #[serde(rename = "pub_key")]
        public_key: String,
        /// Address the responder saw the probe come from.
        ip: String,
    },
}

/// Result of decoding one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Message(DiscoveryMessage),
    /// Well-formed JSON object with a `type` this node does not handle.
    Unknown(String),
}

impl DiscoveryMessage {
    /// Builds the response to a probe received from `source`.
    pub fn response_to(source: SocketAddr, public_key: impl Into<String>) -> Self {
        DiscoveryMessage::DiscoverResponse {
            public_key: public_key.into(),
            ip: source.ip().to_string(),
        }
    }

    /// Returns the wire discriminator of the message.
    pub fn message_type(&self) -> &'static str {
        match self {
            DiscoveryMessage::Discover => TYPE_DISCOVER,
            DiscoveryMessage::DiscoverResponse { .. } => TYPE_DISCOVER_RESPONSE,
        }
    }

    /// Serializes the message to its JSON wire form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| PeerlinkError::MalformedDatagram(e.to_string()))
    }

    /// Decodes a datagram.
    ///
    /// Invalid UTF-8, invalid JSON, a non-object, a missing or non-string
    /// `type`, or a known `type` with missing fields are all reported as
    /// [`PeerlinkError::MalformedDatagram`].
    pub fn decode(data: &[u8]) -> Result<Decoded> {
        let value: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| PeerlinkError::MalformedDatagram(format!("invalid JSON: {}", e)))?;

        let tag = value
            .as_object()
            .ok_or_else(|| PeerlinkError::MalformedDatagram("expected a JSON object".to_string()))?
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| PeerlinkError::MalformedDatagram("missing \"type\" field".to_string()))?
            .to_string();

        match tag.as_str() {
            TYPE_DISCOVER | TYPE_DISCOVER_RESPONSE => serde_json::from_value(value)
                .map(Decoded::Message)
                .map_err(|e| PeerlinkError::MalformedDatagram(format!("invalid {}: {}", tag, e))),
            _ => Ok(Decoded::Unknown(tag)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEM: &str = "-----BEGIN PUBLIC KEY-----\nMCowBQYDK2VwAyEA\n-----END PUBLIC KEY-----\n";

    #[test]
    fn test_discover_wire_form() {
        let data = DiscoveryMessage::Discover.encode().unwrap();
        assert_eq!(data, br#"{"type":"discover"}"#);
    }

    #[test]
    fn test_response_wire_form() {
        let source: SocketAddr = "10.0.0.5:5555".parse().unwrap();
        let response = DiscoveryMessage::response_to(source, "PEM");
        let text = String::from_utf8(response.encode().unwrap()).unwrap();
        assert_eq!(
            text,
            r#"{"type":"discover_response","pub_key":"PEM","ip":"10.0.0.5"}"#
        );
    }

    #[test]
    fn test_decode_response_with_multiline_pem() {
        let source: SocketAddr = "192.168.1.20:40000".parse().unwrap();
        let encoded = DiscoveryMessage::response_to(source, PEM).encode().unwrap();
        match DiscoveryMessage::decode(&encoded).unwrap() {
            Decoded::Message(DiscoveryMessage::DiscoverResponse { public_key, ip }) => {
                assert_eq!(public_key, PEM);
                assert_eq!(ip, "192.168.1.20");
            }
            other => panic!("unexpected decode result: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let decoded = DiscoveryMessage::decode(br#"{"type":"ping","n":1}"#).unwrap();
        assert_eq!(decoded, Decoded::Unknown("ping".to_string()));
    }

    #[test]
    fn test_malformed_inputs() {
        let cases: [&[u8]; 6] = [
            b"not json",
            b"[1,2,3]",
            br#"{"kind":"discover"}"#,
            br#"{"type":7}"#,
            br#"{"type":"discover_response","ip":"10.0.0.5"}"#,
            &[0xff, 0xfe, 0x00],
        ];
        for case in cases {
            let err = DiscoveryMessage::decode(case).unwrap_err();
            assert!(
                matches!(err, PeerlinkError::MalformedDatagram(_)),
                "expected malformed for {:?}, got {:?}",
                case,
                err
            );
        }
    }

    #[test]
    fn test_extra_fields_tolerated() {
        let decoded =
            DiscoveryMessage::decode(br#"{"type":"discover","version":2}"#).unwrap();
        assert_eq!(decoded, Decoded::Message(DiscoveryMessage::Discover));
    }
}
