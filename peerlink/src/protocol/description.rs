//! Session descriptions exchanged during manual signaling.
//!
//! The user carries these between peers by hand (paste, chat, clipboard) as
//! JSON of the form `{"sdp":"v=0...","type":"offer"}`.

use crate::error::{PeerlinkError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a session description in the offer/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An offer or answer, immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl SessionDescription {
    pub fn new(sdp_type: SdpType, sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type,
        }
    }

    /// Creates an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self::new(SdpType::Offer, sdp)
    }

    /// Creates an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self::new(SdpType::Answer, sdp)
    }

    /// Serializes to the signaling JSON text.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| PeerlinkError::MalformedDescription(e.to_string()))
    }

    /// Parses signaling JSON text. Surrounding whitespace from a paste is ignored.
    pub fn from_json(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(PeerlinkError::MalformedDescription(
                "empty signaling text".to_string(),
            ));
        }
        serde_json::from_str(trimmed).map_err(|e| PeerlinkError::MalformedDescription(e.to_string()))
    }

    /// Parses signaling JSON text and checks it has the expected role.
    pub fn from_json_expecting(text: &str, expected: SdpType) -> Result<Self> {
        let desc = Self::from_json(text)?;
        if desc.sdp_type != expected {
            return Err(PeerlinkError::MalformedDescription(format!(
                "expected {} but got {}",
                expected, desc.sdp_type
            )));
        }
        Ok(desc)
    }
}

impl FromStr for SessionDescription {
    type Err = PeerlinkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_json(s)
    }
}
