use crate::protocol::constants::{DEFAULT_CHANNEL_LABEL, DEFAULT_NEGOTIATION_TIMEOUT};
use std::time::Duration;

/// Configuration for [`crate::session::SignalingSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Label of the data channel the host creates.
    pub channel_label: String,
    /// Upper bound on `wait_for_channel`. `None` waits forever.
    pub negotiation_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_label: DEFAULT_CHANNEL_LABEL.to_string(),
            negotiation_timeout: Some(DEFAULT_NEGOTIATION_TIMEOUT),
        }
    }
}
