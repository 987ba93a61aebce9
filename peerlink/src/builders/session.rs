use std::time::Duration;

use crate::session::SessionConfig;

/// Configuration builder for [`crate::session::SignalingSession`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl From<SessionConfigBuilder> for SessionConfig {
    fn from(builder: SessionConfigBuilder) -> Self {
        builder.build()
    }
}

impl SessionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the label of the channel a host creates.
    #[must_use]
    pub fn channel_label(mut self, label: impl Into<String>) -> Self {
        self.config.channel_label = label.into();
        self
    }

    /// Bounds how long `wait_for_channel` may take.
    #[must_use]
    pub fn negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.config.negotiation_timeout = Some(timeout);
        self
    }

    /// Lets `wait_for_channel` wait indefinitely.
    #[must_use]
    pub fn no_negotiation_timeout(mut self) -> Self {
        self.config.negotiation_timeout = None;
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}
