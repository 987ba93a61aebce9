use crate::error::Result;
use crate::protocol::SessionDescription;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

#[cfg(test)]
pub(crate) mod mock;
pub mod rtc;

pub use rtc::{WebRtcAdapter, WebRtcChannel, WebRtcConfig};

/// Connection-level notifications from a transport adapter.
#[derive(Debug)]
pub enum AdapterEvent<C> {
    /// The underlying connection is up; channels created locally can open.
    Connected,
    /// The remote peer opened a channel toward us.
    IncomingChannel(C),
    /// Negotiation or the connection failed.
    Failed(String),
    /// The connection was closed.
    Closed,
}

/// Connection-establishment engine used by a signaling session.
///
/// Implementations perform the actual ICE/SDP negotiation. The session only
/// sequences these calls and reacts to [`events`](Self::events).
pub trait TransportAdapter: Send + Sync {
    /// Channel type produced by this adapter.
    type Channel: ChannelHandle;

    /// Creates an offer
    fn create_offer(&self) -> impl Future<Output = Result<SessionDescription>> + Send;

    /// Creates an answer to the remote offer already applied
    fn create_answer(&self) -> impl Future<Output = Result<SessionDescription>> + Send;

    /// Applies a local description.
    ///
    /// Returns the description as the engine finalized it, which may differ
    /// from the input (for example once gathered candidates are included).
    fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> impl Future<Output = Result<SessionDescription>> + Send;

    /// Applies the remote peer's description
    fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Creates an ordered data channel with the given label
    fn create_data_channel(&self, label: &str) -> impl Future<Output = Result<Self::Channel>> + Send;

    /// Returns the connection event stream
    fn events(&self) -> Pin<Box<dyn Stream<Item = AdapterEvent<Self::Channel>> + Send>>;

    /// Tears down the underlying connection
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Adapter-side handle of one data channel.
pub trait ChannelHandle: Send + Sync + 'static {
    /// Channel label
    fn label(&self) -> &str;

    /// Routes this channel's open/close/error/message notifications to `notifier`.
    ///
    /// Notifications raised before attachment must be delivered, in order,
    /// once a notifier is attached.
    fn attach(&self, notifier: Arc<dyn ChannelNotifier>);

    /// Sends a text message
    fn send_text(&self, text: String) -> impl Future<Output = Result<()>> + Send;

    /// Asks the engine to close the channel
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Receiver of the four channel notifications.
pub trait ChannelNotifier: Send + Sync {
    /// The channel became ready
    fn notify_open(&self);

    /// The channel closed
    fn notify_close(&self);

    /// The channel failed
    fn notify_error(&self, diagnostic: String);

    /// A text message arrived
    fn notify_message(&self, text: String);
}
