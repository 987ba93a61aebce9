//! Text message channel handed out by a completed signaling session.

use crate::error::{PeerlinkError, Result};
use crate::signaling::{ChannelHandle, ChannelNotifier};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};

/// Lifecycle of a [`MessageChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
    Errored,
}

impl ChannelState {
    /// Closed and Errored never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelState::Closed | ChannelState::Errored)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Closed => "closed",
            ChannelState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// State shared between the channel and the adapter's notification path.
struct ChannelShared {
    label: String,
    state_tx: watch::Sender<ChannelState>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    last_error: Mutex<Option<String>>,
}

impl ChannelShared {
    /// Moves to `next` unless already terminal. Returns whether the state changed.
    fn transition(&self, next: ChannelState) -> bool {
        let changed = self.state_tx.send_if_modified(|state| {
            if state.is_terminal() || *state == next {
                return false;
            }
            *state = next;
            true
        });

        if changed {
            tracing::debug!("channel {:?} is now {}", self.label, next);
            if next.is_terminal() {
                // Dropping the sender lets recv() drain and then end.
                self.inbound_tx
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
            }
        }
        changed
    }
}

impl ChannelNotifier for ChannelShared {
    fn notify_open(&self) {
        if *self.state_tx.borrow() != ChannelState::Connecting {
            tracing::debug!("ignoring open notification for channel {:?}", self.label);
            return;
        }
        self.transition(ChannelState::Open);
    }

    fn notify_close(&self) {
        self.transition(ChannelState::Closed);
    }

    fn notify_error(&self, diagnostic: String) {
        if self.transition(ChannelState::Errored) {
            tracing::warn!("channel {:?} errored: {}", self.label, diagnostic);
            *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(diagnostic);
        } else {
            tracing::debug!(
                "ignoring error on finished channel {:?}: {}",
                self.label,
                diagnostic
            );
        }
    }

    fn notify_message(&self, text: String) {
        let state = *self.state_tx.borrow();
        if state != ChannelState::Open {
            tracing::warn!(
                "dropping message of {} bytes on {} channel {:?}",
                text.len(),
                state,
                self.label
            );
            return;
        }

        let inbound = self.inbound_tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = inbound.as_ref() {
            let _ = tx.send(text);
        }
    }
}

/// Bidirectional text channel between two peers.
///
/// State moves only on adapter notifications: Connecting to Open on open,
/// to Closed on close, to Errored on error. Inbound messages are queued in
/// arrival order and read with [`recv`](Self::recv).
pub struct MessageChannel<C: ChannelHandle> {
    handle: C,
    shared: Arc<ChannelShared>,
    state_rx: watch::Receiver<ChannelState>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

impl<C: ChannelHandle> MessageChannel<C> {
    /// Wraps an adapter channel and attaches to its notifications.
    pub(crate) fn new(handle: C) -> Self {
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(ChannelShared {
            label: handle.label().to_string(),
            state_tx,
            inbound_tx: Mutex::new(Some(inbound_tx)),
            last_error: Mutex::new(None),
        });
        handle.attach(shared.clone());

        Self {
            handle,
            shared,
            state_rx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
        }
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn state(&self) -> ChannelState {
        *self.state_rx.borrow()
    }

    /// Diagnostic of the error that moved the channel to Errored.
    pub fn last_error(&self) -> Option<String> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sends a text message.
    ///
    /// # Errors
    ///
    /// - [`PeerlinkError::ChannelNotOpen`] unless the channel is Open. Nothing is sent.
    /// - [`PeerlinkError::DataChannel`] if the adapter fails to transmit.
    pub async fn send(&self, text: impl Into<String>) -> Result<()> {
        if self.state() != ChannelState::Open {
            return Err(PeerlinkError::ChannelNotOpen);
        }

        self.handle.send_text(text.into()).await.map_err(|e| match e {
            PeerlinkError::DataChannel(_) => e,
            other => PeerlinkError::DataChannel(other.to_string()),
        })
    }

    /// Receives the next inbound message.
    ///
    /// Returns `None` once the channel is Closed or Errored and every message
    /// queued before that has been read.
    pub async fn recv(&self) -> Option<String> {
        self.inbound_rx.lock().await.recv().await
    }

    /// Waits until the channel leaves Connecting and returns the new state.
    pub async fn wait_open(&self) -> ChannelState {
        let mut state_rx = self.state_rx.clone();
        match state_rx
            .wait_for(|state| *state != ChannelState::Connecting)
            .await
        {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Asks the adapter to close the channel.
    ///
    /// The state changes when the close notification comes back.
    pub async fn close(&self) -> Result<()> {
        self.handle.close().await
    }
}

impl<C: ChannelHandle> fmt::Debug for MessageChannel<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageChannel")
            .field("label", &self.shared.label)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::signaling::mock::MockChannel;
    use std::time::Duration;

    fn open_channel() -> (MockChannel, MessageChannel<MockChannel>) {
        let handle = MockChannel::new("chat");
        let channel = MessageChannel::new(handle.clone());
        handle.fire_open();
        (handle, channel)
    }

    #[tokio::test]
    async fn test_send_before_open_is_rejected() {
        let handle = MockChannel::new("chat");
        let channel = MessageChannel::new(handle.clone());

        assert_eq!(channel.state(), ChannelState::Connecting);
        let err = channel.send("hi").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChannelNotOpen);
        assert!(handle.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_when_open() {
        let (handle, channel) = open_channel();
        assert_eq!(channel.state(), ChannelState::Open);

        channel.send("hello").await.unwrap();
        channel.send(String::from("again")).await.unwrap();
        assert_eq!(handle.sent(), vec!["hello".to_string(), "again".to_string()]);
    }

    #[tokio::test]
    async fn test_inbound_order_is_preserved() {
        let (handle, channel) = open_channel();
        for text in ["one", "two", "three"] {
            handle.fire_message(text);
        }

        assert_eq!(channel.recv().await.as_deref(), Some("one"));
        assert_eq!(channel.recv().await.as_deref(), Some("two"));
        assert_eq!(channel.recv().await.as_deref(), Some("three"));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let (handle, channel) = open_channel();
        handle.fire_message("last words");
        handle.fire_close();

        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(channel.recv().await.as_deref(), Some("last words"));
        assert_eq!(channel.recv().await, None);

        let err = channel.send("too late").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChannelNotOpen);
        assert!(handle.sent().is_empty());
    }

    #[tokio::test]
    async fn test_error_records_diagnostic() {
        let (handle, channel) = open_channel();
        handle.fire_error("sctp abort");

        assert_eq!(channel.state(), ChannelState::Errored);
        assert_eq!(channel.last_error().as_deref(), Some("sctp abort"));
        assert!(channel.send("x").await.is_err());
        assert_eq!(channel.recv().await, None);
    }

    #[tokio::test]
    async fn test_terminal_states_do_not_change() {
        let (handle, channel) = open_channel();
        handle.fire_close();
        handle.fire_open();
        handle.fire_error("late");

        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(channel.last_error(), None);
    }

    #[tokio::test]
    async fn test_messages_before_open_are_dropped() {
        let handle = MockChannel::new("chat");
        let channel = MessageChannel::new(handle.clone());
        handle.fire_message("early");
        handle.fire_open();
        handle.fire_message("on time");

        assert_eq!(channel.recv().await.as_deref(), Some("on time"));
    }

    #[tokio::test]
    async fn test_notifications_before_attach_are_replayed() {
        let handle = MockChannel::new("chat");
        handle.fire_open();
        handle.fire_message("queued");

        let channel = MessageChannel::new(handle.clone());
        assert!(handle.is_attached());
        assert_eq!(channel.state(), ChannelState::Open);
        assert_eq!(channel.recv().await.as_deref(), Some("queued"));
    }

    #[tokio::test]
    async fn test_wait_open() {
        let handle = MockChannel::new("chat");
        let channel = MessageChannel::new(handle.clone());

        let opener = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            opener.fire_open();
        });

        let state = tokio::time::timeout(Duration::from_secs(1), channel.wait_open())
            .await
            .unwrap();
        assert_eq!(state, ChannelState::Open);
    }

    #[tokio::test]
    async fn test_adapter_send_failure() {
        let (handle, channel) = open_channel();
        handle.fail_sends();

        let err = channel.send("hi").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Channel);
        assert_eq!(channel.state(), ChannelState::Open);
    }

    #[tokio::test]
    async fn test_close_only_requests() {
        let (handle, channel) = open_channel();
        channel.close().await.unwrap();

        assert!(handle.close_requested());
        assert_eq!(channel.state(), ChannelState::Open);

        handle.fire_close();
        assert_eq!(channel.state(), ChannelState::Closed);
    }
}
