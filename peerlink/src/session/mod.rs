//! Offer/answer signaling session.
//!
//! A [`SignalingSession`] drives one [`TransportAdapter`] through a manual
//! signaling exchange: the host produces an offer, the guest turns it into
//! an answer, the host applies the answer, and both sides then wait for the
//! adapter to hand over a data channel.
//!
//! ```text
//! Idle ──start_as_host──▶ CreatingLocal ──▶ AwaitingRemote ──supply_remote──▶ Negotiating
//! Idle ──start_as_guest─▶ CreatingLocal ──▶ AwaitingRemote ─────────────────▶ Negotiating
//! Negotiating ──wait_for_channel──▶ Completed
//! any non-terminal state ──error / cancel──▶ Failed
//! ```
//!
//! Driving methods take `&mut self`, so a session always has exactly one
//! driving task. Observers use [`SignalingSession::subscribe`].

mod config;

pub use config::SessionConfig;

use crate::channel::MessageChannel;
use crate::error::{ErrorKind, PeerlinkError, Result};
use crate::protocol::{SdpType, SessionDescription};
use crate::signaling::{AdapterEvent, ChannelHandle, TransportAdapter};
use futures::StreamExt;
use std::fmt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Which side of the exchange a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    /// Creates the offer and the data channel.
    Host,
    /// Answers an offer and receives the host's channel.
    Guest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    CreatingLocal,
    AwaitingRemote,
    Negotiating,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::CreatingLocal => "creating-local",
            SessionState::AwaitingRemote => "awaiting-remote",
            SessionState::Negotiating => "negotiating",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a session ended in [`SessionState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailure {
    pub kind: ErrorKind,
    pub diagnostic: String,
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.diagnostic)
    }
}

/// Notifications delivered to [`SignalingSession::subscribe`] receivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// Serialized local description, ready to hand to the remote peer.
    LocalDescription(String),
    Failed(SessionFailure),
    Completed {
        label: String,
    },
}

/// Cloneable handle that aborts a session from another task.
#[derive(Debug, Clone)]
pub struct SessionCancelHandle {
    token: CancellationToken,
}

impl SessionCancelHandle {
    /// Aborts the in-flight adapter call or channel wait, if any.
    ///
    /// The session records [`ErrorKind::Cancelled`] the next time it is driven.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Runs an adapter call unless the session is cancelled first.
async fn guarded<T>(
    token: &CancellationToken,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(PeerlinkError::Cancelled),
        result = operation => result,
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// One signaling exchange over a transport adapter.
pub struct SignalingSession<A: TransportAdapter> {
    adapter: A,
    config: SessionConfig,
    id: u64,
    role: Option<SessionRole>,
    state: SessionState,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    host_channel: Option<A::Channel>,
    failure: Option<SessionFailure>,
    observers: Vec<mpsc::UnboundedSender<SessionEvent>>,
    cancel_token: CancellationToken,
}

impl<A: TransportAdapter> SignalingSession<A> {
    /// Creates an idle session that owns `adapter`.
    pub fn new(adapter: A, config: SessionConfig) -> Self {
        Self {
            adapter,
            config,
            id: rand::random(),
            role: None,
            state: SessionState::Idle,
            local_description: None,
            remote_description: None,
            host_channel: None,
            failure: None,
            observers: Vec::new(),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> Option<SessionRole> {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    pub fn failure(&self) -> Option<&SessionFailure> {
        self.failure.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Registers an observer. Events are delivered in the order they happen.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }

    pub fn cancel_handle(&self) -> SessionCancelHandle {
        SessionCancelHandle {
            token: self.cancel_token.clone(),
        }
    }

    /// Aborts the session. Terminal sessions are left as they are.
    pub fn cancel(&mut self) {
        self.cancel_token.cancel();
        if !self.state.is_terminal() {
            let _ = self.fail(PeerlinkError::Cancelled);
        }
    }

    /// Tears down the adapter's connection.
    pub async fn close(&self) -> Result<()> {
        self.adapter.close().await
    }

    /// Starts the exchange as the host and returns the offer JSON.
    ///
    /// Creates the data channel first so the offer carries a data section,
    /// then creates and applies the offer.
    ///
    /// # Errors
    ///
    /// - [`PeerlinkError::InvalidState`] unless the session is Idle. The state is unchanged.
    /// - Any adapter error, after which the session is Failed.
    pub async fn start_as_host(&mut self) -> Result<String> {
        self.ensure_state(SessionState::Idle, "start_as_host")?;
        self.role = Some(SessionRole::Host);
        self.set_state(SessionState::CreatingLocal);
        tracing::info!("session {:016x}: starting as host", self.id);

        let (channel, local) = match self.create_host_offer().await {
            Ok(created) => created,
            Err(e) => return Err(self.fail(e)),
        };

        let json = match local.to_json() {
            Ok(json) => json,
            Err(e) => return Err(self.fail(e)),
        };
        self.local_description = Some(local);
        self.host_channel = Some(channel);
        self.set_state(SessionState::AwaitingRemote);
        self.emit(SessionEvent::LocalDescription(json.clone()));
        Ok(json)
    }

    async fn create_host_offer(&self) -> Result<(A::Channel, SessionDescription)> {
        let token = &self.cancel_token;
        let channel = guarded(
            token,
            self.adapter.create_data_channel(&self.config.channel_label),
        )
        .await?;
        let offer = guarded(token, self.adapter.create_offer()).await?;
        let local = guarded(token, self.adapter.set_local_description(offer)).await?;
        Ok((channel, local))
    }

    /// Applies the guest's answer on a host session awaiting it.
    ///
    /// Text that is not a valid answer, or an answer the adapter rejects,
    /// fails the session.
    pub async fn supply_remote(&mut self, answer_json: &str) -> Result<()> {
        if self.role != Some(SessionRole::Host) {
            return Err(PeerlinkError::InvalidState(
                "supply_remote is only valid on a host session".to_string(),
            ));
        }
        self.ensure_state(SessionState::AwaitingRemote, "supply_remote")?;

        let answer = match SessionDescription::from_json_expecting(answer_json, SdpType::Answer) {
            Ok(answer) => answer,
            Err(e) => return Err(self.fail(e)),
        };

        let applied = guarded(
            &self.cancel_token,
            self.adapter.set_remote_description(answer.clone()),
        )
        .await;
        if let Err(e) = applied {
            return Err(self.fail(e));
        }

        self.remote_description = Some(answer);
        self.set_state(SessionState::Negotiating);
        Ok(())
    }

    /// Starts the exchange as a guest from the host's offer JSON and returns
    /// the answer JSON.
    ///
    /// On success the session is already Negotiating: the answer carries all
    /// gathered candidates, so nothing else needs to be signaled.
    pub async fn start_as_guest(&mut self, offer_json: &str) -> Result<String> {
        self.ensure_state(SessionState::Idle, "start_as_guest")?;
        self.role = Some(SessionRole::Guest);

        let offer = match SessionDescription::from_json_expecting(offer_json, SdpType::Offer) {
            Ok(offer) => offer,
            Err(e) => return Err(self.fail(e)),
        };

        self.set_state(SessionState::CreatingLocal);
        tracing::info!("session {:016x}: starting as guest", self.id);

        let local = match self.create_guest_answer(offer.clone()).await {
            Ok(local) => local,
            Err(e) => return Err(self.fail(e)),
        };
        self.remote_description = Some(offer);

        let json = match local.to_json() {
            Ok(json) => json,
            Err(e) => return Err(self.fail(e)),
        };
        self.local_description = Some(local);
        self.set_state(SessionState::AwaitingRemote);
        self.emit(SessionEvent::LocalDescription(json.clone()));
        self.set_state(SessionState::Negotiating);
        Ok(json)
    }

    async fn create_guest_answer(&self, offer: SessionDescription) -> Result<SessionDescription> {
        let token = &self.cancel_token;
        guarded(token, self.adapter.set_remote_description(offer)).await?;
        let answer = guarded(token, self.adapter.create_answer()).await?;
        guarded(token, self.adapter.set_local_description(answer)).await
    }

    /// Waits for the adapter to provide the session's channel.
    ///
    /// A host completes when the connection comes up, yielding the channel it
    /// created; a guest completes when the host's channel arrives. Returns the
    /// channel exactly once.
    ///
    /// # Errors
    ///
    /// - [`PeerlinkError::InvalidState`] unless the session is Negotiating.
    /// - [`PeerlinkError::Timeout`] once `negotiation_timeout` elapses.
    /// - [`PeerlinkError::Negotiation`] if the adapter reports failure or
    ///   closure, or its event stream ends.
    pub async fn wait_for_channel(&mut self) -> Result<MessageChannel<A::Channel>> {
        self.ensure_state(SessionState::Negotiating, "wait_for_channel")?;

        let role = self.role;
        let token = self.cancel_token.clone();
        let deadline = self
            .config
            .negotiation_timeout
            .map(|timeout| Instant::now() + timeout);
        let mut events = self.adapter.events();

        let outcome: Result<Option<A::Channel>> = loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break Err(PeerlinkError::Cancelled),
                _ = deadline_elapsed(deadline) => break Err(PeerlinkError::Timeout),
                event = events.next() => event,
            };

            match next {
                Some(AdapterEvent::Connected) if role == Some(SessionRole::Host) => {
                    break Ok(None);
                }
                Some(AdapterEvent::IncomingChannel(channel)) if role == Some(SessionRole::Guest) => {
                    break Ok(Some(channel));
                }
                Some(AdapterEvent::Connected) => {
                    tracing::debug!(
                        "session {:016x}: connected, waiting for the host's channel",
                        self.id
                    );
                }
                Some(AdapterEvent::IncomingChannel(channel)) => {
                    tracing::debug!(
                        "session {:016x}: ignoring unexpected channel {:?}",
                        self.id,
                        channel.label()
                    );
                }
                Some(AdapterEvent::Failed(diagnostic)) => {
                    break Err(PeerlinkError::Negotiation(diagnostic));
                }
                Some(AdapterEvent::Closed) => {
                    break Err(PeerlinkError::Negotiation(
                        "connection closed before a channel opened".to_string(),
                    ));
                }
                None => {
                    break Err(PeerlinkError::Negotiation(
                        "adapter event stream ended".to_string(),
                    ));
                }
            }
        };

        let handle = match outcome {
            Ok(Some(incoming)) => incoming,
            Ok(None) => match self.host_channel.take() {
                Some(created) => created,
                None => {
                    return Err(self.fail(PeerlinkError::InvalidState(
                        "host channel missing".to_string(),
                    )));
                }
            },
            Err(e) => return Err(self.fail(e)),
        };

        let channel = MessageChannel::new(handle);
        tracing::info!(
            "session {:016x}: channel {:?} ready",
            self.id,
            channel.label()
        );
        self.set_state(SessionState::Completed);
        self.emit(SessionEvent::Completed {
            label: channel.label().to_string(),
        });
        Ok(channel)
    }

    /// Rejects calls made in the wrong state, and applies a cancellation
    /// requested through a handle since the last call.
    fn ensure_state(&mut self, expected: SessionState, operation: &str) -> Result<()> {
        if self.cancel_token.is_cancelled() && !self.state.is_terminal() {
            return Err(self.fail(PeerlinkError::Cancelled));
        }
        if self.state != expected {
            return Err(PeerlinkError::InvalidState(format!(
                "{} requires {} but session is {}",
                operation, expected, self.state
            )));
        }
        Ok(())
    }

    fn set_state(&mut self, next: SessionState) {
        let previous = self.state;
        if previous == next {
            return;
        }
        self.state = next;
        tracing::debug!("session {:016x}: {} -> {}", self.id, previous, next);
        self.emit(SessionEvent::StateChanged {
            from: previous,
            to: next,
        });
    }

    /// Records `error` as the session's failure and hands it back to the caller.
    fn fail(&mut self, error: PeerlinkError) -> PeerlinkError {
        let failure = SessionFailure {
            kind: error.kind(),
            diagnostic: error.to_string(),
        };
        tracing::warn!("session {:016x} failed: {}", self.id, failure);
        self.failure = Some(failure.clone());
        self.set_state(SessionState::Failed);
        self.emit(SessionEvent::Failed(failure));
        error
    }

    fn emit(&mut self, event: SessionEvent) {
        self.observers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl<A: TransportAdapter> fmt::Debug for SignalingSession<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalingSession")
            .field("id", &format_args!("{:016x}", self.id))
            .field("role", &self.role)
            .field("state", &self.state)
            .field("failure", &self.failure)
            .finish()
    }
}
