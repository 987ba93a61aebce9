//! In-memory transport adapter for session and channel tests.

use super::{AdapterEvent, ChannelHandle, ChannelNotifier, TransportAdapter};
use crate::error::{PeerlinkError, Result};
use crate::protocol::SessionDescription;
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub(crate) const MOCK_OFFER_SDP: &str = "v=0...";
pub(crate) const MOCK_ANSWER_SDP: &str = "v=0-ans...";

enum Fired {
    Open,
    Close,
    Error(String),
    Message(String),
}

fn deliver(notifier: &Arc<dyn ChannelNotifier>, fired: Fired) {
    match fired {
        Fired::Open => notifier.notify_open(),
        Fired::Close => notifier.notify_close(),
        Fired::Error(diagnostic) => notifier.notify_error(diagnostic),
        Fired::Message(text) => notifier.notify_message(text),
    }
}

struct MockChannelInner {
    label: String,
    notifier: Mutex<Option<Arc<dyn ChannelNotifier>>>,
    backlog: Mutex<Vec<Fired>>,
    sent: Mutex<Vec<String>>,
    close_requested: AtomicBool,
    fail_send: AtomicBool,
}

/// Channel whose notifications are fired by the test.
#[derive(Clone)]
pub(crate) struct MockChannel {
    inner: Arc<MockChannelInner>,
}

impl MockChannel {
    pub(crate) fn new(label: &str) -> Self {
        Self {
            inner: Arc::new(MockChannelInner {
                label: label.to_string(),
                notifier: Mutex::new(None),
                backlog: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
                close_requested: AtomicBool::new(false),
                fail_send: AtomicBool::new(false),
            }),
        }
    }

    fn fire(&self, fired: Fired) {
        let notifier = self.inner.notifier.lock().unwrap().clone();
        match notifier {
            Some(notifier) => deliver(&notifier, fired),
            None => self.inner.backlog.lock().unwrap().push(fired),
        }
    }

    pub(crate) fn fire_open(&self) {
        self.fire(Fired::Open);
    }

    pub(crate) fn fire_close(&self) {
        self.fire(Fired::Close);
    }

    pub(crate) fn fire_error(&self, diagnostic: &str) {
        self.fire(Fired::Error(diagnostic.to_string()));
    }

    pub(crate) fn fire_message(&self, text: &str) {
        self.fire(Fired::Message(text.to_string()));
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.inner.sent.lock().unwrap().clone()
    }

    pub(crate) fn close_requested(&self) -> bool {
        self.inner.close_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_sends(&self) {
        self.inner.fail_send.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.inner.notifier.lock().unwrap().is_some()
    }
}

impl ChannelHandle for MockChannel {
    fn label(&self) -> &str {
        &self.inner.label
    }

    fn attach(&self, notifier: Arc<dyn ChannelNotifier>) {
        let backlog = std::mem::take(&mut *self.inner.backlog.lock().unwrap());
        for fired in backlog {
            deliver(&notifier, fired);
        }
        *self.inner.notifier.lock().unwrap() = Some(notifier);
    }

    async fn send_text(&self, text: String) -> Result<()> {
        if self.inner.fail_send.load(Ordering::SeqCst) {
            return Err(PeerlinkError::DataChannel("mock send failure".to_string()));
        }
        self.inner.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.inner.close_requested.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Adapter that records calls and answers with fixed descriptions.
pub(crate) struct MockAdapter {
    offer_sdp: String,
    answer_sdp: String,
    fail_on: Option<&'static str>,
    stall_on: Option<&'static str>,
    calls: Mutex<Vec<&'static str>>,
    channels: Mutex<Vec<MockChannel>>,
    remote: Mutex<Option<SessionDescription>>,
    event_tx: Mutex<Option<mpsc::UnboundedSender<AdapterEvent<MockChannel>>>>,
    event_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<AdapterEvent<MockChannel>>>>,
}

impl MockAdapter {
    pub(crate) fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            offer_sdp: MOCK_OFFER_SDP.to_string(),
            answer_sdp: MOCK_ANSWER_SDP.to_string(),
            fail_on: None,
            stall_on: None,
            calls: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            remote: Mutex::new(None),
            event_tx: Mutex::new(Some(event_tx)),
            event_rx: Arc::new(tokio::sync::Mutex::new(event_rx)),
        }
    }

    /// Makes the named operation return a negotiation error.
    pub(crate) fn failing_on(mut self, operation: &'static str) -> Self {
        self.fail_on = Some(operation);
        self
    }

    /// Makes the named operation never complete.
    pub(crate) fn stalling_on(mut self, operation: &'static str) -> Self {
        self.stall_on = Some(operation);
        self
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn channels(&self) -> Vec<MockChannel> {
        self.channels.lock().unwrap().clone()
    }

    pub(crate) fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().unwrap().clone()
    }

    pub(crate) fn emit(&self, event: AdapterEvent<MockChannel>) {
        if let Some(tx) = self.event_tx.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Ends the event stream.
    pub(crate) fn end_events(&self) {
        self.event_tx.lock().unwrap().take();
    }

    async fn step(&self, operation: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(operation);
        if self.stall_on == Some(operation) {
            std::future::pending::<()>().await;
        }
        if self.fail_on == Some(operation) {
            return Err(PeerlinkError::Negotiation(format!("{} rejected", operation)));
        }
        Ok(())
    }
}

impl TransportAdapter for MockAdapter {
    type Channel = MockChannel;

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.step("create_offer").await?;
        Ok(SessionDescription::offer(self.offer_sdp.clone()))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.step("create_answer").await?;
        Ok(SessionDescription::answer(self.answer_sdp.clone()))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<SessionDescription> {
        self.step("set_local_description").await?;
        Ok(description)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.step("set_remote_description").await?;
        *self.remote.lock().unwrap() = Some(description);
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<MockChannel> {
        self.step("create_data_channel").await?;
        let channel = MockChannel::new(label);
        self.channels.lock().unwrap().push(channel.clone());
        Ok(channel)
    }

    fn events(&self) -> Pin<Box<dyn Stream<Item = AdapterEvent<MockChannel>> + Send>> {
        let rx = self.event_rx.clone();
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let event = rx.lock().await.recv().await;
            event.map(|e| (e, rx))
        }))
    }

    async fn close(&self) -> Result<()> {
        self.calls.lock().unwrap().push("close");
        Ok(())
    }
}
