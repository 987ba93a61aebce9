//! Transport adapter backed by the `webrtc` crate.
//!
//! Descriptions are exchanged without trickle ICE: applying a local
//! description waits for candidate gathering to finish, so the returned
//! SDP already lists every candidate and can be handed to the user as a
//! single blob.

use super::{AdapterEvent, ChannelHandle, ChannelNotifier, TransportAdapter};
use crate::error::{PeerlinkError, Result};
use crate::protocol::{SdpType, SessionDescription};
use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, mpsc};
use webrtc::api::APIBuilder;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Settings for [`WebRtcAdapter`].
#[derive(Debug, Clone)]
pub struct WebRtcConfig {
    /// STUN/TURN URLs. Empty keeps negotiation to host candidates, which is enough on a LAN.
    pub ice_servers: Vec<String>,
    /// Wait for ICE gathering before returning from `set_local_description`.
    pub wait_for_gathering: bool,
    /// Skip IPv6 link-local addresses (fe80::/10), which fail to bind on some Linux hosts.
    pub reject_ipv6_link_local: bool,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: Vec::new(),
            wait_for_gathering: true,
            reject_ipv6_link_local: true,
        }
    }
}

/// One WebRTC peer connection, used by exactly one signaling session.
pub struct WebRtcAdapter {
    peer_connection: Arc<RTCPeerConnection>,
    config: WebRtcConfig,
    event_rx: Arc<Mutex<mpsc::UnboundedReceiver<AdapterEvent<WebRtcChannel>>>>,
}

impl WebRtcAdapter {
    /// Builds a peer connection and wires its state and data-channel callbacks
    /// into the adapter event stream.
    pub async fn new(config: WebRtcConfig) -> Result<Self> {
        let media_engine = MediaEngine::default();

        let mut setting_engine = SettingEngine::default();
        if config.reject_ipv6_link_local {
            setting_engine.set_ip_filter(Box::new(|ip: std::net::IpAddr| match ip {
                std::net::IpAddr::V6(v6) => {
                    let octets = v6.octets();
                    !(octets[0] == 0xfe && (octets[1] & 0xc0) == 0x80)
                }
                _ => true,
            }));
        }

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_setting_engine(setting_engine)
            .build();

        let ice_servers = if config.ice_servers.is_empty() {
            vec![]
        } else {
            vec![RTCIceServer {
                urls: config.ice_servers.clone(),
                ..Default::default()
            }]
        };
        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let state_tx = event_tx.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                tracing::debug!("peer connection state changed: {}", state);
                let event = match state {
                    RTCPeerConnectionState::Connected => Some(AdapterEvent::Connected),
                    RTCPeerConnectionState::Failed => {
                        Some(AdapterEvent::Failed("peer connection failed".to_string()))
                    }
                    RTCPeerConnectionState::Closed => Some(AdapterEvent::Closed),
                    _ => None,
                };
                if let Some(event) = event {
                    let _ = state_tx.send(event);
                }
                Box::pin(async {})
            },
        ));

        peer_connection.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
            tracing::debug!("incoming data channel {:?}", channel.label());
            let _ = event_tx.send(AdapterEvent::IncomingChannel(WebRtcChannel::new(channel)));
            Box::pin(async {})
        }));

        Ok(Self {
            peer_connection,
            config,
            event_rx: Arc::new(Mutex::new(event_rx)),
        })
    }

    /// Gets a clone of the underlying peer connection.
    pub fn peer_connection(&self) -> Arc<RTCPeerConnection> {
        self.peer_connection.clone()
    }

    fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription> {
        let rtc = match description.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(description.sdp)?,
            SdpType::Answer => RTCSessionDescription::answer(description.sdp)?,
        };
        Ok(rtc)
    }

    fn from_rtc(description: RTCSessionDescription) -> Result<SessionDescription> {
        let sdp_type = match description.sdp_type {
            RTCSdpType::Offer => SdpType::Offer,
            RTCSdpType::Answer => SdpType::Answer,
            other => {
                return Err(PeerlinkError::Negotiation(format!(
                    "unsupported description type {}",
                    other
                )));
            }
        };
        Ok(SessionDescription::new(sdp_type, description.sdp))
    }
}

impl TransportAdapter for WebRtcAdapter {
    type Channel = WebRtcChannel;

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.peer_connection.create_offer(None).await?;
        Self::from_rtc(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.peer_connection.create_answer(None).await?;
        Self::from_rtc(answer)
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<SessionDescription> {
        let rtc = Self::to_rtc(description)?;

        // Subscribe before applying, otherwise completion can be missed.
        let mut gather_complete = self.peer_connection.gathering_complete_promise().await;
        self.peer_connection.set_local_description(rtc).await?;
        if self.config.wait_for_gathering {
            let _ = gather_complete.recv().await;
        }

        let local = self.peer_connection.local_description().await.ok_or_else(|| {
            PeerlinkError::Negotiation("local description missing after apply".to_string())
        })?;
        Self::from_rtc(local)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let rtc = Self::to_rtc(description)?;
        self.peer_connection.set_remote_description(rtc).await?;
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<WebRtcChannel> {
        let channel = self
            .peer_connection
            .create_data_channel(
                label,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await?;
        Ok(WebRtcChannel::new(channel))
    }

    fn events(&self) -> Pin<Box<dyn Stream<Item = AdapterEvent<WebRtcChannel>> + Send>> {
        let rx = self.event_rx.clone();
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut locked_rx = rx.lock().await;
            let event = locked_rx.recv().await;
            drop(locked_rx);
            event.map(|e| (e, rx))
        }))
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

#[derive(Debug)]
enum ChannelEvent {
    Open,
    Close,
    Error(String),
    Message(String),
}

/// Data channel handle that buffers callbacks until a notifier is attached.
#[derive(Clone)]
pub struct WebRtcChannel {
    channel: Arc<RTCDataChannel>,
    label: String,
    pending: Arc<std::sync::Mutex<Option<mpsc::UnboundedReceiver<ChannelEvent>>>>,
}

impl WebRtcChannel {
    /// Registers the open/close/error/message callbacks on `channel`.
    ///
    /// Callbacks feed an internal queue so nothing raised between creation and
    /// [`attach`](ChannelHandle::attach) is lost or reordered.
    pub fn new(channel: Arc<RTCDataChannel>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let open_tx = tx.clone();
        channel.on_open(Box::new(move || {
            let _ = open_tx.send(ChannelEvent::Open);
            Box::pin(async {})
        }));

        let close_tx = tx.clone();
        channel.on_close(Box::new(move || {
            let _ = close_tx.send(ChannelEvent::Close);
            Box::pin(async {})
        }));

        let error_tx = tx.clone();
        channel.on_error(Box::new(move |err: webrtc::Error| {
            let _ = error_tx.send(ChannelEvent::Error(err.to_string()));
            Box::pin(async {})
        }));

        let message_tx = tx.clone();
        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            if !msg.is_string {
                tracing::debug!("binary message of {} bytes decoded as text", msg.data.len());
            }
            let text = String::from_utf8_lossy(&msg.data).into_owned();
            let _ = message_tx.send(ChannelEvent::Message(text));
            Box::pin(async {})
        }));

        // Incoming channels can already be open by the time we see them.
        if channel.ready_state() == RTCDataChannelState::Open {
            let _ = tx.send(ChannelEvent::Open);
        }

        Self {
            label: channel.label().to_string(),
            channel,
            pending: Arc::new(std::sync::Mutex::new(Some(rx))),
        }
    }

    pub fn ready_state(&self) -> RTCDataChannelState {
        self.channel.ready_state()
    }
}

impl ChannelHandle for WebRtcChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn attach(&self, notifier: Arc<dyn ChannelNotifier>) {
        let rx = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut rx) = rx else {
            tracing::warn!("data channel {:?} already has a notifier", self.label);
            return;
        };

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    ChannelEvent::Open => notifier.notify_open(),
                    ChannelEvent::Close => notifier.notify_close(),
                    ChannelEvent::Error(diagnostic) => notifier.notify_error(diagnostic),
                    ChannelEvent::Message(text) => notifier.notify_message(text),
                }
            }
        });
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.channel
            .send_text(text)
            .await
            .map_err(|e| PeerlinkError::DataChannel(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.channel
            .close()
            .await
            .map_err(|e| PeerlinkError::DataChannel(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_SDP: &str = "v=0\r\no=- 4215775240449105457 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

    #[test]
    fn test_rtc_conversion_keeps_role() {
        let rtc = WebRtcAdapter::to_rtc(SessionDescription::answer(SAMPLE_SDP)).unwrap();
        assert_eq!(rtc.sdp_type, RTCSdpType::Answer);

        let back = WebRtcAdapter::from_rtc(rtc).unwrap();
        assert_eq!(back, SessionDescription::answer(SAMPLE_SDP));
    }

    #[test]
    fn test_default_config_is_lan_only() {
        let config = WebRtcConfig::default();
        assert!(config.ice_servers.is_empty());
        assert!(config.wait_for_gathering);
    }

    #[tokio::test]
    async fn test_offer_contains_data_section() {
        let adapter = WebRtcAdapter::new(WebRtcConfig::default()).await.unwrap();
        let channel = adapter.create_data_channel("chat").await.unwrap();
        assert_eq!(channel.label(), "chat");

        let offer = adapter.create_offer().await.unwrap();
        assert_eq!(offer.sdp_type, SdpType::Offer);
        assert!(offer.sdp.contains("m=application"));
        adapter.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_garbage_remote_description_is_rejected() {
        let adapter = WebRtcAdapter::new(WebRtcConfig::default()).await.unwrap();
        let err = adapter
            .set_remote_description(SessionDescription::offer("not an sdp"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Negotiation);
        adapter.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_loopback_host_and_guest() {
        use crate::channel::{ChannelState, MessageChannel};
        use crate::error::ErrorKind;
        use crate::session::{SessionConfig, SignalingSession};
        use std::time::Duration;

        async fn reaches<C: ChannelHandle>(channel: &MessageChannel<C>, state: ChannelState) -> bool {
            for _ in 0..200 {
                if channel.state() == state {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            false
        }

        let config = SessionConfig {
            negotiation_timeout: Some(Duration::from_secs(20)),
            ..Default::default()
        };
        let mut host = SignalingSession::new(
            WebRtcAdapter::new(WebRtcConfig::default()).await.unwrap(),
            config.clone(),
        );
        let mut guest = SignalingSession::new(
            WebRtcAdapter::new(WebRtcConfig::default()).await.unwrap(),
            config,
        );

        let offer = host.start_as_host().await.unwrap();
        let answer = guest.start_as_guest(&offer).await.unwrap();
        host.supply_remote(&answer).await.unwrap();

        // The guest's channel is attached only here, after the engine may
        // already have opened it.
        let (host_channel, guest_channel) =
            tokio::try_join!(host.wait_for_channel(), guest.wait_for_channel()).unwrap();
        assert_eq!(host_channel.label(), "chat");
        assert_eq!(guest_channel.label(), "chat");

        let (host_state, guest_state) = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(host_channel.wait_open(), guest_channel.wait_open())
        })
        .await
        .unwrap();
        assert_eq!(host_state, ChannelState::Open);
        assert_eq!(guest_state, ChannelState::Open);

        for i in 0..50 {
            host_channel.send(format!("message {}", i)).await.unwrap();
        }
        for i in 0..50 {
            let received = tokio::time::timeout(Duration::from_secs(5), guest_channel.recv())
                .await
                .unwrap();
            assert_eq!(received, Some(format!("message {}", i)));
        }

        guest_channel.send("back").await.unwrap();
        let received = tokio::time::timeout(Duration::from_secs(5), host_channel.recv())
            .await
            .unwrap();
        assert_eq!(received.as_deref(), Some("back"));

        host.close().await.unwrap();
        assert!(reaches(&host_channel, ChannelState::Closed).await);
        assert!(reaches(&guest_channel, ChannelState::Closed).await);

        let err = host_channel.send("late").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChannelNotOpen);
        guest.close().await.unwrap();
    }
}
