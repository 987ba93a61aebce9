//! Host and guest sessions in one process, signaling by passing the JSON
//! blobs directly instead of through a human.
//!
//! Run with `cargo run -p peerlink --example local_chat`.

use peerlink::{
    ChannelState, SessionConfigBuilder, SignalingSession, WebRtcAdapter, WebRtcConfig,
};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);
    let filter_layer = filter::LevelFilter::from_level(Level::INFO);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter_layer)
        .init();

    let config = SessionConfigBuilder::new()
        .negotiation_timeout(Duration::from_secs(15))
        .build();

    let mut host = SignalingSession::new(
        WebRtcAdapter::new(WebRtcConfig::default()).await?,
        config.clone(),
    );
    let mut guest = SignalingSession::new(WebRtcAdapter::new(WebRtcConfig::default()).await?, config);

    let offer = host.start_as_host().await?;
    tracing::info!("offer is {} bytes", offer.len());

    let answer = guest.start_as_guest(&offer).await?;
    tracing::info!("answer is {} bytes", answer.len());
    host.supply_remote(&answer).await?;

    let (host_channel, guest_channel) = tokio::try_join!(host.wait_for_channel(), guest.wait_for_channel())?;

    let (host_state, guest_state) = tokio::join!(host_channel.wait_open(), guest_channel.wait_open());
    if host_state != ChannelState::Open || guest_state != ChannelState::Open {
        return Err(format!("channels ended up {} / {}", host_state, guest_state).into());
    }

    host_channel.send("hello from the host").await?;
    if let Some(text) = guest_channel.recv().await {
        tracing::info!("guest received: {}", text);
    }

    guest_channel.send("hello back").await?;
    if let Some(text) = host_channel.recv().await {
        tracing::info!("host received: {}", text);
    }

    host_channel.close().await?;
    host.close().await?;
    guest.close().await?;
    Ok(())
}
