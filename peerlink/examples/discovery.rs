//! Two discovery nodes on one host finding each other over loopback.
//!
//! Run with `cargo run -p peerlink --example discovery`.

use futures::StreamExt;
use peerlink::{DiscoveryConfigBuilder, DiscoveryEvent, DiscoveryService, KeyIdentity};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);
    let filter_layer = filter::LevelFilter::from_level(Level::DEBUG);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter_layer)
        .init();

    // Ephemeral loopback ports so the example never fights over 5555.
    let config = DiscoveryConfigBuilder::new()
        .bind_address(([127, 0, 0, 1], 0))
        .build();

    let alice = DiscoveryService::start(Arc::new(KeyIdentity::generate()?), config.clone()).await?;
    let bob = DiscoveryService::start(Arc::new(KeyIdentity::generate()?), config).await?;

    tracing::info!("alice {} on {}", alice.identity().fingerprint(), alice.local_addr());
    tracing::info!("bob   {} on {}", bob.identity().fingerprint(), bob.local_addr());

    let mut events = alice.events();
    alice.probe(bob.local_addr()).await?;

    match tokio::time::timeout(Duration::from_secs(2), events.next()).await {
        Ok(Some(DiscoveryEvent::PeerDiscovered(record))) => {
            tracing::info!(
                "alice found {} (sees alice as {})",
                record.peer_address,
                record.reflected_ip
            );
            println!("{}", record.public_key);
        }
        Ok(other) => tracing::warn!("unexpected discovery outcome: {:?}", other),
        Err(_) => tracing::warn!("no response within 2s"),
    }

    alice.shutdown();
    bob.shutdown();
    Ok(())
}
