use clap::{Parser, Subcommand};
use peerlink::protocol::constants::{DEFAULT_CHANNEL_LABEL, DEFAULT_DISCOVERY_PORT};
use peerlink::{
    ChannelHandle, ChannelState, DiscoveryConfigBuilder, DiscoveryEvent, DiscoveryService,
    ErrorKind, KeyIdentity, MessageChannel, SessionConfigBuilder, SignalingSession,
    WebRtcAdapter, WebRtcConfig,
};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::Level;
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

type StdinLines = Lines<BufReader<Stdin>>;

#[derive(Debug, Parser)]
#[command(name = "lanchat", version, about = "LAN discovery and copy-paste WebRTC chat")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Answer discovery probes and list the peers that respond to ours
    Discover {
        /// Discovery port to bind and probe
        #[arg(short, long, default_value_t = DEFAULT_DISCOVERY_PORT)]
        port: u16,
        /// Probe this address instead of broadcasting
        #[arg(short, long)]
        target: Option<SocketAddr>,
        /// Seconds to collect responses before printing the peer table
        #[arg(short, long, default_value_t = 3)]
        wait: u64,
        /// Share the port with other processes on this host
        #[arg(long)]
        reuse_port: bool,
    },
    /// Create an offer, paste the guest's answer, then chat
    Host {
        /// STUN/TURN server URL, repeatable
        #[arg(long)]
        ice_server: Vec<String>,
        /// Data channel label
        #[arg(long, default_value = DEFAULT_CHANNEL_LABEL)]
        label: String,
    },
    /// Paste the host's offer, hand back the answer, then chat
    Guest {
        /// STUN/TURN server URL, repeatable
        #[arg(long)]
        ice_server: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // stdout carries descriptions and chat text
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter_layer = filter::LevelFilter::from_level(level);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter_layer)
        .init();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    match cli.command {
        Command::Discover {
            port,
            target,
            wait,
            reuse_port,
        } => discover(port, target, Duration::from_secs(wait), reuse_port).await,
        Command::Host { ice_server, label } => host(ice_server, label, &mut lines).await,
        Command::Guest { ice_server } => guest(ice_server, &mut lines).await,
    }
}

async fn discover(
    port: u16,
    target: Option<SocketAddr>,
    wait: Duration,
    reuse_port: bool,
) -> Result<(), Box<dyn Error>> {
    let identity = Arc::new(KeyIdentity::generate()?);
    let config = DiscoveryConfigBuilder::new()
        .port(port)
        .reuse_port(reuse_port)
        .build();
    let service = DiscoveryService::start(identity.clone(), config).await?;

    tracing::info!(
        "Discovery on {} as {} ({})",
        service.local_addr(),
        identity.fingerprint(),
        identity.algorithm()
    );

    let mut events = service.events();
    let watcher = tokio::spawn(async move {
        use futures::StreamExt;
        while let Some(event) = events.next().await {
            match event {
                DiscoveryEvent::PeerDiscovered(record) => {
                    tracing::info!(
                        "Peer {} answered, sees us as {}",
                        record.peer_address,
                        record.reflected_ip
                    );
                }
                DiscoveryEvent::DatagramDropped { from, reason } => {
                    tracing::debug!("Dropped datagram from {}: {}", from, reason);
                }
            }
        }
    });

    match target {
        Some(target) => service.probe(target).await?,
        None => service.scan().await?,
    }
    tokio::time::sleep(wait).await;

    let mut peers: Vec<_> = service.peers().await.into_values().collect();
    peers.sort_by_key(|record| record.peer_address);
    println!("{} peer(s)", peers.len());
    for record in peers {
        println!("{}", record.peer_address);
        println!("{}", record.public_key.trim_end());
    }

    service.shutdown();
    watcher.abort();
    Ok(())
}

async fn host(
    ice_servers: Vec<String>,
    label: String,
    lines: &mut StdinLines,
) -> Result<(), Box<dyn Error>> {
    let adapter = WebRtcAdapter::new(WebRtcConfig {
        ice_servers,
        ..Default::default()
    })
    .await?;
    let config = SessionConfigBuilder::new().channel_label(label).build();
    let mut session = SignalingSession::new(adapter, config);

    let offer = session.start_as_host().await?;
    println!("Offer (send this to the guest):");
    println!("{}", offer);
    println!("Paste the guest's answer:");

    let answer = lines.next_line().await?.ok_or("stdin closed before an answer")?;
    session.supply_remote(&answer).await?;

    let channel = session.wait_for_channel().await?;
    let result = chat(&channel, lines).await;
    session.close().await?;
    result
}

async fn guest(ice_servers: Vec<String>, lines: &mut StdinLines) -> Result<(), Box<dyn Error>> {
    let adapter = WebRtcAdapter::new(WebRtcConfig {
        ice_servers,
        ..Default::default()
    })
    .await?;
    let mut session = SignalingSession::new(adapter, SessionConfigBuilder::new().build());

    println!("Paste the host's offer:");
    let offer = lines.next_line().await?.ok_or("stdin closed before an offer")?;
    let answer = session.start_as_guest(&offer).await?;
    println!("Answer (send this to the host):");
    println!("{}", answer);

    let channel = session.wait_for_channel().await?;
    let result = chat(&channel, lines).await;
    session.close().await?;
    result
}

async fn chat<C: ChannelHandle>(
    channel: &MessageChannel<C>,
    lines: &mut StdinLines,
) -> Result<(), Box<dyn Error>> {
    let state = channel.wait_open().await;
    if state != ChannelState::Open {
        return Err(format!("channel {:?} ended up {}", channel.label(), state).into());
    }
    println!("Connected on {:?}. Type to chat, EOF to quit.", channel.label());

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(text) if text.trim().is_empty() => continue,
                    Some(text) => match channel.send(text).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::ChannelNotOpen => {
                            tracing::info!("Channel {}, message not sent", channel.state());
                            break;
                        }
                        Err(e) => return Err(e.into()),
                    },
                    None => {
                        channel.close().await?;
                        break;
                    }
                }
            }
            message = channel.recv() => {
                match message {
                    Some(text) => println!("peer> {}", text),
                    None => {
                        tracing::info!("Channel {}", channel.state());
                        if let Some(diagnostic) = channel.last_error() {
                            tracing::warn!("Last error: {}", diagnostic);
                        }
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
