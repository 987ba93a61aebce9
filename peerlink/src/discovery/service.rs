use super::{DiscoveryConfig, DiscoveryEvent, PeerRecord};
use crate::error::{PeerlinkError, Result};
use crate::identity::KeyIdentity;
use crate::protocol::{Decoded, DiscoveryMessage};
use futures::Stream;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{RwLock, broadcast};
use tokio_util::sync::CancellationToken;

type PeerTable = Arc<RwLock<HashMap<SocketAddr, PeerRecord>>>;

/// What the receive loop does with one decoded datagram.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    Reply(DiscoveryMessage),
    Record(PeerRecord),
    Ignore,
}

/// UDP discovery endpoint with a background receive loop and a peer table.
pub struct DiscoveryService {
    identity: Arc<KeyIdentity>,
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    peers: PeerTable,
    event_tx: broadcast::Sender<DiscoveryEvent>,
    config: DiscoveryConfig,
    cancel_token: CancellationToken,
}

impl DiscoveryService {
    /// Binds the discovery socket and starts the receive loop.
    ///
    /// A bind failure (port in use, permission denied) is returned here as
    /// [`PeerlinkError::Bind`] rather than surfacing later from the loop.
    pub async fn start(identity: Arc<KeyIdentity>, config: DiscoveryConfig) -> Result<Self> {
        let socket = Self::bind_socket(&config)
            .await
            .map_err(|source| PeerlinkError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        socket.set_broadcast(true)?;
        let local_addr = socket.local_addr()?;

        // Sends fail while nobody is subscribed, so nothing queues up unread.
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));

        let service = Self {
            identity,
            socket: Arc::new(socket),
            local_addr,
            peers: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            config,
            cancel_token: CancellationToken::new(),
        };

        service.start_background_tasks();
        tracing::info!(
            "discovery listening on {} as {}",
            local_addr,
            service.identity.fingerprint()
        );
        Ok(service)
    }

    async fn bind_socket(config: &DiscoveryConfig) -> std::io::Result<UdpSocket> {
        let bind_addr = config.bind_addr;
        if config.reuse_port {
            let socket = socket2::Socket::new(
                socket2::Domain::for_address(bind_addr),
                socket2::Type::DGRAM,
                Some(socket2::Protocol::UDP),
            )?;

            socket.set_reuse_address(true)?;
            #[cfg(unix)]
            socket.set_reuse_port(true)?;
            socket.set_nonblocking(true)?;
            socket.bind(&bind_addr.into())?;

            UdpSocket::from_std(socket.into())
        } else {
            UdpSocket::bind(bind_addr).await
        }
    }

    fn start_background_tasks(&self) {
        let event_tx = self.event_tx.clone();
        let socket = self.socket.clone();
        let peers = self.peers.clone();
        let identity = self.identity.clone();
        let max_datagram_size = self.config.max_datagram_size;
        let cancel_token = self.cancel_token.clone();

        // Receive loop. One task, so datagrams are handled in arrival order.
        tokio::spawn(async move {
            // One spare byte to detect reads the kernel would otherwise truncate silently.
            let mut buf = vec![0u8; max_datagram_size + 1];
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    received = socket.recv_from(&mut buf) => {
                        match received {
                            Ok((n, addr)) => {
                                Self::handle_datagram(
                                    &buf[..n],
                                    addr,
                                    max_datagram_size,
                                    &identity,
                                    &socket,
                                    &peers,
                                    &event_tx,
                                )
                                .await;
                            }
                            Err(e) => {
                                // ICMP unreachable from an earlier send shows up here on some platforms.
                                tracing::warn!("discovery receive error: {}", e);
                            }
                        }
                    }
                }
            }
            tracing::debug!("discovery receive loop stopped");
        });

        if let Some(ttl) = self.config.peer_ttl {
            let peers = self.peers.clone();
            let cancel_token = self.cancel_token.clone();
            let cleanup_interval = self.config.cleanup_interval;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(cleanup_interval);
                loop {
                    tokio::select! {
                        _ = cancel_token.cancelled() => break,
                        _ = interval.tick() => {
                            Self::cleanup_peers(&peers, ttl).await;
                        }
                    }
                }
            });
        }
    }

    async fn handle_datagram(
        data: &[u8],
        source: SocketAddr,
        max_datagram_size: usize,
        identity: &KeyIdentity,
        socket: &UdpSocket,
        peers: &PeerTable,
        event_tx: &broadcast::Sender<DiscoveryEvent>,
    ) {
        let action = match Self::dispatch(data, source, identity.public_key_text(), max_datagram_size) {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!("dropping datagram from {}: {}", source, e);
                let _ = event_tx.send(DiscoveryEvent::DatagramDropped {
                    from: source,
                    reason: e.to_string(),
                });
                return;
            }
        };

        match action {
            Action::Reply(response) => match response.encode() {
                Ok(payload) => {
                    if let Err(e) = socket.send_to(&payload, source).await {
                        tracing::warn!("failed to answer probe from {}: {}", source, e);
                    } else {
                        tracing::debug!("answered probe from {}", source);
                    }
                }
                Err(e) => tracing::error!("failed to encode discovery response: {}", e),
            },
            Action::Record(record) => {
                tracing::debug!("discovered peer {}", record.peer_address);
                peers
                    .write()
                    .await
                    .insert(record.peer_address, record.clone());
                let _ = event_tx.send(DiscoveryEvent::PeerDiscovered(record));
            }
            Action::Ignore => {}
        }
    }

    /// Decides what to do with one datagram without touching any IO.
    fn dispatch(
        data: &[u8],
        source: SocketAddr,
        public_key: &str,
        max_datagram_size: usize,
    ) -> Result<Action> {
        if data.len() > max_datagram_size {
            return Err(PeerlinkError::MalformedDatagram(format!(
                "datagram exceeds {} bytes",
                max_datagram_size
            )));
        }

        match DiscoveryMessage::decode(data)? {
            Decoded::Message(DiscoveryMessage::Discover) => Ok(Action::Reply(
                DiscoveryMessage::response_to(source, public_key),
            )),
            Decoded::Message(DiscoveryMessage::DiscoverResponse { public_key, ip }) => {
                Ok(Action::Record(PeerRecord {
                    peer_address: source,
                    public_key,
                    reflected_ip: ip,
                    last_seen: Instant::now(),
                }))
            }
            Decoded::Unknown(tag) => {
                tracing::debug!("ignoring discovery message type {:?} from {}", tag, source);
                Ok(Action::Ignore)
            }
        }
    }

    async fn cleanup_peers(peers: &PeerTable, ttl: Duration) -> usize {
        let mut peers = peers.write().await;
        let before = peers.len();
        peers.retain(|_, record| record.last_seen.elapsed() < ttl);
        before - peers.len()
    }

    /// Sends a `discover` probe to `target`. Nothing is awaited from the peer.
    pub async fn probe(&self, target: SocketAddr) -> Result<()> {
        let payload = DiscoveryMessage::Discover.encode()?;
        self.socket.send_to(&payload, target).await?;
        tracing::debug!("probe sent to {}", target);
        Ok(())
    }

    /// Probes the configured broadcast target.
    pub async fn scan(&self) -> Result<()> {
        self.probe(self.config.broadcast_target).await
    }

    /// Snapshot of the peer table.
    pub async fn peers(&self) -> HashMap<SocketAddr, PeerRecord> {
        self.peers.read().await.clone()
    }

    /// Removes records older than `ttl` and returns how many were evicted.
    pub async fn prune_stale(&self, ttl: Duration) -> usize {
        Self::cleanup_peers(&self.peers, ttl).await
    }

    /// Stream of receive-loop notifications.
    ///
    /// Every call is an independent subscriber that sees events from the
    /// moment it subscribes. A subscriber that falls more than
    /// `event_capacity` events behind skips the oldest ones.
    pub fn events(&self) -> Pin<Box<dyn Stream<Item = DiscoveryEvent> + Send>> {
        let rx = self.event_tx.subscribe();
        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("discovery subscriber lagged, {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }))
    }

    /// Address the discovery socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn identity(&self) -> &Arc<KeyIdentity> {
        &self.identity
    }

    /// Stops the receive loop and the cleanup task.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel_token.is_cancelled()
    }
}

impl Drop for DiscoveryService {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
