//! LanLinkProvider: discovery, connection-race resolution, and the peer map.
//!
//! # Architecture
//!
//! All provider state (sockets, the [`PeerTable`], the last network
//! snapshot, counters) is owned by a single event-loop task.  The public
//! [`LanLinkProvider`] is a cheap, cloneable handle that sends commands to
//! that task and awaits the reply.
//!
//! ```text
//!  handle ──commands──►┐
//!                      │        ┌──────────────┐
//!  DiscoveryListener ──┤        │              │──► LinkEvent::Established
//!  ConnectionAcceptor ─┼─events─►  event loop  │──► LinkEvent::Lost
//!  outbound attempts ──┤        │ (PeerTable)  │
//!  DeviceLink tasks ───┤        └──────────────┘
//!  expiry timers ──────┘
//! ```
//!
//! Helper tasks do the I/O (accepting, connecting, reading identities) and
//! only ever *report* to the loop.  The loop applies one event at a time,
//! so there are no locks and no interleaving between a decision and the
//! state change it implies.
//!
//! # Stale events
//!
//! Every outbound attempt carries an [`AttemptId`] and every link a
//! [`LinkId`].  An outcome that arrives after its attempt was superseded
//! (expired, replaced by an inbound link, or torn down by `stop`) no longer
//! matches the table and is discarded; its stream is dropped and closed.

use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;
use std::time::Duration;

use async_trait::async_trait;
use lanlink_core::{IdentityPackage, NetworkPackage, NetworkSnapshot, PeerIdentity};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::application::events::{LinkEvent, LinkTransport};
use crate::application::peer_table::{AnnouncementDecision, AttemptId, InboundDecision, PeerTable};
use crate::application::provider::{LinkProvider, ProviderFailure, PRIORITY_HIGH};

use super::acceptor::{AcceptOptions, AcceptorError, ConnectionAcceptor, InboundConnection};
use super::connector::{connect_and_identify, ConnectOptions, OutboundLink};
use super::device_link::{DeviceLink, LinkClosed, LinkError, LinkId};
use super::discovery::{Announcement, DiscoveryError, DiscoveryListener};
use super::handshake::{HandshakeError, HandshakenStream};
use super::interfaces;
use super::socket_config::SocketPolicy;

pub const PROVIDER_NAME: &str = "LanLinkProvider";

/// Capacity of each link's inbound package queue.
const INBOUND_QUEUE: usize = 256;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Runtime settings for one provider instance.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Our identity.  `tcp_port` is filled in from the bound listener.
    pub local: IdentityPackage,
    /// Where the discovery socket binds.  Port 0 picks a free port.
    pub discovery_addr: SocketAddr,
    pub broadcast_ip: IpAddr,
    /// Destination port for announcements.  `None` uses the port the
    /// discovery socket is bound to.
    pub broadcast_port: Option<u16>,
    /// Ports tried for the link listener; `0..=0` lets the OS choose.
    pub tcp_ports: RangeInclusive<u16>,
    /// Period of repeated announcements; `None` announces only on start and
    /// on network changes.
    pub announce_interval: Option<Duration>,
    pub connect_timeout: Duration,
    pub handshake_grace: Duration,
    /// How long a peer we expect to dial us keeps its `Connecting` entry.
    pub pending_timeout: Duration,
    pub max_package_bytes: usize,
    pub socket_policy: SocketPolicy,
}

impl ProviderConfig {
    /// Settings with the standard ports and timeouts.
    pub fn new(local: IdentityPackage) -> Self {
        Self {
            local,
            discovery_addr: SocketAddr::from(([0, 0, 0, 0], lanlink_core::DEFAULT_DISCOVERY_PORT)),
            broadcast_ip: IpAddr::from([255, 255, 255, 255]),
            broadcast_port: Some(lanlink_core::DEFAULT_DISCOVERY_PORT),
            tcp_ports: 1714..=1764,
            announce_interval: Some(Duration::from_secs(30)),
            connect_timeout: Duration::from_secs(5),
            handshake_grace: Duration::from_secs(5),
            pending_timeout: Duration::from_secs(10),
            max_package_bytes: 1024 * 1024,
            socket_policy: SocketPolicy::default(),
        }
    }

    fn accept_options(&self) -> AcceptOptions {
        AcceptOptions {
            policy: self.socket_policy,
            handshake_grace: self.handshake_grace,
            max_package_bytes: self.max_package_bytes,
        }
    }

    fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            policy: self.socket_policy,
            connect_timeout: self.connect_timeout,
            handshake_grace: self.handshake_grace,
            max_package_bytes: self.max_package_bytes,
        }
    }
}

// ── Public types ──────────────────────────────────────────────────────────────

/// Error type for provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider is already started")]
    AlreadyStarted,

    #[error("provider is not started")]
    NotStarted,

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Acceptor(#[from] AcceptorError),

    #[error("no link to {0}")]
    PeerNotLinked(PeerIdentity),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("provider event loop has exited")]
    LoopClosed,
}

/// What a network-change notification did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkChangeOutcome {
    /// The usable address set is the same; nothing was touched.
    Unchanged,
    /// Sockets were rebound and the provider re-announced itself.
    Rebound,
    /// The provider is stopped; the snapshot was only stored.
    Recorded,
}

/// Point-in-time view of a provider, mostly for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStatus {
    pub running: bool,
    pub discovery_addr: Option<SocketAddr>,
    pub tcp_port: Option<u16>,
    pub linked_peers: Vec<PeerIdentity>,
    /// Broadcast announcements successfully sent since creation.
    pub announcements_sent: u64,
    /// Socket rebinds caused by network changes since creation.
    pub rebinds: u64,
    pub snapshot: NetworkSnapshot,
}

// ── Internal messages ─────────────────────────────────────────────────────────

enum Command {
    Start(oneshot::Sender<Result<ProviderStatus, ProviderError>>),
    Stop(oneshot::Sender<()>),
    NetworkChanged(
        NetworkSnapshot,
        oneshot::Sender<Result<NetworkChangeOutcome, ProviderError>>,
    ),
    Announce(oneshot::Sender<Result<(), ProviderError>>),
    Send {
        peer: PeerIdentity,
        package: NetworkPackage,
        reply: oneshot::Sender<Result<(), ProviderError>>,
    },
    Status(oneshot::Sender<ProviderStatus>),
}

/// Reports from helper tasks, consumed in arrival order.
enum ProviderEvent {
    Announced(Announcement),
    Inbound(InboundConnection),
    Outbound {
        peer: PeerIdentity,
        attempt: AttemptId,
        result: Result<OutboundLink, HandshakeError>,
    },
    Closed(LinkClosed),
    PendingExpired {
        peer: PeerIdentity,
        attempt: AttemptId,
    },
}

impl From<Announcement> for ProviderEvent {
    fn from(a: Announcement) -> Self {
        ProviderEvent::Announced(a)
    }
}

impl From<InboundConnection> for ProviderEvent {
    fn from(c: InboundConnection) -> Self {
        ProviderEvent::Inbound(c)
    }
}

impl From<LinkClosed> for ProviderEvent {
    fn from(c: LinkClosed) -> Self {
        ProviderEvent::Closed(c)
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Handle to a LAN link provider.  Clones share the same provider; the event
/// loop exits (stopping everything) once every clone is dropped.
#[derive(Clone)]
pub struct LanLinkProvider {
    commands: mpsc::UnboundedSender<Command>,
    local_id: PeerIdentity,
}

impl LanLinkProvider {
    /// Creates a stopped provider and spawns its event loop.
    ///
    /// Must be called from within a Tokio runtime.  The returned receiver
    /// yields [`LinkEvent`]s for the provider's whole lifetime.
    pub fn new(config: ProviderConfig) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (consumers, consumers_rx) = mpsc::unbounded_channel();
        let local_id = config.local.device_id.clone();

        let event_loop = EventLoop {
            config,
            table: PeerTable::new(),
            running: None,
            snapshot: NetworkSnapshot::empty(),
            next_link_id: 1,
            announcements_sent: 0,
            rebinds: 0,
            events_tx,
            consumers,
        };
        tokio::spawn(event_loop.run(commands_rx, events_rx));

        (Self { commands, local_id }, consumers_rx)
    }

    pub fn local_id(&self) -> &PeerIdentity {
        &self.local_id
    }

    /// Binds the discovery and link sockets, captures the current network
    /// snapshot, and announces.
    ///
    /// # Errors
    ///
    /// [`ProviderError::AlreadyStarted`] if running; a bind error if either
    /// socket cannot be bound, in which case nothing stays bound.
    pub async fn start(&self) -> Result<ProviderStatus, ProviderError> {
        self.request(Command::Start).await?
    }

    /// Closes both sockets and every link.  Every link socket is closed and
    /// the peer map is empty when this returns.  No-op when stopped.
    pub async fn stop(&self) {
        let _ = self.request(Command::Stop).await;
    }

    /// Reports the current local network state.
    ///
    /// # Errors
    ///
    /// A bind error if rebinding failed; the provider keeps its links and
    /// retries on the next notification.
    pub async fn notify_network_change(
        &self,
        snapshot: NetworkSnapshot,
    ) -> Result<NetworkChangeOutcome, ProviderError> {
        self.request(|reply| Command::NetworkChanged(snapshot, reply))
            .await?
    }

    /// Broadcasts our identity now, outside the periodic schedule.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotStarted`] when stopped, or the send error.
    pub async fn announce(&self) -> Result<(), ProviderError> {
        self.request(Command::Announce).await?
    }

    /// Queues `package` on the link to `peer`.
    ///
    /// # Errors
    ///
    /// [`ProviderError::PeerNotLinked`] if there is no link to `peer`.
    pub async fn send(
        &self,
        peer: &PeerIdentity,
        package: NetworkPackage,
    ) -> Result<(), ProviderError> {
        let peer = peer.clone();
        self.request(|reply| Command::Send {
            peer,
            package,
            reply,
        })
        .await?
    }

    /// # Errors
    ///
    /// [`ProviderError::LoopClosed`] only if the event loop panicked.
    pub async fn status(&self) -> Result<ProviderStatus, ProviderError> {
        self.request(Command::Status).await
    }

    /// # Errors
    ///
    /// See [`LanLinkProvider::status`].
    pub async fn linked_peers(&self) -> Result<Vec<PeerIdentity>, ProviderError> {
        Ok(self.status().await?.linked_peers)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ProviderError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .map_err(|_| ProviderError::LoopClosed)?;
        rx.await.map_err(|_| ProviderError::LoopClosed)
    }
}

#[async_trait]
impl LinkProvider for LanLinkProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn priority(&self) -> i32 {
        PRIORITY_HIGH
    }

    async fn start(&self) -> Result<(), ProviderFailure> {
        LanLinkProvider::start(self)
            .await
            .map(|_| ())
            .map_err(|e| ProviderFailure::new(PROVIDER_NAME, e))
    }

    async fn stop(&self) {
        LanLinkProvider::stop(self).await;
    }

    async fn on_network_change(&self, snapshot: NetworkSnapshot) -> Result<(), ProviderFailure> {
        self.notify_network_change(snapshot)
            .await
            .map(|_| ())
            .map_err(|e| ProviderFailure::new(PROVIDER_NAME, e))
    }
}

// ── Event loop ────────────────────────────────────────────────────────────────

/// Sockets and helper tasks that exist only while started.
struct Running {
    discovery: Option<DiscoveryListener>,
    acceptor: Option<ConnectionAcceptor>,
    helpers: JoinSet<()>,
    ticker: Option<Interval>,
}

impl Running {
    async fn close_sockets(&mut self) {
        if let Some(discovery) = self.discovery.take() {
            discovery.shutdown().await;
        }
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.shutdown().await;
        }
    }
}

struct EventLoop {
    config: ProviderConfig,
    table: PeerTable<DeviceLink>,
    running: Option<Running>,
    snapshot: NetworkSnapshot,
    next_link_id: LinkId,
    announcements_sent: u64,
    rebinds: u64,
    events_tx: mpsc::UnboundedSender<ProviderEvent>,
    consumers: mpsc::UnboundedSender<LinkEvent>,
}

impl EventLoop {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<ProviderEvent>,
    ) {
        loop {
            if let Some(running) = self.running.as_mut() {
                while running.helpers.try_join_next().is_some() {}
            }

            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event).await,
                () = next_tick(&mut self.running) => self.announce().await,
            }
        }

        self.stop().await;
        debug!("provider event loop exited");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                let _ = reply.send(self.start().await);
            }
            Command::Stop(reply) => {
                self.stop().await;
                let _ = reply.send(());
            }
            Command::NetworkChanged(snapshot, reply) => {
                let _ = reply.send(self.network_changed(snapshot).await);
            }
            Command::Announce(reply) => {
                let result = if self.running.is_some() {
                    self.try_announce().await
                } else {
                    Err(ProviderError::NotStarted)
                };
                let _ = reply.send(result);
            }
            Command::Send {
                peer,
                package,
                reply,
            } => {
                let result = match self.table.linked(&peer) {
                    Some(link) => link.send(package).map_err(ProviderError::from),
                    None => Err(ProviderError::PeerNotLinked(peer)),
                };
                let _ = reply.send(result);
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    async fn handle_event(&mut self, event: ProviderEvent) {
        match event {
            ProviderEvent::Announced(announcement) => self.on_announcement(announcement).await,
            ProviderEvent::Inbound(inbound) => self.on_inbound(inbound),
            ProviderEvent::Outbound {
                peer,
                attempt,
                result,
            } => self.on_outbound(peer, attempt, result),
            ProviderEvent::Closed(closed) => self.on_link_closed(closed).await,
            ProviderEvent::PendingExpired { peer, attempt } => {
                if let Some(reverted) = self.table.revert_attempt(&peer, attempt) {
                    debug!(
                        "{peer} did not connect within {:?} (we were {:?}); forgetting it",
                        reverted.waited, reverted.role
                    );
                }
            }
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    async fn start(&mut self) -> Result<ProviderStatus, ProviderError> {
        if self.running.is_some() {
            return Err(ProviderError::AlreadyStarted);
        }

        let (discovery, acceptor) = self.bind_sockets().await?;
        self.snapshot = interfaces::current_snapshot().await;
        self.running = Some(Running {
            discovery: Some(discovery),
            acceptor: Some(acceptor),
            helpers: JoinSet::new(),
            ticker: self.config.announce_interval.map(announce_ticker),
        });
        info!(
            "{} started as {}",
            PROVIDER_NAME, self.config.local.device_id
        );

        self.announce().await;
        Ok(self.status())
    }

    async fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        running.helpers.shutdown().await;
        running.close_sockets().await;

        let links = self.table.drain();
        let count = links.len();
        for (peer, link) in links {
            link.close().await;
            self.emit(LinkEvent::Lost { peer });
        }
        info!("{PROVIDER_NAME} stopped; closed {count} link(s)");
    }

    /// Binds the discovery socket, then the link listener.  If the second
    /// bind fails the first socket is released again.
    async fn bind_sockets(
        &self,
    ) -> Result<(DiscoveryListener, ConnectionAcceptor), ProviderError> {
        let discovery = DiscoveryListener::bind(
            self.config.discovery_addr,
            self.config.local.device_id.clone(),
            self.config.max_package_bytes,
            self.events_tx.clone(),
        )
        .await?;

        match ConnectionAcceptor::bind(
            self.config.discovery_addr.ip(),
            self.config.tcp_ports.clone(),
            self.config.accept_options(),
            self.events_tx.clone(),
        ) {
            Ok(acceptor) => Ok((discovery, acceptor)),
            Err(e) => {
                discovery.shutdown().await;
                Err(e.into())
            }
        }
    }

    async fn network_changed(
        &mut self,
        snapshot: NetworkSnapshot,
    ) -> Result<NetworkChangeOutcome, ProviderError> {
        let Some(running) = self.running.as_mut() else {
            self.snapshot = snapshot;
            return Ok(NetworkChangeOutcome::Recorded);
        };
        let sockets_bound = running.discovery.is_some() && running.acceptor.is_some();
        if sockets_bound && !snapshot.differs_from(&self.snapshot) {
            return Ok(NetworkChangeOutcome::Unchanged);
        }

        info!(
            "network changed to {:?}; rebinding",
            snapshot.usable_addresses()
        );
        running.close_sockets().await;
        self.rebinds += 1;

        let (discovery, acceptor) = self.bind_sockets().await?;
        if let Some(running) = self.running.as_mut() {
            running.discovery = Some(discovery);
            running.acceptor = Some(acceptor);
        }
        self.snapshot = snapshot;
        self.announce().await;
        Ok(NetworkChangeOutcome::Rebound)
    }

    fn status(&self) -> ProviderStatus {
        let running = self.running.as_ref();
        ProviderStatus {
            running: running.is_some(),
            discovery_addr: running
                .and_then(|r| r.discovery.as_ref())
                .map(DiscoveryListener::local_addr),
            tcp_port: running
                .and_then(|r| r.acceptor.as_ref())
                .map(ConnectionAcceptor::port),
            linked_peers: self.table.linked_peers(),
            announcements_sent: self.announcements_sent,
            rebinds: self.rebinds,
            snapshot: self.snapshot.clone(),
        }
    }

    // ── Announcing ────────────────────────────────────────────────────────────

    /// Broadcasts our identity, logging instead of failing.
    async fn announce(&mut self) {
        if let Err(e) = self.try_announce().await {
            warn!("announcement not sent: {e}");
        }
    }

    async fn try_announce(&mut self) -> Result<(), ProviderError> {
        let Some((discovery, acceptor)) = self
            .running
            .as_ref()
            .and_then(|r| r.discovery.as_ref().zip(r.acceptor.as_ref()))
        else {
            return Err(ProviderError::NotStarted);
        };

        let package = self
            .config
            .local
            .clone()
            .with_tcp_port(acceptor.port())
            .to_package();
        let port = self
            .config
            .broadcast_port
            .unwrap_or(discovery.local_addr().port());
        let target = SocketAddr::new(self.config.broadcast_ip, port);

        discovery.announce(&package, target).await?;
        self.announcements_sent += 1;
        debug!("announced to {target}");
        Ok(())
    }

    /// Identity package sent as the first package on a TCP stream.
    fn tcp_identity(&self) -> NetworkPackage {
        self.config.local.clone().without_tcp_port().to_package()
    }

    // ── Event handlers ────────────────────────────────────────────────────────

    async fn on_announcement(&mut self, announcement: Announcement) {
        let tcp_identity = self.tcp_identity();
        let Some(running) = self.running.as_mut() else {
            return;
        };
        let peer = announcement.identity.device_id.clone();
        let local = &self.config.local.device_id;

        match self.table.on_announcement(local, &peer) {
            AnnouncementDecision::Ignore(reason) => {
                debug!("ignoring announcement from {peer}: {reason:?}");
            }
            AnnouncementDecision::Initiate { attempt } => {
                let addr = announcement.link_addr();
                info!("{peer} announced at {addr}; connecting");
                let options = self.config.connect_options();
                let events = self.events_tx.clone();
                running.helpers.spawn(async move {
                    let result = connect_and_identify(addr, &peer, &tcp_identity, options).await;
                    let _ = events.send(ProviderEvent::Outbound {
                        peer,
                        attempt,
                        result,
                    });
                });
            }
            AnnouncementDecision::AwaitInbound { attempt } => {
                debug!("{peer} announced; waiting for it to connect");
                let events = self.events_tx.clone();
                let expire_at = Instant::now() + self.config.pending_timeout;
                let expiring = peer.clone();
                running.helpers.spawn(async move {
                    tokio::time::sleep_until(expire_at).await;
                    let _ = events.send(ProviderEvent::PendingExpired {
                        peer: expiring,
                        attempt,
                    });
                });

                // The peer may not have heard us yet; tell it directly.
                if let (Some(discovery), Some(acceptor)) =
                    (running.discovery.as_ref(), running.acceptor.as_ref())
                {
                    let reply = self
                        .config
                        .local
                        .clone()
                        .with_tcp_port(acceptor.port())
                        .to_package();
                    if let Err(e) = discovery.announce(&reply, announcement.sender).await {
                        debug!("could not answer {peer} directly: {e}");
                    }
                }
            }
        }
    }

    fn on_inbound(&mut self, inbound: InboundConnection) {
        if self.running.is_none() {
            return;
        }
        let peer = inbound.identity.device_id.clone();
        match self.table.admit_inbound(&self.config.local.device_id, &peer) {
            InboundDecision::Admit => {}
            InboundDecision::RejectAlreadyLinked => {
                info!(
                    "{peer} is already linked; closing extra connection from {}",
                    inbound.stream.remote_addr
                );
                return;
            }
            InboundDecision::RejectOwnIdentity => {
                warn!(
                    "connection from {} claims our own identity; closing it",
                    inbound.stream.remote_addr
                );
                return;
            }
        }
        let preamble = self.tcp_identity();
        self.establish(peer, inbound.identity, inbound.stream, Some(preamble));
    }

    fn on_outbound(
        &mut self,
        peer: PeerIdentity,
        attempt: AttemptId,
        result: Result<OutboundLink, HandshakeError>,
    ) {
        match result {
            Ok(outbound) => {
                if self.running.is_some() && self.table.is_current_attempt(&peer, attempt) {
                    self.establish(peer, outbound.identity, outbound.stream, None);
                } else {
                    debug!("discarding superseded outbound stream to {peer}");
                }
            }
            Err(e) => {
                if let Some(reverted) = self.table.revert_attempt(&peer, attempt) {
                    warn!("link to {peer} failed after {:?}: {e}", reverted.waited);
                }
            }
        }
    }

    async fn on_link_closed(&mut self, closed: LinkClosed) {
        let LinkClosed {
            peer,
            link_id,
            reason,
        } = closed;
        match self
            .table
            .remove_linked_if(&peer, |link| link.link_id() == link_id)
        {
            Some(link) => {
                link.close().await;
                info!("link to {peer} lost ({reason:?})");
                self.emit(LinkEvent::Lost { peer });
            }
            None => debug!("ignoring close of stale link {link_id} to {peer}"),
        }
    }

    fn establish(
        &mut self,
        peer: PeerIdentity,
        identity: IdentityPackage,
        stream: HandshakenStream,
        preamble: Option<NetworkPackage>,
    ) {
        let link_id = self.next_link_id;
        self.next_link_id += 1;
        let remote_addr = stream.remote_addr;
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let link = DeviceLink::spawn(
            link_id,
            peer.clone(),
            stream,
            preamble,
            inbound_tx,
            self.events_tx.clone(),
        );

        if self.table.promote(peer.clone(), link).is_err() {
            // The rejected link is dropped here, closing its stream.
            debug!("{peer} already linked; dropping duplicate link {link_id}");
            return;
        }

        info!("link {link_id} to {peer} established via {remote_addr}");
        self.emit(LinkEvent::Established {
            peer: peer.clone(),
            transport: LinkTransport {
                peer,
                identity,
                remote_addr,
                inbound: inbound_rx,
            },
        });
    }

    fn emit(&self, event: LinkEvent) {
        if self.consumers.send(event).is_err() {
            debug!("no link event consumer");
        }
    }
}

fn announce_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Resolves at the next periodic announcement, or never when stopped or
/// when periodic announcements are disabled.
async fn next_tick(running: &mut Option<Running>) {
    match running.as_mut().and_then(|r| r.ticker.as_mut()) {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
