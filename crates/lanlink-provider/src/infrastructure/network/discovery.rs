//! UDP broadcast discovery.
//!
//! The provider binds one UDP socket on the discovery port (default 1714)
//! with `SO_BROADCAST` enabled.  The same socket is used both to listen for
//! other devices' identity announcements and to broadcast our own.
//!
//! For every received datagram the listener:
//!
//! 1. Drops it if it is larger than the package size limit, otherwise
//!    decodes it as a single package (the trailing newline is optional).
//! 2. Drops it unless it is an identity package with a `tcpPort`.
//! 3. Drops it if it carries our own device id (our broadcast echoed back).
//! 4. Emits an [`Announcement`] on the provider's event channel.
//!
//! Deciding *what to do* with an announcement (connect, wait, ignore) is the
//! provider's job; the listener only reports.
//!
//! # How broadcast discovery works (for beginners)
//!
//! A datagram sent to `255.255.255.255` reaches every host on the local
//! segment that has a socket bound to the destination port.  Each device
//! periodically shouts "I am `phone-42` and I accept TCP links on port
//! 1716".  Everybody listening learns the sender's IP address from the
//! datagram's source address and the link port from the package body, which
//! is all they need to open a TCP connection.
//!
//! # Draining
//!
//! Broadcast storms (many devices starting at once) can queue several
//! datagrams.  After each wake-up the loop drains up to
//! [`MAX_DATAGRAMS_PER_WAKE`] datagrams without awaiting, then yields.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lanlink_core::{
    decode_datagram, encode, EncodeError, IdentityPackage, NetworkPackage, PeerIdentity,
    PACKAGE_TYPE_IDENTITY,
};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

/// Receive buffer size: the largest UDP payload plus one byte, so a datagram
/// cut short by the buffer still measures as over any smaller limit.
const RECV_BUFFER_BYTES: usize = 64 * 1024 + 1;

const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Upper bound on datagrams processed per wake-up.
pub const MAX_DATAGRAMS_PER_WAKE: usize = 64;

/// Error type for discovery socket operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound or configured.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// An announcement could not be sent.
    #[error("failed to send announcement to {target}: {source}")]
    Send {
        target: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// A remote device's identity announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub identity: IdentityPackage,
    /// Source address of the datagram.
    pub sender: SocketAddr,
}

impl Announcement {
    /// Address to open the link to: the sender's IP and the advertised port.
    ///
    /// Announcements without a port never leave [`handle_datagram`], so the
    /// fallback to the sender's UDP port is unreachable in practice.
    pub fn link_addr(&self) -> SocketAddr {
        let port = self.identity.tcp_port.unwrap_or(self.sender.port());
        SocketAddr::new(self.sender.ip(), port)
    }
}

/// Interprets one datagram.  Returns `None` for anything that is not a
/// usable announcement from another device, or that exceeds `max_bytes`.
pub fn handle_datagram(
    datagram: &[u8],
    sender: SocketAddr,
    local_id: &PeerIdentity,
    max_bytes: usize,
) -> Option<Announcement> {
    if datagram.len() > max_bytes {
        debug!(
            "dropping {}-byte datagram from {sender}: over the {max_bytes}-byte limit",
            datagram.len()
        );
        return None;
    }

    let package = match decode_datagram(datagram) {
        Ok(np) => np,
        Err(e) => {
            debug!("dropping undecodable datagram from {sender}: {e}");
            return None;
        }
    };

    if !package.is_type(PACKAGE_TYPE_IDENTITY) {
        debug!(
            "ignoring {} package on the discovery port from {sender}",
            package.package_type()
        );
        return None;
    }

    let identity = match IdentityPackage::from_package(&package) {
        Ok(identity) => identity,
        Err(e) => {
            debug!("dropping identity datagram from {sender}: {e}");
            return None;
        }
    };

    if &identity.device_id == local_id {
        trace!("ignoring our own announcement echoed from {sender}");
        return None;
    }

    if identity.tcp_port.is_none() {
        debug!(
            "announcement from {} ({sender}) has no tcpPort; ignoring",
            identity.device_id
        );
        return None;
    }

    Some(Announcement { identity, sender })
}

/// Owns the discovery socket and its receive task.
pub struct DiscoveryListener {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl DiscoveryListener {
    /// Binds `addr`, enables broadcast and starts reporting announcements on
    /// `events`.  Datagrams over `max_package_bytes` are dropped unread.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::BindFailed`] if the port is taken or the
    /// socket cannot be configured.
    pub async fn bind<E>(
        addr: SocketAddr,
        local_id: PeerIdentity,
        max_package_bytes: usize,
        events: mpsc::UnboundedSender<E>,
    ) -> Result<Self, DiscoveryError>
    where
        E: From<Announcement> + Send + 'static,
    {
        let bind_failed = |source| DiscoveryError::BindFailed { addr, source };
        let socket = UdpSocket::bind(addr).await.map_err(bind_failed)?;
        socket.set_broadcast(true).map_err(bind_failed)?;
        let local_addr = socket.local_addr().map_err(bind_failed)?;
        let socket = Arc::new(socket);

        let task = tokio::spawn(receive_loop(
            Arc::clone(&socket),
            local_id,
            max_package_bytes,
            events,
        ));
        info!("discovery listening on UDP {local_addr}");

        Ok(Self {
            socket,
            local_addr,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sends one package as a single datagram to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Send`] if the OS rejects the datagram (for
    /// example no route to the broadcast address while offline).
    pub async fn announce(
        &self,
        package: &NetworkPackage,
        target: SocketAddr,
    ) -> Result<(), DiscoveryError> {
        let bytes = encode(package)?;
        self.socket
            .send_to(&bytes, target)
            .await
            .map_err(|source| DiscoveryError::Send { target, source })?;
        trace!("announced {} bytes to {target}", bytes.len());
        Ok(())
    }

    /// Stops the receive task and releases the port.
    pub async fn shutdown(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
        debug!("discovery socket {} closed", self.local_addr);
    }
}

impl Drop for DiscoveryListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn receive_loop<E>(
    socket: Arc<UdpSocket>,
    local_id: PeerIdentity,
    max_package_bytes: usize,
    events: mpsc::UnboundedSender<E>,
) where
    E: From<Announcement> + Send + 'static,
{
    let mut buf = vec![0u8; RECV_BUFFER_BYTES];

    loop {
        let first = socket.recv_from(&mut buf).await;
        let mut received = Some(first);
        let mut processed = 0;

        while let Some(result) = received.take() {
            match result {
                Ok((len, sender)) => {
                    let datagram = &buf[..len];
                    if let Some(announcement) =
                        handle_datagram(datagram, sender, &local_id, max_package_bytes)
                    {
                        debug!(
                            "announcement from {} at {}",
                            announcement.identity.device_id,
                            announcement.link_addr()
                        );
                        if events.send(E::from(announcement)).is_err() {
                            debug!("provider gone; discovery loop exiting");
                            return;
                        }
                    }
                }
                Err(e) if is_transient(&e) => trace!("transient discovery recv error: {e}"),
                Err(e) => {
                    error!("discovery recv error: {e}");
                    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                    break;
                }
            }

            processed += 1;
            if processed < MAX_DATAGRAMS_PER_WAKE {
                match socket.try_recv_from(&mut buf) {
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    other => received = Some(other),
                }
            }
        }
    }
}

/// Errors a UDP socket reports for a previous send (ICMP unreachable) or a
/// spurious wake-up.  The socket stays usable.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
