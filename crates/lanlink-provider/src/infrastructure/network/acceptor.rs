//! ConnectionAcceptor: the listening TCP socket for inbound links.
//!
//! The acceptor binds the first free port of a configured range (default
//! 1714–1764) so that the port advertised in announcements is predictable
//! across restarts.  A range starting at 0 asks the OS for any free port.
//!
//! Each accepted connection becomes a *pending connect*: a short-lived task
//! that applies the socket policy and waits up to the handshake grace period
//! for the peer's identity package.  On success it reports an
//! [`InboundConnection`] to the provider; on timeout or a bad first package
//! the socket is dropped (closed) and nothing is reported.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;
use std::time::Duration;

use lanlink_core::IdentityPackage;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::framing::PackageReader;
use super::handshake::{read_identity, HandshakeError, HandshakenStream};
use super::socket_config::SocketPolicy;

/// Error type for acceptor setup.
#[derive(Debug, Error)]
pub enum AcceptorError {
    /// The listener could not be bound for a reason other than the port
    /// being taken.
    #[error("failed to bind link listener on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Every port of the range is in use.
    #[error("no free TCP port in {first}..={last}")]
    NoFreePort { first: u16, last: u16 },
}

/// A freshly accepted stream whose peer has identified itself.
pub struct InboundConnection {
    pub identity: IdentityPackage,
    pub stream: HandshakenStream,
}

impl std::fmt::Debug for InboundConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundConnection")
            .field("identity", &self.identity)
            .field("remote_addr", &self.stream.remote_addr)
            .finish()
    }
}

/// Options shared by every pending connect.
#[derive(Debug, Clone, Copy)]
pub struct AcceptOptions {
    pub policy: SocketPolicy,
    pub handshake_grace: Duration,
    pub max_package_bytes: usize,
}

/// Owns the link listener and its accept task.
pub struct ConnectionAcceptor {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ConnectionAcceptor {
    /// Binds the first free port of `ports` on `ip` and starts accepting.
    ///
    /// # Errors
    ///
    /// [`AcceptorError::NoFreePort`] if every port is taken,
    /// [`AcceptorError::BindFailed`] for any other bind failure.
    pub fn bind<E>(
        ip: IpAddr,
        ports: RangeInclusive<u16>,
        options: AcceptOptions,
        events: mpsc::UnboundedSender<E>,
    ) -> Result<Self, AcceptorError>
    where
        E: From<InboundConnection> + Send + 'static,
    {
        let listener = bind_in_range(ip, ports, &options.policy)?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| AcceptorError::BindFailed {
                addr: SocketAddr::new(ip, 0),
                source,
            })?;
        let task = tokio::spawn(accept_loop(listener, options, events));
        info!("accepting links on TCP {local_addr}");
        Ok(Self { local_addr, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The port to advertise in announcements.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Closes the listener and every pending connect.
    pub async fn shutdown(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
        debug!("link listener {} closed", self.local_addr);
    }
}

impl Drop for ConnectionAcceptor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn bind_in_range(
    ip: IpAddr,
    ports: RangeInclusive<u16>,
    policy: &SocketPolicy,
) -> Result<TcpListener, AcceptorError> {
    let (first, last) = (*ports.start(), *ports.end());
    if first == 0 {
        let addr = SocketAddr::new(ip, 0);
        return policy
            .listen(addr)
            .map_err(|source| AcceptorError::BindFailed { addr, source });
    }

    for port in ports {
        let addr = SocketAddr::new(ip, port);
        match policy.listen(addr) {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                debug!("TCP port {port} in use; trying the next one");
            }
            Err(source) => return Err(AcceptorError::BindFailed { addr, source }),
        }
    }
    Err(AcceptorError::NoFreePort { first, last })
}

async fn accept_loop<E>(
    listener: TcpListener,
    options: AcceptOptions,
    events: mpsc::UnboundedSender<E>,
) where
    E: From<InboundConnection> + Send + 'static,
{
    // Dropping the set (when this task is aborted) aborts every pending
    // connect, closing their sockets.
    let mut pending = JoinSet::new();

    loop {
        while pending.try_join_next().is_some() {}

        let (stream, remote_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                // Typically EMFILE or a connection reset before accept.
                warn!("accept failed: {e}");
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }
        };
        debug!("accepted TCP connection from {remote_addr}");

        let events = events.clone();
        pending.spawn(async move {
            match identify(stream, remote_addr, options).await {
                Ok(inbound) => {
                    debug!(
                        "{} identified on connection from {remote_addr}",
                        inbound.identity.device_id
                    );
                    let _ = events.send(E::from(inbound));
                }
                Err(e) => debug!("closing connection from {remote_addr}: {e}"),
            }
        });
    }
}

async fn identify(
    stream: TcpStream,
    remote_addr: SocketAddr,
    options: AcceptOptions,
) -> Result<InboundConnection, HandshakeError> {
    options
        .policy
        .apply(&stream)
        .map_err(HandshakeError::Configure)?;
    let (read_half, writer) = stream.into_split();
    let mut reader = PackageReader::new(read_half, options.max_package_bytes);
    let identity = read_identity(&mut reader, options.handshake_grace).await?;
    Ok(InboundConnection {
        identity,
        stream: HandshakenStream {
            reader,
            writer,
            remote_addr,
        },
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
