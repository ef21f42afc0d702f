//! DeviceLink: one established, identified TCP stream to one peer.
//!
//! A link runs two tasks:
//!
//! - the **writer** drains an unbounded FIFO of outbound packages, so
//!   packages leave in exactly the order [`DeviceLink::send`] accepted them;
//! - the **reader** decodes inbound packages and forwards them to the
//!   consumer's channel.
//!
//! When either task hits end of stream or an I/O error it reports a
//! [`LinkClosed`] event and stops.  The link does not remove itself from
//! anywhere: the provider reacts to the event, takes the link out of its
//! peer map, and calls [`DeviceLink::close`].

use std::net::SocketAddr;

use lanlink_core::{NetworkPackage, PeerIdentity};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::framing::{write_package, FrameError};
use super::handshake::HandshakenStream;

/// Distinguishes successive links to the same peer.
pub type LinkId = u64;

/// Why a link stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed its side of the stream.
    RemoteClosed,
    /// Reading from the stream failed.
    ReadFailed,
    /// Writing to the stream failed.
    WriteFailed,
    /// The peer sent a line longer than the package limit.
    ProtocolViolation,
}

/// Destruction signal emitted by a link's tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkClosed {
    pub peer: PeerIdentity,
    pub link_id: LinkId,
    pub reason: CloseReason,
}

/// Errors returned to callers of [`DeviceLink::send`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("link to {0} is closed")]
    Closed(PeerIdentity),
}

/// Live transport for one peer.
pub struct DeviceLink {
    peer: PeerIdentity,
    link_id: LinkId,
    remote_addr: SocketAddr,
    outbound: mpsc::UnboundedSender<NetworkPackage>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl DeviceLink {
    /// Starts the reader and writer tasks over an identified stream.
    ///
    /// `preamble`, when given, is queued before anything else; the accepting
    /// side uses it to answer the peer's identity with its own.
    pub fn spawn<E>(
        link_id: LinkId,
        peer: PeerIdentity,
        stream: HandshakenStream,
        preamble: Option<NetworkPackage>,
        inbound: mpsc::Sender<NetworkPackage>,
        events: mpsc::UnboundedSender<E>,
    ) -> Self
    where
        E: From<LinkClosed> + Send + 'static,
    {
        let HandshakenStream {
            mut reader,
            mut writer,
            remote_addr,
        } = stream;
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<NetworkPackage>();
        if let Some(np) = preamble {
            // The receiver is alive in this scope, so the send cannot fail.
            let _ = outbound.send(np);
        }

        let writer_peer = peer.clone();
        let writer_events = events.clone();
        let writer_task = tokio::spawn(async move {
            while let Some(np) = outbound_rx.recv().await {
                if let Err(e) = write_package(&mut writer, &np).await {
                    warn!("write to {writer_peer} failed: {e}");
                    let _ = writer_events.send(E::from(LinkClosed {
                        peer: writer_peer,
                        link_id,
                        reason: CloseReason::WriteFailed,
                    }));
                    return;
                }
                trace!("sent {} to {writer_peer}", np.package_type());
            }
            let _ = writer.shutdown().await;
        });

        let reader_peer = peer.clone();
        let reader_task = tokio::spawn(async move {
            let reason = loop {
                match reader.next_package().await {
                    Ok(Some(np)) => {
                        trace!("received {} from {reader_peer}", np.package_type());
                        if inbound.send(np).await.is_err() {
                            trace!("no consumer for packages from {reader_peer}; dropping");
                        }
                    }
                    Ok(None) => break CloseReason::RemoteClosed,
                    Err(FrameError::TooLarge { limit }) => {
                        warn!("{reader_peer} sent a line over {limit} bytes");
                        break CloseReason::ProtocolViolation;
                    }
                    Err(e) => {
                        debug!("read from {reader_peer} failed: {e}");
                        break CloseReason::ReadFailed;
                    }
                }
            };
            let _ = events.send(E::from(LinkClosed {
                peer: reader_peer,
                link_id,
                reason,
            }));
        });

        Self {
            peer,
            link_id,
            remote_addr,
            outbound,
            reader_task,
            writer_task,
        }
    }

    pub fn peer(&self) -> &PeerIdentity {
        &self.peer
    }

    pub fn link_id(&self) -> LinkId {
        self.link_id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Queues a package for sending.  Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Closed`] once the writer task has stopped.
    pub fn send(&self, package: NetworkPackage) -> Result<(), LinkError> {
        self.outbound
            .send(package)
            .map_err(|_| LinkError::Closed(self.peer.clone()))
    }

    /// Tears the link down.  Both socket halves are dropped before this
    /// returns.
    pub async fn close(mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
        let _ = (&mut self.reader_task).await;
        let _ = (&mut self.writer_task).await;
        debug!("link {} to {} closed", self.link_id, self.peer);
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

impl std::fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("peer", &self.peer)
            .field("link_id", &self.link_id)
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
