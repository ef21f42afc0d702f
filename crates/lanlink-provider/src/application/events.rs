//! Events delivered to link consumers.

use std::net::SocketAddr;

use lanlink_core::{IdentityPackage, NetworkPackage, PeerIdentity};
use tokio::sync::mpsc;

/// The consumer-facing half of an established link.
///
/// Outbound packages go through the provider's `send(peer, package)`; this
/// struct carries what the consumer needs to receive.
#[derive(Debug)]
pub struct LinkTransport {
    pub peer: PeerIdentity,
    /// The identity the peer presented during the TCP handshake.
    pub identity: IdentityPackage,
    pub remote_addr: SocketAddr,
    /// Packages received from the peer, in arrival order.  Closes when the
    /// link goes away.
    pub inbound: mpsc::Receiver<NetworkPackage>,
}

/// Lifecycle notifications emitted by a link provider.
#[derive(Debug)]
pub enum LinkEvent {
    /// A new link is registered and ready for traffic.
    Established {
        peer: PeerIdentity,
        transport: LinkTransport,
    },
    /// The link to `peer` closed and was removed.
    Lost { peer: PeerIdentity },
}

impl LinkEvent {
    pub fn peer(&self) -> &PeerIdentity {
        match self {
            LinkEvent::Established { peer, .. } | LinkEvent::Lost { peer } => peer,
        }
    }
}
