//! Identity exchange shared by the inbound and outbound paths.
//!
//! Whichever side opened the TCP connection sends its identity package first;
//! the other side answers with its own.  Both paths need "read one identity
//! package, but not forever", which lives here.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use lanlink_core::{IdentityError, IdentityPackage, PeerIdentity};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use super::framing::{FrameError, PackageReader};

/// Failure of a connect-and-identify or accept-and-identify attempt.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("connect to {addr} timed out")]
    ConnectTimedOut { addr: SocketAddr },

    #[error("socket configuration failed: {0}")]
    Configure(#[source] io::Error),

    #[error("no identity package within {0:?}")]
    TimedOut(Duration),

    #[error("peer closed the connection before identifying")]
    Closed,

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("first package is not a usable identity: {0}")]
    Identity(#[from] IdentityError),

    #[error("expected peer {expected}, but it identified as {found}")]
    IdentityMismatch {
        expected: PeerIdentity,
        found: PeerIdentity,
    },
}

/// A TCP stream whose peer has identified itself.
///
/// The reader keeps any bytes that arrived after the identity package.
pub struct HandshakenStream {
    pub reader: PackageReader<OwnedReadHalf>,
    pub writer: OwnedWriteHalf,
    pub remote_addr: SocketAddr,
}

/// Reads the first package and parses it as an identity, giving up after
/// `grace`.
///
/// # Errors
///
/// [`HandshakeError::TimedOut`] if nothing complete arrives in time,
/// [`HandshakeError::Closed`] on end of stream, [`HandshakeError::Identity`]
/// if the first package is not an identity.
pub async fn read_identity<R: AsyncRead + Unpin>(
    reader: &mut PackageReader<R>,
    grace: Duration,
) -> Result<IdentityPackage, HandshakeError> {
    let package = tokio::time::timeout(grace, reader.next_package())
        .await
        .map_err(|_| HandshakeError::TimedOut(grace))??
        .ok_or(HandshakeError::Closed)?;
    Ok(IdentityPackage::from_package(&package)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanlink_core::{encode, DeviceType, NetworkPackage};

    fn identity_bytes(id: &str) -> Vec<u8> {
        let identity = IdentityPackage::new(
            PeerIdentity::new(id).unwrap(),
            "peer",
            DeviceType::Phone,
        );
        encode(&identity.to_package()).unwrap()
    }

    #[tokio::test]
    async fn test_read_identity_parses_first_package() {
        let wire = identity_bytes("phone-42");
        let mut reader = PackageReader::new(&wire[..], 1024);

        let identity = read_identity(&mut reader, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(identity.device_id.as_str(), "phone-42");
        assert_eq!(identity.device_type, DeviceType::Phone);
    }

    #[tokio::test]
    async fn test_read_identity_rejects_non_identity_first_package() {
        let wire = encode(&NetworkPackage::new("kdeconnect.ping")).unwrap();
        let mut reader = PackageReader::new(&wire[..], 1024);

        let err = read_identity(&mut reader, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, HandshakeError::Identity(_)));
    }

    #[tokio::test]
    async fn test_read_identity_reports_closed_on_empty_stream() {
        let mut reader = PackageReader::new(&b""[..], 1024);

        let err = read_identity(&mut reader, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, HandshakeError::Closed));
    }

    #[tokio::test]
    async fn test_read_identity_times_out_on_silent_peer() {
        // Arrange – a duplex pipe whose far end never writes
        let (_far, near) = tokio::io::duplex(64);
        let mut reader = PackageReader::new(near, 1024);

        // Act
        let err = read_identity(&mut reader, Duration::from_millis(50))
            .await
            .unwrap_err();

        // Assert
        assert!(matches!(err, HandshakeError::TimedOut(_)));
    }
}
