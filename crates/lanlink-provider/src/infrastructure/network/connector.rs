//! Outbound half of link establishment.
//!
//! The initiating side opens the stream, sends its own identity first and
//! waits for the peer's reply.  The reply must name the device that was
//! announced; a different id means the address now belongs to someone else
//! and the stream is dropped.

use std::net::SocketAddr;
use std::time::Duration;

use lanlink_core::{IdentityPackage, NetworkPackage, PeerIdentity};
use tracing::debug;

use super::framing::{write_package, PackageReader};
use super::handshake::{read_identity, HandshakeError, HandshakenStream};
use super::socket_config::SocketPolicy;

/// Timeouts and limits for one outbound attempt.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions {
    pub policy: SocketPolicy,
    pub connect_timeout: Duration,
    pub handshake_grace: Duration,
    pub max_package_bytes: usize,
}

/// An outbound stream whose peer answered with the expected identity.
pub struct OutboundLink {
    pub identity: IdentityPackage,
    pub stream: HandshakenStream,
}

/// Connects to `addr`, sends `own_identity`, and waits for `expected` to
/// identify itself.
///
/// # Errors
///
/// Any [`HandshakeError`]; the stream is closed on every error path.
pub async fn connect_and_identify(
    addr: SocketAddr,
    expected: &PeerIdentity,
    own_identity: &NetworkPackage,
    options: ConnectOptions,
) -> Result<OutboundLink, HandshakeError> {
    let stream = tokio::time::timeout(options.connect_timeout, options.policy.connect(addr))
        .await
        .map_err(|_| HandshakeError::ConnectTimedOut { addr })?
        .map_err(|source| HandshakeError::Connect { addr, source })?;
    debug!("connected to {addr}; sending identity");

    let (read_half, mut writer) = stream.into_split();
    write_package(&mut writer, own_identity).await?;

    let mut reader = PackageReader::new(read_half, options.max_package_bytes);
    let identity = read_identity(&mut reader, options.handshake_grace).await?;
    if &identity.device_id != expected {
        return Err(HandshakeError::IdentityMismatch {
            expected: expected.clone(),
            found: identity.device_id,
        });
    }

    Ok(OutboundLink {
        identity,
        stream: HandshakenStream {
            reader,
            writer,
            remote_addr: addr,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanlink_core::{encode, DeviceType, PACKAGE_TYPE_IDENTITY};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn id(s: &str) -> PeerIdentity {
        PeerIdentity::new(s).unwrap()
    }

    fn options() -> ConnectOptions {
        ConnectOptions {
            policy: SocketPolicy::default(),
            connect_timeout: Duration::from_secs(2),
            handshake_grace: Duration::from_secs(2),
            max_package_bytes: 64 * 1024,
        }
    }

    fn own() -> NetworkPackage {
        IdentityPackage::new(id("desktop-1"), "Desktop", DeviceType::Desktop).to_package()
    }

    /// Accepts one connection, reads one line, replies as `reply_as`.
    async fn fake_peer(reply_as: &'static str) -> (SocketAddr, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (r, mut w) = stream.into_split();
            let mut lines = BufReader::new(r).lines();
            let first = lines.next_line().await.unwrap().unwrap();
            let reply =
                IdentityPackage::new(id(reply_as), reply_as, DeviceType::Phone).to_package();
            w.write_all(&encode(&reply).unwrap()).await.unwrap();
            // Hold the stream open until the test has read the reply.
            let _ = lines.next_line().await;
            first
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_connect_sends_identity_first_and_accepts_matching_reply() {
        // Arrange
        let (addr, peer) = fake_peer("phone-42").await;

        // Act
        let link = connect_and_identify(addr, &id("phone-42"), &own(), options())
            .await
            .unwrap();

        // Assert
        assert_eq!(link.identity.device_id, id("phone-42"));
        assert_eq!(link.stream.remote_addr, addr);
        drop(link);
        let first_line = peer.await.unwrap();
        let sent = lanlink_core::decode_datagram(first_line.as_bytes()).unwrap();
        assert!(sent.is_type(PACKAGE_TYPE_IDENTITY));
        assert_eq!(sent.body_str("deviceId"), Some("desktop-1"));
    }

    #[tokio::test]
    async fn test_connect_rejects_mismatched_reply() {
        let (addr, _peer) = fake_peer("tablet-7").await;

        let err = connect_and_identify(addr, &id("phone-42"), &own(), options())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, HandshakeError::IdentityMismatch { .. }));
    }

    #[tokio::test]
    async fn test_connect_refused_is_reported() {
        // Arrange – grab a port, then free it so nothing listens there
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };

        // Act
        let err = connect_and_identify(addr, &id("phone-42"), &own(), options())
            .await
            .err()
            .unwrap();

        // Assert
        assert!(matches!(err, HandshakeError::Connect { .. }));
    }
}
