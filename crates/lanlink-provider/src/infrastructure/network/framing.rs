//! Async framing of newline-terminated packages over a byte stream.
//!
//! [`PackageReader`] owns a read buffer, so bytes that arrive after a package
//! (the peer is allowed to pipeline) stay buffered and are returned by the
//! next call.  The reader is handed from the handshake step to the
//! [`super::device_link::DeviceLink`] without losing them.
//!
//! The reader remembers how far it has already searched for a terminator, so
//! a large package trickling in over many reads is scanned once, not once
//! per read.

use lanlink_core::{decode, encode, EncodeError, NetworkPackage, TERMINATOR};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

const READ_CHUNK: usize = 4096;

/// Errors raised while moving packages over a stream.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("package exceeds {limit} bytes without a terminator")]
    TooLarge { limit: usize },

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Reads [`NetworkPackage`]s from an [`AsyncRead`].
pub struct PackageReader<R> {
    inner: R,
    buf: Vec<u8>,
    /// Prefix of `buf` known to hold no terminator.
    scanned: usize,
    max_package_bytes: usize,
}

impl<R: AsyncRead + Unpin> PackageReader<R> {
    pub fn new(inner: R, max_package_bytes: usize) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(READ_CHUNK),
            scanned: 0,
            max_package_bytes,
        }
    }

    /// Returns the next package, or `None` on a clean end of stream.
    ///
    /// Lines that are not valid packages are logged and skipped.  A partial
    /// line left over at end of stream is discarded.
    ///
    /// # Errors
    ///
    /// [`FrameError::Io`] on read failure, [`FrameError::TooLarge`] when a
    /// single line grows beyond the configured limit.
    pub async fn next_package(&mut self) -> Result<Option<NetworkPackage>, FrameError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let found = self.buf[self.scanned..]
                .iter()
                .position(|&b| b == TERMINATOR)
                .map(|offset| self.scanned + offset);

            match found {
                Some(pos) => {
                    self.scanned = 0;
                    match decode(&self.buf[..=pos]) {
                        Ok((np, consumed)) => {
                            self.buf.drain(..consumed);
                            return Ok(Some(np));
                        }
                        Err(e) => {
                            warn!("dropping undecodable package: {e}");
                            self.buf.drain(..=pos);
                            continue;
                        }
                    }
                }
                None => {
                    self.scanned = self.buf.len();
                    if self.scanned > self.max_package_bytes {
                        return Err(FrameError::TooLarge {
                            limit: self.max_package_bytes,
                        });
                    }
                }
            }

            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Bytes received but not yet returned as a package.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Encodes `package` and writes it in full.
///
/// # Errors
///
/// Returns [`FrameError`] if encoding or the write fails.
pub async fn write_package<W: AsyncWrite + Unpin>(
    writer: &mut W,
    package: &NetworkPackage,
) -> Result<(), FrameError> {
    let bytes = encode(package)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_reader_returns_packages_in_order_then_none() {
        // Arrange
        let a = NetworkPackage::new("a").with_id(1);
        let b = NetworkPackage::new("b").with_id(2);
        let mut wire = encode(&a).unwrap();
        wire.extend(encode(&b).unwrap());
        let mut reader = PackageReader::new(&wire[..], 1024);

        // Act / Assert
        assert_eq!(reader.next_package().await.unwrap(), Some(a));
        assert_eq!(reader.next_package().await.unwrap(), Some(b));
        assert_eq!(reader.next_package().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reader_skips_invalid_lines() {
        let good = NetworkPackage::new("good").with_id(3);
        let mut wire = b"garbage\n".to_vec();
        wire.extend(encode(&good).unwrap());
        let mut reader = PackageReader::new(&wire[..], 1024);

        assert_eq!(reader.next_package().await.unwrap(), Some(good));
    }

    #[tokio::test]
    async fn test_reader_rejects_oversized_line() {
        let wire = vec![b'x'; 64];
        let mut reader = PackageReader::new(&wire[..], 16);

        let err = reader.next_package().await.unwrap_err();

        assert!(matches!(err, FrameError::TooLarge { limit: 16 }));
    }

    #[tokio::test]
    async fn test_reader_keeps_pipelined_bytes_buffered() {
        // Arrange – both packages arrive in a single read
        let a = NetworkPackage::new("a").with_id(1);
        let b = NetworkPackage::new("b").with_id(2);
        let mut wire = encode(&a).unwrap();
        let b_len = encode(&b).unwrap().len();
        wire.extend(encode(&b).unwrap());
        let mut reader = PackageReader::new(&wire[..], 1024);

        // Act
        let first = reader.next_package().await.unwrap();

        // Assert
        assert_eq!(first, Some(a));
        assert_eq!(reader.buffered(), b_len);
    }

    #[tokio::test]
    async fn test_reader_resumes_terminator_search_where_it_stopped() {
        // Arrange
        let np = NetworkPackage::new("kdeconnect.ping").with_id(9);
        let bytes = encode(&np).unwrap();
        let (head, tail) = bytes.split_at(bytes.len() / 2);
        let (mut peer, local) = tokio::io::duplex(1024);
        let mut reader = PackageReader::new(local, 1024);
        peer.write_all(head).await.unwrap();

        // Act
        let waiting =
            tokio::time::timeout(Duration::from_millis(50), reader.next_package()).await;
        let scanned_after_head = reader.scanned;
        peer.write_all(tail).await.unwrap();
        let decoded = reader.next_package().await.unwrap();

        // Assert
        assert!(waiting.is_err());
        assert_eq!(scanned_after_head, head.len());
        assert_eq!(decoded, Some(np));
        assert_eq!(reader.scanned, 0);
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_reader_assembles_package_delivered_one_byte_per_read() {
        // Arrange
        let a = NetworkPackage::new("a").with_id(1).with_field("text", "x".repeat(200));
        let b = NetworkPackage::new("b").with_id(2);
        let mut wire = encode(&a).unwrap();
        wire.extend(encode(&b).unwrap());
        let mut mock = tokio_test::io::Builder::new();
        for byte in &wire {
            mock.read(std::slice::from_ref(byte));
        }
        let mut reader = PackageReader::new(mock.build(), 1024);

        // Act / Assert
        assert_eq!(reader.next_package().await.unwrap(), Some(a));
        assert_eq!(reader.next_package().await.unwrap(), Some(b));
        assert_eq!(reader.next_package().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_package_writes_one_terminated_line() {
        let np = NetworkPackage::new("kdeconnect.ping").with_id(4);
        let mut out: Vec<u8> = Vec::new();

        write_package(&mut out, &np).await.unwrap();

        assert_eq!(out, encode(&np).unwrap());
    }
}
