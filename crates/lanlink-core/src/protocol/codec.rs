//! Line codec for [`NetworkPackage`]s.
//!
//! Wire format:
//! ```text
//! <compact JSON object>\n
//! ```
//! One package per line on TCP streams and one package per UDP datagram.
//! Compact JSON never contains a raw newline (string contents escape it), so
//! the newline is an unambiguous record boundary.
//!
//! # Two kinds of failure
//!
//! Stream readers see arbitrary chunks, so [`decode`] reports two different
//! outcomes:
//!
//! - [`DecodeError::Incomplete`] – no newline yet.  Keep the bytes and read
//!   more.
//! - [`DecodeError::Invalid`] – a full line arrived but it is not a package.
//!   Skip `consumed` bytes and carry on with the next line.

use thiserror::Error;

use crate::protocol::package::NetworkPackage;

/// Record terminator.
pub const TERMINATOR: u8 = b'\n';

/// Errors that can occur while decoding a package.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No terminating newline has arrived yet.
    #[error("incomplete package: {buffered} byte(s) buffered without a terminator")]
    Incomplete { buffered: usize },

    /// A complete record arrived but could not be parsed.
    ///
    /// `consumed` is the number of bytes (terminator included) the caller
    /// must discard to reach the next record.
    #[error("invalid package ({reason}), discarding {consumed} byte(s)")]
    Invalid { consumed: usize, reason: String },
}

impl DecodeError {
    /// `true` when the caller should wait for more bytes rather than discard.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, DecodeError::Incomplete { .. })
    }
}

/// Errors that can occur while encoding a package.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to serialize package: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`NetworkPackage`] into one newline-terminated record.
///
/// Field order is fixed (`id`, `type`, `body`, optional payload fields, then
/// preserved unknown fields) and body keys are sorted, so the same package
/// always produces the same bytes.
///
/// # Errors
///
/// Returns [`EncodeError`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use lanlink_core::{decode, encode, NetworkPackage};
///
/// let np = NetworkPackage::new("kdeconnect.ping").with_id(1);
/// let bytes = encode(&np).unwrap();
/// assert_eq!(bytes, b"{\"id\":1,\"type\":\"kdeconnect.ping\",\"body\":{}}\n");
/// let (decoded, consumed) = decode(&bytes).unwrap();
/// assert_eq!(decoded, np);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode(package: &NetworkPackage) -> Result<Vec<u8>, EncodeError> {
    let mut buf = serde_json::to_vec(package)?;
    buf.push(TERMINATOR);
    Ok(buf)
}

/// Decodes one package from the beginning of `bytes`.
///
/// Returns the package and the number of bytes consumed (terminator
/// included) so the caller can advance its read cursor.  A trailing `\r`
/// before the newline is tolerated.
///
/// # Errors
///
/// - [`DecodeError::Incomplete`] when `bytes` holds no newline.
/// - [`DecodeError::Invalid`] when the first line is not a valid package.
pub fn decode(bytes: &[u8]) -> Result<(NetworkPackage, usize), DecodeError> {
    let Some(pos) = bytes.iter().position(|&b| b == TERMINATOR) else {
        return Err(DecodeError::Incomplete {
            buffered: bytes.len(),
        });
    };
    let consumed = pos + 1;
    parse_record(&bytes[..pos])
        .map(|np| (np, consumed))
        .map_err(|reason| DecodeError::Invalid { consumed, reason })
}

/// Decodes a whole UDP datagram.
///
/// A datagram is complete by construction, so the terminator is optional
/// and anything after the first line is ignored.
///
/// # Errors
///
/// Returns [`DecodeError::Invalid`] if the datagram is not a package.
pub fn decode_datagram(datagram: &[u8]) -> Result<NetworkPackage, DecodeError> {
    let line = match datagram.iter().position(|&b| b == TERMINATOR) {
        Some(pos) => &datagram[..pos],
        None => datagram,
    };
    parse_record(line).map_err(|reason| DecodeError::Invalid {
        consumed: datagram.len(),
        reason,
    })
}

// ── Record parsing ────────────────────────────────────────────────────────────

fn parse_record(line: &[u8]) -> Result<NetworkPackage, String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.iter().all(u8::is_ascii_whitespace) {
        return Err("empty record".to_string());
    }
    let np: NetworkPackage = serde_json::from_slice(line).map_err(|e| e.to_string())?;
    if np.package_type().is_empty() {
        return Err("empty package type".to_string());
    }
    Ok(np)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::package::PACKAGE_TYPE_IDENTITY;

    fn sample() -> NetworkPackage {
        NetworkPackage::new(PACKAGE_TYPE_IDENTITY)
            .with_id(1_700_000_000_000)
            .with_field("deviceId", "phone-42")
            .with_field("tcpPort", 5000)
    }

    #[test]
    fn test_encode_is_deterministic_with_sorted_body_keys() {
        // Arrange
        let np = NetworkPackage::new("t")
            .with_id(7)
            .with_field("zeta", 1)
            .with_field("alpha", 2);

        // Act
        let bytes = encode(&np).unwrap();

        // Assert
        assert_eq!(
            bytes,
            b"{\"id\":7,\"type\":\"t\",\"body\":{\"alpha\":2,\"zeta\":1}}\n".to_vec()
        );
        assert_eq!(bytes, encode(&np.clone()).unwrap());
    }

    #[test]
    fn test_encode_ends_with_single_terminator() {
        let bytes = encode(&sample().with_field("text", "line1\nline2")).unwrap();

        assert_eq!(bytes.last(), Some(&TERMINATOR));
        assert_eq!(
            bytes.iter().filter(|&&b| b == TERMINATOR).count(),
            1,
            "embedded newlines must be escaped"
        );
    }

    #[test]
    fn test_decode_round_trip_reports_consumed_length() {
        let np = sample();
        let bytes = encode(&np).unwrap();

        let (decoded, consumed) = decode(&bytes).unwrap();

        assert_eq!(decoded, np);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_decode_without_terminator_is_incomplete() {
        let mut bytes = encode(&sample()).unwrap();
        bytes.pop();

        let err = decode(&bytes).unwrap_err();

        assert_eq!(
            err,
            DecodeError::Incomplete {
                buffered: bytes.len()
            }
        );
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_decode_empty_input_is_incomplete() {
        assert_eq!(decode(&[]), Err(DecodeError::Incomplete { buffered: 0 }));
    }

    #[test]
    fn test_decode_every_truncated_prefix_never_panics() {
        // Arrange
        let bytes = encode(&sample()).unwrap();

        // Act / Assert – every strict prefix lacks the terminator
        for cut in 0..bytes.len() {
            let result = decode(&bytes[..cut]);
            assert!(
                matches!(result, Err(DecodeError::Incomplete { .. })),
                "prefix of {cut} bytes must be Incomplete, got {result:?}"
            );
        }
    }

    #[test]
    fn test_decode_terminated_garbage_is_invalid_with_skip_length() {
        let bytes = b"{\"id\":1,\"type\n{\"id\":2,\"type\":\"ok\",\"body\":{}}\n";

        let err = decode(bytes).unwrap_err();

        assert!(matches!(err, DecodeError::Invalid { consumed: 14, .. }), "{err:?}");
        let (next, _) = decode(&bytes[14..]).unwrap();
        assert_eq!(next.package_type(), "ok");
    }

    #[test]
    fn test_decode_rejects_missing_type() {
        let err = decode(b"{\"id\":1,\"body\":{}}\n").unwrap_err();
        assert!(matches!(err, DecodeError::Invalid { .. }));
    }

    #[test]
    fn test_decode_rejects_empty_type() {
        let err = decode(b"{\"id\":1,\"type\":\"\",\"body\":{}}\n").unwrap_err();
        assert!(matches!(err, DecodeError::Invalid { .. }));
    }

    #[test]
    fn test_decode_blank_line_is_invalid() {
        assert_eq!(
            decode(b"\n"),
            Err(DecodeError::Invalid {
                consumed: 1,
                reason: "empty record".to_string()
            })
        );
    }

    #[test]
    fn test_decode_tolerates_crlf() {
        let (np, consumed) = decode(b"{\"id\":3,\"type\":\"t\",\"body\":{}}\r\n").unwrap();

        assert_eq!(np.id(), 3);
        assert_eq!(consumed, 31);
    }

    #[test]
    fn test_decode_missing_body_defaults_to_empty() {
        let (np, _) = decode(b"{\"id\":3,\"type\":\"t\"}\n").unwrap();
        assert!(np.body().is_empty());
    }

    #[test]
    fn test_decode_preserves_unknown_top_level_fields() {
        // Arrange – a newer peer adds a field this version has never heard of
        let line = b"{\"id\":5,\"type\":\"t\",\"body\":{},\"priority\":\"high\"}\n";

        // Act
        let (np, _) = decode(line).unwrap();
        let reencoded = encode(&np).unwrap();

        // Assert
        assert_eq!(np.extra().get("priority").and_then(|v| v.as_str()), Some("high"));
        assert_eq!(reencoded, line.to_vec());
    }

    #[test]
    fn test_decode_reads_back_to_back_records() {
        let a = NetworkPackage::new("a").with_id(1);
        let b = NetworkPackage::new("b").with_id(2);
        let mut bytes = encode(&a).unwrap();
        bytes.extend(encode(&b).unwrap());

        let (first, n) = decode(&bytes).unwrap();
        let (second, m) = decode(&bytes[n..]).unwrap();

        assert_eq!(first, a);
        assert_eq!(second, b);
        assert_eq!(n + m, bytes.len());
    }

    #[test]
    fn test_decode_datagram_accepts_missing_terminator() {
        let mut bytes = encode(&sample()).unwrap();
        bytes.pop();

        assert_eq!(decode_datagram(&bytes), Ok(sample()));
    }

    #[test]
    fn test_decode_datagram_rejects_garbage() {
        let err = decode_datagram(b"\x00\x01binary").unwrap_err();
        assert!(matches!(err, DecodeError::Invalid { consumed: 8, .. }));
    }
}
