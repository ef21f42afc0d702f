//! Peer identities and the connection-race rule.
//!
//! # The glare problem (for beginners)
//!
//! Two devices that hear each other's broadcast at the same moment would
//! both try to dial the other, ending up with two TCP connections for one
//! logical link.  LanLink avoids that with a rule both sides can evaluate
//! independently and that always gives opposite answers:
//!
//! > The side whose identity sorts lower (byte-wise) dials.  The other waits.
//!
//! Because [`PeerIdentity`] ordering is a total order on strings, for any two
//! distinct identities exactly one side is the [`ConnectionRole::Initiator`].

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest identity accepted from the wire, in bytes.
pub const MAX_IDENTITY_LEN: usize = 256;

/// Reasons an identity string is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeerIdentityError {
    #[error("peer identity is empty")]
    Empty,

    #[error("peer identity is {len} bytes long (max {MAX_IDENTITY_LEN})")]
    TooLong { len: usize },

    #[error("peer identity contains a control character")]
    ControlCharacter,
}

/// Stable, unique name of one device on the network.
///
/// The derived ordering compares the underlying strings byte by byte, which
/// is what [`connection_role`] relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerIdentity(String);

impl PeerIdentity {
    /// Validates and wraps an identity string.
    ///
    /// # Errors
    ///
    /// Returns [`PeerIdentityError`] for empty, oversized, or control-character
    /// identities.
    pub fn new(value: impl Into<String>) -> Result<Self, PeerIdentityError> {
        let value = value.into();
        if value.is_empty() {
            return Err(PeerIdentityError::Empty);
        }
        if value.len() > MAX_IDENTITY_LEN {
            return Err(PeerIdentityError::TooLong { len: value.len() });
        }
        if value.chars().any(char::is_control) {
            return Err(PeerIdentityError::ControlCharacter);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerIdentity {
    type Err = PeerIdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PeerIdentity {
    type Error = PeerIdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PeerIdentity> for String {
    fn from(id: PeerIdentity) -> Self {
        id.0
    }
}

impl AsRef<str> for PeerIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PeerIdentity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Which side of a peer pair opens the TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// Dial the peer's advertised port.
    Initiator,
    /// Wait for the peer to dial our listening port.
    Responder,
}

/// Decides the local role for a link between `local` and `remote`.
///
/// Returns `None` when both identities are equal: that is our own broadcast
/// coming back, and no link should be made.
///
/// # Examples
///
/// ```rust
/// use lanlink_core::{connection_role, ConnectionRole, PeerIdentity};
///
/// let desktop: PeerIdentity = "desktop-1".parse().unwrap();
/// let phone: PeerIdentity = "phone-42".parse().unwrap();
/// assert_eq!(connection_role(&desktop, &phone), Some(ConnectionRole::Initiator));
/// assert_eq!(connection_role(&phone, &desktop), Some(ConnectionRole::Responder));
/// ```
pub fn connection_role(local: &PeerIdentity, remote: &PeerIdentity) -> Option<ConnectionRole> {
    match local.cmp(remote) {
        std::cmp::Ordering::Less => Some(ConnectionRole::Initiator),
        std::cmp::Ordering::Greater => Some(ConnectionRole::Responder),
        std::cmp::Ordering::Equal => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> PeerIdentity {
        PeerIdentity::new(s).unwrap()
    }

    #[test]
    fn test_new_rejects_empty_identity() {
        assert_eq!(PeerIdentity::new(""), Err(PeerIdentityError::Empty));
    }

    #[test]
    fn test_new_rejects_oversized_identity() {
        let long = "x".repeat(MAX_IDENTITY_LEN + 1);
        assert_eq!(
            PeerIdentity::new(long),
            Err(PeerIdentityError::TooLong {
                len: MAX_IDENTITY_LEN + 1
            })
        );
    }

    #[test]
    fn test_new_rejects_control_characters() {
        assert_eq!(
            PeerIdentity::new("phone\n42"),
            Err(PeerIdentityError::ControlCharacter)
        );
    }

    #[test]
    fn test_exactly_one_side_initiates_for_distinct_identities() {
        // Arrange
        let pairs = [
            ("desktop-1", "phone-42"),
            ("a", "b"),
            ("A", "a"),
            ("phone", "phone-2"),
            ("_3f2c0b", "3f2c0b"),
        ];

        for (a, b) in pairs {
            // Act
            let from_a = connection_role(&id(a), &id(b));
            let from_b = connection_role(&id(b), &id(a));

            // Assert
            let initiators = [from_a, from_b]
                .iter()
                .filter(|r| **r == Some(ConnectionRole::Initiator))
                .count();
            assert_eq!(initiators, 1, "pair ({a}, {b}) must have one initiator");
            assert_ne!(from_a, from_b);
        }
    }

    #[test]
    fn test_lower_identity_is_initiator() {
        assert_eq!(
            connection_role(&id("desktop-1"), &id("phone-42")),
            Some(ConnectionRole::Initiator)
        );
    }

    #[test]
    fn test_equal_identities_have_no_role() {
        assert_eq!(connection_role(&id("same"), &id("same")), None);
    }

    #[test]
    fn test_ordering_is_bytewise_not_locale_aware() {
        // 'Z' (0x5A) sorts before 'a' (0x61)
        assert!(id("Zebra") < id("apple"));
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let json = serde_json::to_string(&id("phone-42")).unwrap();
        assert_eq!(json, "\"phone-42\"");

        let back: PeerIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id("phone-42"));

        let bad: Result<PeerIdentity, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }
}
