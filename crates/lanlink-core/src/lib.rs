//! # lanlink-core
//!
//! Shared library for LanLink containing the network package codec, the
//! identity package schema, and the pure rules that decide which side of a
//! peer pair opens the TCP connection.
//!
//! It has zero dependencies on OS APIs, async runtimes, or network sockets,
//! so every rule in here can be tested without binding a port.
//!
//! # Architecture overview (for beginners)
//!
//! LanLink keeps a reliable TCP link open between this machine and every
//! peer device on the same LAN.  Peers find each other by shouting a small
//! "identity" record on UDP broadcast; whoever hears the shout decides, using
//! a deterministic rule, whether it should dial the other side or wait to be
//! dialled.
//!
//! - **`protocol`** – How packages travel over the network.  A package is one
//!   JSON object terminated by `\n`.  The codec turns packages into bytes and
//!   back, telling "need more bytes" apart from "garbage".
//!
//! - **`domain`** – Pure rules with no I/O: the [`PeerIdentity`] type and its
//!   ordering (which resolves connection races), and the
//!   [`NetworkSnapshot`] used to detect interface changes.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `lanlink_core::NetworkPackage` instead of the full module path.
pub use domain::network::NetworkSnapshot;
pub use domain::peer::{connection_role, ConnectionRole, PeerIdentity, PeerIdentityError};
pub use protocol::codec::{decode, decode_datagram, encode, DecodeError, EncodeError, TERMINATOR};
pub use protocol::identity::{DeviceType, IdentityError, IdentityPackage};
pub use protocol::package::{
    NetworkPackage, DEFAULT_DISCOVERY_PORT, PACKAGE_TYPE_IDENTITY, PROTOCOL_VERSION,
};
