//! Domain layer: pure rules with no I/O.
//!
//! - **`peer`** – [`peer::PeerIdentity`] and the deterministic tie-break that
//!   decides which side of a pair dials the other.
//! - **`network`** – [`network::NetworkSnapshot`], the value compared on every
//!   network change notification.

pub mod network;
pub mod peer;
