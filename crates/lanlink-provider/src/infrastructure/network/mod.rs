//! Network infrastructure for the LAN link provider.
//!
//! # Sub-modules
//!
//! - **`link_provider`** – The orchestrator.  Owns the event loop, the peer
//!   map, and the sockets below; exposes `start` / `stop` /
//!   `notify_network_change`.
//!
//! - **`discovery`** – The UDP broadcast socket.  Parses identity
//!   announcements from other devices and sends our own.
//!
//! - **`acceptor`** – The listening TCP socket.  Accepts inbound streams and
//!   waits (bounded) for the peer's identity package.
//!
//! - **`connector`** – Opens outbound streams, sends our identity, and checks
//!   the reply.
//!
//! - **`device_link`** – One established stream to one peer: ordered
//!   outbound queue, inbound package forwarding, destruction signal.
//!
//! - **`handshake`**, **`framing`** – Identity exchange and newline framing
//!   shared by both directions.
//!
//! - **`socket_config`** – Keep-alive, no-delay, and buffer-size policy
//!   applied to every stream.
//!
//! - **`interfaces`** – Detects the local usable addresses so callers can
//!   report network changes.

pub mod acceptor;
pub mod connector;
pub mod device_link;
pub mod discovery;
pub mod framing;
pub mod handshake;
pub mod interfaces;
pub mod link_provider;
pub mod socket_config;
