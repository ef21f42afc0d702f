//! Application layer for the link provider.
//!
//! Everything here is free of sockets and file I/O:
//!
//! - **`events`** – What consumers of links receive: "link established"
//!   with a transport, and "link lost".
//!
//! - **`peer_table`** – The per-identity state machine (`Connecting` /
//!   `Linked`) including the rule that decides which side of a pair dials.
//!   The LAN provider's event loop is a thin dispatcher around it.
//!
//! - **`provider`** – The `LinkProvider` trait and a registry that starts,
//!   stops, and notifies several providers in priority order.

pub mod events;
pub mod peer_table;
pub mod provider;
