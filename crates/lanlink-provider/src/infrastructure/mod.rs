//! Infrastructure layer for the link provider.
//!
//! Contains the OS-facing adapters: UDP and TCP sockets, the LAN provider's
//! event loop, local address probing, and configuration file storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `lanlink_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
