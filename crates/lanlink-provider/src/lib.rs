//! lanlink-provider library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.

pub mod application;
pub mod infrastructure;

pub use application::events::{LinkEvent, LinkTransport};
pub use application::provider::{LinkProvider, LinkProviderRegistry, ProviderFailure};
pub use infrastructure::network::link_provider::{
    LanLinkProvider, NetworkChangeOutcome, ProviderConfig, ProviderError, ProviderStatus,
};
