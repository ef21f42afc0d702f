//! The `LinkProvider` abstraction and a registry that drives several
//! providers together.
//!
//! A provider is one way of reaching peers (the LAN provider in
//! `infrastructure::network` is the only one shipped).  The daemon owns a
//! [`LinkProviderRegistry`] and forwards lifecycle and network-change
//! notifications to every registered provider, highest priority first.

use async_trait::async_trait;
use lanlink_core::NetworkSnapshot;
use thiserror::Error;
use tracing::{info, warn};

pub const PRIORITY_LOW: i32 = 0;
pub const PRIORITY_MEDIUM: i32 = 50;
pub const PRIORITY_HIGH: i32 = 100;

/// A provider operation failed.  Carries the provider's own error text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{provider}: {message}")]
pub struct ProviderFailure {
    pub provider: &'static str,
    pub message: String,
}

impl ProviderFailure {
    pub fn new(provider: &'static str, err: impl std::fmt::Display) -> Self {
        Self {
            provider,
            message: err.to_string(),
        }
    }
}

/// A source of device links.
///
/// Infrastructure implementations own sockets; test implementations are
/// generated by `mockall`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkProvider: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Higher values are started first and stopped last.
    fn priority(&self) -> i32;

    async fn start(&self) -> Result<(), ProviderFailure>;

    async fn stop(&self);

    /// Reports the current local network state.
    async fn on_network_change(&self, snapshot: NetworkSnapshot) -> Result<(), ProviderFailure>;
}

/// Ordered collection of providers.
#[derive(Default)]
pub struct LinkProviderRegistry {
    providers: Vec<Box<dyn LinkProvider>>,
}

impl LinkProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a provider, keeping the list sorted by descending priority.
    /// Providers of equal priority keep registration order.
    pub fn register(&mut self, provider: Box<dyn LinkProvider>) {
        let position = self
            .providers
            .iter()
            .position(|p| p.priority() < provider.priority())
            .unwrap_or(self.providers.len());
        self.providers.insert(position, provider);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Starts every provider.  A failing provider does not prevent the
    /// others from starting; all failures are returned.
    pub async fn start_all(&self) -> Vec<ProviderFailure> {
        let mut failures = Vec::new();
        for provider in &self.providers {
            match provider.start().await {
                Ok(()) => info!("{} started", provider.name()),
                Err(e) => {
                    warn!("{e}");
                    failures.push(e);
                }
            }
        }
        failures
    }

    /// Stops every provider, lowest priority first.
    pub async fn stop_all(&self) {
        for provider in self.providers.iter().rev() {
            provider.stop().await;
            info!("{} stopped", provider.name());
        }
    }

    /// Forwards `snapshot` to every provider.
    pub async fn notify_network_change(&self, snapshot: &NetworkSnapshot) -> Vec<ProviderFailure> {
        let mut failures = Vec::new();
        for provider in &self.providers {
            if let Err(e) = provider.on_network_change(snapshot.clone()).await {
                warn!("{e}");
                failures.push(e);
            }
        }
        failures
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn mock(name: &'static str, priority: i32) -> MockLinkProvider {
        let mut provider = MockLinkProvider::new();
        provider.expect_name().return_const(name);
        provider.expect_priority().return_const(priority);
        provider
    }

    #[test]
    fn test_register_orders_by_descending_priority() {
        // Arrange
        let mut registry = LinkProviderRegistry::new();

        // Act
        registry.register(Box::new(mock("loopback", PRIORITY_LOW)));
        registry.register(Box::new(mock("lan", PRIORITY_HIGH)));
        registry.register(Box::new(mock("bluetooth", PRIORITY_MEDIUM)));
        registry.register(Box::new(mock("lan-2", PRIORITY_HIGH)));

        // Assert
        assert_eq!(registry.names(), vec!["lan", "lan-2", "bluetooth", "loopback"]);
    }

    #[tokio::test]
    async fn test_start_all_starts_in_priority_order_and_collects_failures() {
        // Arrange
        let mut seq = Sequence::new();
        let mut high = mock("lan", PRIORITY_HIGH);
        let mut low = mock("loopback", PRIORITY_LOW);
        high.expect_start()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(ProviderFailure::new("lan", "port taken")));
        low.expect_start()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        let mut registry = LinkProviderRegistry::new();
        registry.register(Box::new(low));
        registry.register(Box::new(high));

        // Act
        let failures = registry.start_all().await;

        // Assert
        assert_eq!(failures, vec![ProviderFailure::new("lan", "port taken")]);
    }

    #[tokio::test]
    async fn test_stop_all_stops_lowest_priority_first() {
        let mut seq = Sequence::new();
        let mut high = mock("lan", PRIORITY_HIGH);
        let mut low = mock("loopback", PRIORITY_LOW);
        low.expect_stop().times(1).in_sequence(&mut seq).returning(|| ());
        high.expect_stop().times(1).in_sequence(&mut seq).returning(|| ());
        let mut registry = LinkProviderRegistry::new();
        registry.register(Box::new(high));
        registry.register(Box::new(low));

        registry.stop_all().await;
    }

    #[tokio::test]
    async fn test_notify_network_change_reaches_every_provider() {
        // Arrange
        let snapshot = NetworkSnapshot::new(["192.168.1.20".parse().unwrap()]);
        let mut a = mock("lan", PRIORITY_HIGH);
        let mut b = mock("loopback", PRIORITY_LOW);
        a.expect_on_network_change()
            .with(eq(snapshot.clone()))
            .times(1)
            .returning(|_| Ok(()));
        b.expect_on_network_change()
            .with(eq(snapshot.clone()))
            .times(1)
            .returning(|_| Ok(()));
        let mut registry = LinkProviderRegistry::new();
        registry.register(Box::new(a));
        registry.register(Box::new(b));

        // Act
        let failures = registry.notify_network_change(&snapshot).await;

        // Assert
        assert!(failures.is_empty());
    }
}
