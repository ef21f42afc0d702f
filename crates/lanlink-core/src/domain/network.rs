//! Snapshot of the local network configuration.
//!
//! The provider keeps the last snapshot it saw and compares every new one
//! against it.  Only the set of *usable* addresses matters: loopback,
//! unspecified, and multicast addresses never carry LAN links, so changes to
//! them are ignored.

use std::collections::BTreeSet;
use std::net::IpAddr;

/// Immutable set of local addresses observed at one instant.
///
/// A new snapshot replaces the old one wholesale; there is no way to mutate
/// one in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSnapshot {
    addresses: BTreeSet<IpAddr>,
}

impl NetworkSnapshot {
    pub fn new(addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
        }
    }

    /// A snapshot with no addresses at all (no network).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every address, usable or not.
    pub fn addresses(&self) -> &BTreeSet<IpAddr> {
        &self.addresses
    }

    /// Addresses that can carry LAN traffic.
    pub fn usable_addresses(&self) -> BTreeSet<IpAddr> {
        self.addresses
            .iter()
            .copied()
            .filter(|ip| is_usable(ip))
            .collect()
    }

    /// `true` when the usable address sets of `self` and `other` differ.
    pub fn differs_from(&self, other: &NetworkSnapshot) -> bool {
        self.usable_addresses() != other.usable_addresses()
    }
}

fn is_usable(ip: &IpAddr) -> bool {
    !(ip.is_loopback() || ip.is_unspecified() || ip.is_multicast())
}
