//! Local address detection for network-change reporting.
//!
//! [`current_snapshot`] asks the routing table which source address it would use to
//! reach a public destination, once per address family.  "Connecting" a UDP
//! socket sends nothing on the wire; it only performs the route lookup.  The
//! documentation prefixes (RFC 5737 / RFC 3849) are used as destinations so
//! no real host is ever named.
//!
//! This sees one address per family (the one carrying the default route),
//! which is enough to notice joining, leaving, or switching networks.

use std::net::{IpAddr, SocketAddr};

use lanlink_core::NetworkSnapshot;
use tokio::net::UdpSocket;
use tracing::trace;

const V4_ROUTE_TARGET: &str = "192.0.2.1:9";
const V6_ROUTE_TARGET: &str = "[2001:db8::1]:9";

/// Returns the currently usable local addresses.  Never fails: a family
/// without a route simply contributes nothing.
pub async fn current_snapshot() -> NetworkSnapshot {
    let mut found = Vec::with_capacity(2);
    for (bind, target) in [("0.0.0.0:0", V4_ROUTE_TARGET), ("[::]:0", V6_ROUTE_TARGET)] {
        if let Some(ip) = route_source(bind, target).await {
            found.push(ip);
        }
    }
    let snapshot = NetworkSnapshot::new(found);
    trace!("local addresses: {:?}", snapshot.addresses());
    snapshot
}

async fn route_source(bind: &str, target: &str) -> Option<IpAddr> {
    let target: SocketAddr = target.parse().ok()?;
    let socket = UdpSocket::bind(bind).await.ok()?;
    socket.connect(target).await.ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified() && !ip.is_loopback()).then_some(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_current_snapshot_never_reports_unusable_addresses() {
        let snapshot = current_snapshot().await;

        assert_eq!(
            snapshot.addresses().len(),
            snapshot.usable_addresses().len()
        );
    }

    #[tokio::test]
    async fn test_route_source_rejects_bad_target() {
        assert_eq!(route_source("0.0.0.0:0", "not an address").await, None);
    }
}
