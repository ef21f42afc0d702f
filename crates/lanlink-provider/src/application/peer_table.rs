//! PeerTable: the per-identity link state machine.
//!
//! The table maps a [`PeerIdentity`] to one of two explicit states:
//!
//! ```text
//!                announcement            outbound reply / inbound identity
//!  (Unknown) ───────────────► Connecting ───────────────────────────────► Linked
//!      ▲                          │                                         │
//!      └──── failure / expiry ────┘◄──────────── destruction signal ────────┘
//! ```
//!
//! `Unknown` (never heard of, or forgotten) is simply "no entry".  Seeing an
//! announcement does not create an entry by itself; the entry appears only
//! once we commit to a role.
//!
//! The table is generic over the link type `L` and does no I/O, so every
//! transition is unit-testable and the provider's event loop stays a thin
//! dispatcher.
//!
//! # Who dials whom (for beginners)
//!
//! When two devices hear each other at the same time, both could try to
//! connect and we would end up with two TCP streams for one pair.  Both sides
//! instead compare the two device ids byte-wise; the lower id dials and the
//! higher id waits.  Because both compute the same comparison, exactly one
//! side dials.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use lanlink_core::{connection_role, ConnectionRole, PeerIdentity};

/// Identifies one connection attempt so that stale outcomes can be ignored.
pub type AttemptId = u64;

/// State of a known peer.
#[derive(Debug)]
pub enum PeerState<L> {
    /// A role was chosen and a stream is being set up.
    Connecting {
        attempt: AttemptId,
        role: ConnectionRole,
        since: Instant,
    },
    /// The peer has exactly this live link.
    Linked(L),
}

/// Why an announcement was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    AlreadyLinked,
    AttemptInFlight,
    OwnIdentity,
}

/// What the provider should do about an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnouncementDecision {
    Ignore(IgnoreReason),
    /// Open an outbound stream; report the outcome with `attempt`.
    Initiate { attempt: AttemptId },
    /// Wait for the peer to connect to us.
    AwaitInbound { attempt: AttemptId },
}

/// Whether an identified inbound stream may become the peer's link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundDecision {
    Admit,
    RejectAlreadyLinked,
    /// The stream claims to be this device.
    RejectOwnIdentity,
}

/// A `Connecting` entry that was forgotten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevertedAttempt {
    pub role: ConnectionRole,
    /// Time spent in `Connecting`.
    pub waited: Duration,
}

/// Identity → state map.  Holds the only reference to each link.
#[derive(Debug)]
pub struct PeerTable<L> {
    entries: HashMap<PeerIdentity, PeerState<L>>,
    next_attempt: AttemptId,
}

impl<L> Default for PeerTable<L> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_attempt: 1,
        }
    }
}

impl<L> PeerTable<L> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an announcement from `remote` heard by `local`.
    pub fn on_announcement(
        &mut self,
        local: &PeerIdentity,
        remote: &PeerIdentity,
    ) -> AnnouncementDecision {
        match self.entries.get(remote) {
            Some(PeerState::Linked(_)) => {
                return AnnouncementDecision::Ignore(IgnoreReason::AlreadyLinked)
            }
            Some(PeerState::Connecting { .. }) => {
                return AnnouncementDecision::Ignore(IgnoreReason::AttemptInFlight)
            }
            None => {}
        }

        let Some(role) = connection_role(local, remote) else {
            return AnnouncementDecision::Ignore(IgnoreReason::OwnIdentity);
        };

        let attempt = self.next_attempt;
        self.next_attempt += 1;
        self.entries.insert(
            remote.clone(),
            PeerState::Connecting {
                attempt,
                role,
                since: Instant::now(),
            },
        );
        match role {
            ConnectionRole::Initiator => AnnouncementDecision::Initiate { attempt },
            ConnectionRole::Responder => AnnouncementDecision::AwaitInbound { attempt },
        }
    }

    /// Checks an inbound stream that identified as `peer`, heard by `local`.
    pub fn admit_inbound(&self, local: &PeerIdentity, peer: &PeerIdentity) -> InboundDecision {
        if local == peer {
            return InboundDecision::RejectOwnIdentity;
        }
        match self.entries.get(peer) {
            Some(PeerState::Linked(_)) => InboundDecision::RejectAlreadyLinked,
            _ => InboundDecision::Admit,
        }
    }

    /// `true` if `attempt` is still the live attempt for `peer`.
    pub fn is_current_attempt(&self, peer: &PeerIdentity, attempt: AttemptId) -> bool {
        matches!(
            self.entries.get(peer),
            Some(PeerState::Connecting { attempt: current, .. }) if *current == attempt
        )
    }

    /// Registers `link` as the peer's link, replacing any `Connecting` entry.
    ///
    /// Returns the link back if the peer is already linked; the caller must
    /// close it.
    pub fn promote(&mut self, peer: PeerIdentity, link: L) -> Result<(), L> {
        if let Some(PeerState::Linked(_)) = self.entries.get(&peer) {
            return Err(link);
        }
        self.entries.insert(peer, PeerState::Linked(link));
        Ok(())
    }

    /// Forgets a `Connecting` entry if `attempt` is still the live one.
    pub fn revert_attempt(
        &mut self,
        peer: &PeerIdentity,
        attempt: AttemptId,
    ) -> Option<RevertedAttempt> {
        if !self.is_current_attempt(peer, attempt) {
            return None;
        }
        match self.entries.remove(peer) {
            Some(PeerState::Connecting { role, since, .. }) => Some(RevertedAttempt {
                role,
                waited: since.elapsed(),
            }),
            _ => None,
        }
    }

    /// Removes the peer's link if `matches` accepts it.
    pub fn remove_linked_if(
        &mut self,
        peer: &PeerIdentity,
        matches: impl FnOnce(&L) -> bool,
    ) -> Option<L> {
        match self.entries.get(peer) {
            Some(PeerState::Linked(link)) if matches(link) => match self.entries.remove(peer) {
                Some(PeerState::Linked(link)) => Some(link),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn linked(&self, peer: &PeerIdentity) -> Option<&L> {
        match self.entries.get(peer) {
            Some(PeerState::Linked(link)) => Some(link),
            _ => None,
        }
    }

    /// Identities with a live link, sorted.
    pub fn linked_peers(&self) -> Vec<PeerIdentity> {
        let mut peers: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, state)| matches!(state, PeerState::Linked(_)))
            .map(|(peer, _)| peer.clone())
            .collect();
        peers.sort();
        peers
    }

    /// Empties the table, handing back every live link.
    pub fn drain(&mut self) -> Vec<(PeerIdentity, L)> {
        self.entries
            .drain()
            .filter_map(|(peer, state)| match state {
                PeerState::Linked(link) => Some((peer, link)),
                PeerState::Connecting { .. } => None,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
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
    fn test_lower_identity_initiates_higher_waits() {
        // Arrange – two independent tables, one per device
        let (a, b) = (id("alpha"), id("bravo"));
        let mut table_a: PeerTable<u32> = PeerTable::new();
        let mut table_b: PeerTable<u32> = PeerTable::new();

        // Act – both hear each other at the same time
        let at_a = table_a.on_announcement(&a, &b);
        let at_b = table_b.on_announcement(&b, &a);

        // Assert – exactly one outbound attempt, made by the lower id
        assert!(matches!(at_a, AnnouncementDecision::Initiate { .. }));
        assert!(matches!(at_b, AnnouncementDecision::AwaitInbound { .. }));
    }

    #[test]
    fn test_glare_resolution_is_symmetric_for_many_pairs() {
        let names = ["desktop-1", "phone-42", "Tablet", "tablet", "a", "ab", "b"];
        for x in names {
            for y in names {
                if x == y {
                    continue;
                }
                let mut tx: PeerTable<()> = PeerTable::new();
                let mut ty: PeerTable<()> = PeerTable::new();
                let dx = tx.on_announcement(&id(x), &id(y));
                let dy = ty.on_announcement(&id(y), &id(x));
                let initiators = [dx, dy]
                    .iter()
                    .filter(|d| matches!(d, AnnouncementDecision::Initiate { .. }))
                    .count();
                assert_eq!(initiators, 1, "{x} vs {y}");
            }
        }
    }

    #[test]
    fn test_duplicate_announcement_while_connecting_is_ignored() {
        let mut table: PeerTable<u32> = PeerTable::new();
        table.on_announcement(&id("desktop-1"), &id("phone-42"));

        let second = table.on_announcement(&id("desktop-1"), &id("phone-42"));

        assert_eq!(
            second,
            AnnouncementDecision::Ignore(IgnoreReason::AttemptInFlight)
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_announcement_for_linked_peer_changes_nothing() {
        // Arrange
        let mut table: PeerTable<u32> = PeerTable::new();
        table.promote(id("phone-42"), 7).unwrap();

        // Act
        let decision = table.on_announcement(&id("desktop-1"), &id("phone-42"));

        // Assert
        assert_eq!(
            decision,
            AnnouncementDecision::Ignore(IgnoreReason::AlreadyLinked)
        );
        assert_eq!(table.linked(&id("phone-42")), Some(&7));
    }

    #[test]
    fn test_own_identity_is_ignored() {
        let mut table: PeerTable<u32> = PeerTable::new();

        let decision = table.on_announcement(&id("desktop-1"), &id("desktop-1"));

        assert_eq!(decision, AnnouncementDecision::Ignore(IgnoreReason::OwnIdentity));
        assert!(table.is_empty());
    }

    #[test]
    fn test_promote_refuses_second_link_for_same_identity() {
        let mut table: PeerTable<u32> = PeerTable::new();
        table.promote(id("phone-42"), 1).unwrap();

        let result = table.promote(id("phone-42"), 2);

        assert_eq!(result, Err(2));
        assert_eq!(table.linked(&id("phone-42")), Some(&1));
    }

    #[test]
    fn test_inbound_rejected_only_when_linked() {
        let mut table: PeerTable<u32> = PeerTable::new();
        table.on_announcement(&id("zulu"), &id("phone-42"));
        assert_eq!(
            table.admit_inbound(&id("zulu"), &id("phone-42")),
            InboundDecision::Admit
        );

        table.promote(id("phone-42"), 1).unwrap();

        assert_eq!(
            table.admit_inbound(&id("zulu"), &id("phone-42")),
            InboundDecision::RejectAlreadyLinked
        );
    }

    #[test]
    fn test_inbound_claiming_own_identity_is_rejected() {
        let table: PeerTable<u32> = PeerTable::new();

        let decision = table.admit_inbound(&id("desktop-1"), &id("desktop-1"));

        assert_eq!(decision, InboundDecision::RejectOwnIdentity);
    }

    #[test]
    fn test_revert_attempt_ignores_stale_attempt_ids() {
        // Arrange
        let mut table: PeerTable<u32> = PeerTable::new();
        let AnnouncementDecision::Initiate { attempt } =
            table.on_announcement(&id("desktop-1"), &id("phone-42"))
        else {
            panic!("expected initiate");
        };

        // Act
        let stale = table.revert_attempt(&id("phone-42"), attempt + 100);
        let current = table.revert_attempt(&id("phone-42"), attempt);

        // Assert
        assert_eq!(stale, None);
        assert_eq!(current.map(|r| r.role), Some(ConnectionRole::Initiator));
        assert!(table.is_empty());
    }

    #[test]
    fn test_failed_attempt_allows_a_fresh_one() {
        let mut table: PeerTable<u32> = PeerTable::new();
        let first = table.on_announcement(&id("desktop-1"), &id("phone-42"));
        let AnnouncementDecision::Initiate { attempt } = first else {
            panic!("expected initiate");
        };
        table.revert_attempt(&id("phone-42"), attempt);

        let retry = table.on_announcement(&id("desktop-1"), &id("phone-42"));

        assert!(matches!(retry, AnnouncementDecision::Initiate { attempt: a } if a != attempt));
    }

    #[test]
    fn test_reverted_responder_reports_its_role() {
        let mut table: PeerTable<u32> = PeerTable::new();
        let AnnouncementDecision::AwaitInbound { attempt } =
            table.on_announcement(&id("zulu"), &id("phone-42"))
        else {
            panic!("expected await");
        };

        let reverted = table.revert_attempt(&id("phone-42"), attempt).unwrap();

        assert_eq!(reverted.role, ConnectionRole::Responder);
        assert!(reverted.waited < Duration::from_secs(5));
    }

    #[test]
    fn test_remove_linked_if_checks_the_link_instance() {
        let mut table: PeerTable<u32> = PeerTable::new();
        table.promote(id("phone-42"), 5).unwrap();

        assert_eq!(table.remove_linked_if(&id("phone-42"), |l| *l == 4), None);
        assert_eq!(table.remove_linked_if(&id("phone-42"), |l| *l == 5), Some(5));
        assert!(table.is_empty());
    }

    #[test]
    fn test_drain_returns_only_links_and_clears_everything() {
        let mut table: PeerTable<u32> = PeerTable::new();
        table.promote(id("phone-42"), 1).unwrap();
        table.promote(id("tablet-7"), 2).unwrap();
        table.on_announcement(&id("desktop-1"), &id("tv-3"));

        let mut drained = table.drain();
        drained.sort();

        assert_eq!(drained, vec![(id("phone-42"), 1), (id("tablet-7"), 2)]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_linked_peers_are_sorted() {
        let mut table: PeerTable<u32> = PeerTable::new();
        table.promote(id("tablet-7"), 1).unwrap();
        table.promote(id("phone-42"), 2).unwrap();

        assert_eq!(table.linked_peers(), vec![id("phone-42"), id("tablet-7")]);
    }
}
