// Bidirectional peer id <-> identity registry.
//
// Two association tables kept in lock-step: `by_peer` (ordered, so roster
// iteration and broadcast order are deterministic) and `by_identity` (hash
// lookup on the hot receive path). An entry exists in one table iff it
// exists in the other; every mutation goes through `register`/`unregister`/
// `clear`, which touch both.
//
// Registration is idempotent: registering an identity that is already
// present is a no-op that reports the existing id. The lobby service and the
// adapter's own synchronous calls race (the local identity is registered
// before the join is confirmed and observed again in the roster), and this
// is what makes that harmless.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::PeerError;
use crate::types::{GlobalIdentity, PeerId};

/// Outcome of a successful `register` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Registration {
    pub peer_id: PeerId,
    /// False when the identity was already registered.
    pub newly_added: bool,
}

#[derive(Debug, Default)]
pub struct IdentityRegistry {
    by_peer: BTreeMap<PeerId, GlobalIdentity>,
    by_identity: FxHashMap<GlobalIdentity, PeerId>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `identity` to the authority id or its derived member id.
    ///
    /// Returns the existing id if `identity` is already registered, whatever
    /// `is_authority` says. Fails with `IdCollision` if the computed id is
    /// held by a different identity; the registry is unchanged in that case.
    pub fn register(
        &mut self,
        identity: GlobalIdentity,
        is_authority: bool,
    ) -> Result<Registration, PeerError> {
        if let Some(&peer_id) = self.by_identity.get(&identity) {
            return Ok(Registration {
                peer_id,
                newly_added: false,
            });
        }

        let peer_id = if is_authority {
            PeerId::AUTHORITY
        } else {
            PeerId::for_member(identity)
        };
        if let Some(&holder) = self.by_peer.get(&peer_id) {
            return Err(PeerError::IdCollision { peer_id, holder });
        }

        self.by_peer.insert(peer_id, identity);
        self.by_identity.insert(identity, peer_id);
        debug!(%identity, %peer_id, "mapped identity to peer id");
        Ok(Registration {
            peer_id,
            newly_added: true,
        })
    }

    /// Remove `identity`. Returns the freed id, or `None` if it was never
    /// registered (departures can arrive after a forced local removal).
    pub fn unregister(&mut self, identity: GlobalIdentity) -> Option<PeerId> {
        let peer_id = self.by_identity.remove(&identity)?;
        self.by_peer.remove(&peer_id);
        debug!(%identity, %peer_id, "unmapped identity");
        Some(peer_id)
    }

    pub fn peer_id_of(&self, identity: GlobalIdentity) -> Option<PeerId> {
        self.by_identity.get(&identity).copied()
    }

    pub fn identity_of(&self, peer_id: PeerId) -> Option<GlobalIdentity> {
        self.by_peer.get(&peer_id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_peer.is_empty()
    }

    /// Entries in ascending peer id order.
    pub fn iter(&self) -> impl Iterator<Item = (PeerId, GlobalIdentity)> + '_ {
        self.by_peer.iter().map(|(&p, &i)| (p, i))
    }

    /// Remove every entry, returning them in ascending peer id order.
    pub fn clear(&mut self) -> Vec<(PeerId, GlobalIdentity)> {
        self.by_identity.clear();
        std::mem::take(&mut self.by_peer).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// Check both tables are mutual inverses.
    fn assert_consistent(reg: &IdentityRegistry) {
        assert_eq!(reg.by_peer.len(), reg.by_identity.len());
        for (peer_id, identity) in reg.iter() {
            assert_eq!(reg.peer_id_of(identity), Some(peer_id));
        }
        for (&identity, &peer_id) in &reg.by_identity {
            assert_eq!(reg.identity_of(peer_id), Some(identity));
        }
    }

    #[test]
    fn authority_registration_and_removal() {
        let mut reg = IdentityRegistry::new();
        let x = GlobalIdentity(0x0110_0001_0000_1234);

        let r = reg.register(x, true).unwrap();
        assert_eq!(r.peer_id, PeerId::AUTHORITY);
        assert!(r.newly_added);
        assert_eq!(reg.peer_id_of(x), Some(PeerId::AUTHORITY));

        assert_eq!(reg.unregister(x), Some(PeerId::AUTHORITY));
        assert_eq!(reg.peer_id_of(x), None);
        assert_eq!(reg.identity_of(PeerId::AUTHORITY), None);
    }

    #[test]
    fn member_registration_uses_derived_id() {
        let mut reg = IdentityRegistry::new();
        let a = GlobalIdentity(0x0110_0001_0000_002A);
        let r = reg.register(a, false).unwrap();
        assert_eq!(r.peer_id, PeerId(42));
        assert_eq!(reg.identity_of(PeerId(42)), Some(a));
    }

    #[test]
    fn register_twice_is_noop() {
        let mut reg = IdentityRegistry::new();
        let a = GlobalIdentity(0x0110_0001_0000_002A);
        reg.register(a, false).unwrap();

        // Even with a different authority flag, the first mapping stands.
        let again = reg.register(a, true).unwrap();
        assert_eq!(again.peer_id, PeerId(42));
        assert!(!again.newly_added);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.identity_of(PeerId::AUTHORITY), None);
    }

    #[test]
    fn second_authority_refused() {
        let mut reg = IdentityRegistry::new();
        let owner = GlobalIdentity(10);
        let other = GlobalIdentity(11);
        reg.register(owner, true).unwrap();

        match reg.register(other, true) {
            Err(PeerError::IdCollision { peer_id, holder }) => {
                assert_eq!(peer_id, PeerId::AUTHORITY);
                assert_eq!(holder, owner);
            }
            other => panic!("expected IdCollision, got {other:?}"),
        }
        assert_eq!(reg.peer_id_of(other), None);
        assert_consistent(&reg);
    }

    #[test]
    fn truncation_collision_refused() {
        let mut reg = IdentityRegistry::new();
        // Same low 31 bits, different upper bits.
        let a = GlobalIdentity(0x0110_0001_0000_0099);
        let b = GlobalIdentity(0x0110_0001_8000_0099);
        reg.register(a, false).unwrap();
        assert!(matches!(
            reg.register(b, false),
            Err(PeerError::IdCollision { .. })
        ));
        assert_eq!(reg.identity_of(PeerId(0x99)), Some(a));
    }

    #[test]
    fn unregister_unknown_is_none() {
        let mut reg = IdentityRegistry::new();
        assert_eq!(reg.unregister(GlobalIdentity(5)), None);
        assert!(reg.is_empty());
    }

    #[test]
    fn clear_returns_entries_in_peer_order() {
        let mut reg = IdentityRegistry::new();
        reg.register(GlobalIdentity(300), false).unwrap();
        reg.register(GlobalIdentity(200), false).unwrap();
        reg.register(GlobalIdentity(900), true).unwrap();

        let drained = reg.clear();
        let ids: Vec<PeerId> = drained.iter().map(|(p, _)| *p).collect();
        assert_eq!(ids, vec![PeerId(1), PeerId(200), PeerId(300)]);
        assert!(reg.is_empty());
        assert_consistent(&reg);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Register(u64, bool),
        Unregister(u64),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        // A small identity pool so registrations, collisions and removals
        // interleave often.
        let identity = prop_oneof![0u64..16, (0u64..4).prop_map(|x| x | 0x8000_0000)];
        prop_oneof![
            (identity.clone(), any::<bool>()).prop_map(|(i, a)| Op::Register(i, a)),
            identity.prop_map(Op::Unregister),
        ]
    }

    proptest! {
        #[test]
        fn tables_stay_mutual_inverses(ops in prop::collection::vec(arb_op(), 0..64)) {
            let mut reg = IdentityRegistry::new();
            for op in ops {
                match op {
                    Op::Register(i, authority) => {
                        let _ = reg.register(GlobalIdentity(i), authority);
                    }
                    Op::Unregister(i) => {
                        let freed = reg.unregister(GlobalIdentity(i));
                        if let Some(peer_id) = freed {
                            prop_assert_eq!(reg.identity_of(peer_id), None);
                        }
                        prop_assert_eq!(reg.peer_id_of(GlobalIdentity(i)), None);
                    }
                }
                assert_consistent(&reg);
                let authorities = reg.iter().filter(|(p, _)| p.is_authority()).count();
                prop_assert!(authorities <= 1);
            }
        }
    }
}
