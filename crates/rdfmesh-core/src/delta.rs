//! Add/remove delta sets and the squash algebra that combines them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::triple::Triple;
use crate::types::TripleHash;

/// The net add/remove effect a revision applies to the triple set.
///
/// Within one delta a triple hash is never in both maps: recording an add
/// for a triple already marked removed cancels the removal instead (and
/// symmetrically), keeping deltas minimal.
///
/// BTreeMaps keep key order deterministic for hashing and wire encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(rename = "deltas_add")]
    adds: BTreeMap<TripleHash, Triple>,
    #[serde(rename = "deltas_remove")]
    removes: BTreeMap<TripleHash, Triple>,
}

impl Delta {
    /// The empty delta, identity of [`Delta::squash`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adds(&self) -> &BTreeMap<TripleHash, Triple> {
        &self.adds
    }

    pub fn removes(&self) -> &BTreeMap<TripleHash, Triple> {
        &self.removes
    }

    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.removes.is_empty()
    }

    /// Record an addition; cancels a pending removal of the same triple.
    pub fn record_add(&mut self, triple: Triple) {
        if self.removes.remove(&triple.hash()).is_none() {
            self.adds.insert(triple.hash(), triple);
        }
    }

    /// Record a removal; cancels a pending addition of the same triple.
    pub fn record_remove(&mut self, triple: Triple) {
        if self.adds.remove(&triple.hash()).is_none() {
            self.removes.insert(triple.hash(), triple);
        }
    }

    /// Sequential squash: the net effect of applying `self`, then `next`.
    ///
    /// Adds are `self`'s adds minus what `next` removes, overlaid with
    /// `next`'s adds (later wins). Removes are the union of both sides.
    /// Associative, with the empty delta as identity.
    pub fn squash(&self, next: &Delta) -> Delta {
        let mut adds: BTreeMap<TripleHash, Triple> = self
            .adds
            .iter()
            .filter(|(hash, _)| !next.removes.contains_key(hash))
            .map(|(hash, triple)| (*hash, triple.clone()))
            .collect();
        adds.extend(next.adds.iter().map(|(h, t)| (*h, t.clone())));

        let mut removes = self.removes.clone();
        removes.extend(next.removes.iter().map(|(h, t)| (*h, t.clone())));

        Delta { adds, removes }
    }

    /// Three-way merge of two branches diverging from a common ancestor.
    ///
    /// Adds: the ancestor's adds minus anything either branch removed,
    /// overlaid with the local branch's adds and then the incoming
    /// branch's adds (incoming wins ties). Removes: union of all three.
    pub fn three_way(ancestor: &Delta, local: &Delta, incoming: &Delta) -> Delta {
        let mut adds: BTreeMap<TripleHash, Triple> = ancestor
            .adds
            .iter()
            .filter(|(hash, _)| {
                !local.removes.contains_key(hash) && !incoming.removes.contains_key(hash)
            })
            .map(|(hash, triple)| (*hash, triple.clone()))
            .collect();
        adds.extend(local.adds.iter().map(|(h, t)| (*h, t.clone())));
        adds.extend(incoming.adds.iter().map(|(h, t)| (*h, t.clone())));

        let mut removes = ancestor.removes.clone();
        removes.extend(local.removes.iter().map(|(h, t)| (*h, t.clone())));
        removes.extend(incoming.removes.iter().map(|(h, t)| (*h, t.clone())));

        Delta { adds, removes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(n: u32) -> Triple {
        Triple::new(format!("E{n}"), "P1", "E0")
    }

    #[test]
    fn add_then_remove_cancels() {
        let mut delta = Delta::new();
        delta.record_add(t(1));
        delta.record_remove(t(1));
        assert!(delta.is_empty());
    }

    #[test]
    fn remove_then_add_cancels() {
        let mut delta = Delta::new();
        delta.record_remove(t(1));
        delta.record_add(t(1));
        assert!(delta.is_empty());
    }

    #[test]
    fn squash_later_remove_wins() {
        let mut first = Delta::new();
        first.record_add(t(1));
        first.record_add(t(2));
        let mut second = Delta::new();
        second.record_remove(t(1));

        let net = first.squash(&second);
        assert!(!net.adds().contains_key(&t(1).hash()));
        assert!(net.adds().contains_key(&t(2).hash()));
        assert!(net.removes().contains_key(&t(1).hash()));
    }

    #[test]
    fn squash_identity() {
        let mut delta = Delta::new();
        delta.record_add(t(1));
        delta.record_remove(t(2));
        assert_eq!(Delta::new().squash(&delta), delta);
        assert_eq!(delta.squash(&Delta::new()), delta);
    }

    #[test]
    fn squash_is_associative() {
        let mut a = Delta::new();
        a.record_add(t(1));
        a.record_add(t(2));
        let mut b = Delta::new();
        b.record_remove(t(2));
        b.record_add(t(3));
        let mut c = Delta::new();
        c.record_remove(t(3));
        c.record_add(t(4));

        assert_eq!(a.squash(&b).squash(&c), a.squash(&b.squash(&c)));
    }

    #[test]
    fn three_way_incoming_wins_and_removes_union() {
        let mut ancestor = Delta::new();
        ancestor.record_add(t(1));
        ancestor.record_add(t(2));
        let mut local = Delta::new();
        local.record_remove(t(1));
        local.record_add(t(3));
        let mut incoming = Delta::new();
        incoming.record_add(t(4));

        let merged = Delta::three_way(&ancestor, &local, &incoming);
        assert!(!merged.adds().contains_key(&t(1).hash()));
        assert!(merged.adds().contains_key(&t(2).hash()));
        assert!(merged.adds().contains_key(&t(3).hash()));
        assert!(merged.adds().contains_key(&t(4).hash()));
        assert!(merged.removes().contains_key(&t(1).hash()));
    }
}
