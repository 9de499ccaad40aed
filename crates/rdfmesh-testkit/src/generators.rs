//! Proptest strategies over the core model.

use proptest::prelude::*;

use rdfmesh_core::{Delta, FragmentOp, Triple};

/// Triples over the simulation alphabet (E0..E9, P0..P9); small enough
/// that generated cases collide often.
pub fn triple_strategy() -> impl Strategy<Value = Triple> {
    ("E[0-9]", "P[0-9]", "E[0-9]").prop_map(|(s, p, o)| Triple::new(s, p, o))
}

/// A delta built from a short random sequence of recorded operations.
pub fn delta_strategy() -> impl Strategy<Value = Delta> {
    prop::collection::vec((any::<bool>(), triple_strategy()), 0..12).prop_map(|ops| {
        let mut delta = Delta::new();
        for (add, triple) in ops {
            if add {
                delta.record_add(triple);
            } else {
                delta.record_remove(triple);
            }
        }
        delta
    })
}

/// A single edit fragment.
pub fn fragment_strategy() -> impl Strategy<Value = (FragmentOp, Triple)> {
    (any::<bool>(), triple_strategy()).prop_map(|(add, triple)| {
        let op = if add { FragmentOp::Add } else { FragmentOp::Remove };
        (op, triple)
    })
}
