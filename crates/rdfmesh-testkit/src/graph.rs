//! Simulated edit sources that drive agents toward a target graph.

use std::collections::{HashMap, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rdfmesh_core::{EditSource, FragmentOp, Triple, TripleHash};

/// Default seed shared by simulations so every peer pursues the same
/// target graph.
pub const DEFAULT_SEED: u64 = 123;
const DEFAULT_SIZE: usize = 25;
const DEFAULT_MUTATION_CHANCE: f64 = 0.1;
const DEFAULT_UNCOVER_OUTDATED_CHANCE: f64 = 0.3;

/// Entity and predicate labels are drawn from small fixed alphabets
/// (E0..E9, P0..P9), so distinct peers frequently touch the same triples.
fn random_triple(rng: &mut StdRng) -> Triple {
    let subject = format!("E{}", rng.gen_range(0..10));
    let predicate = format!("P{}", rng.gen_range(0..10));
    let object = format!("E{}", rng.gen_range(0..10));
    Triple::new(subject, predicate, object)
}

/// An edit source converging the document toward a hidden ground-truth
/// graph, with occasional drift.
///
/// Each fragment either removes an outdated triple (present in the state
/// but no longer true) or adds an uncovered one (true but absent). Before
/// choosing, the ground truth itself mutates with a small probability,
/// modelling a world that changes under the agents.
pub struct GraphGenerator {
    rng: StdRng,
    ground_truth: Vec<Triple>,
    mutation_chance: f64,
    uncover_outdated_chance: f64,
}

impl GraphGenerator {
    pub fn new(seed: u64) -> Self {
        Self::with_params(
            seed,
            DEFAULT_SIZE,
            DEFAULT_MUTATION_CHANCE,
            DEFAULT_UNCOVER_OUTDATED_CHANCE,
        )
    }

    pub fn with_params(
        seed: u64,
        size: usize,
        mutation_chance: f64,
        uncover_outdated_chance: f64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let ground_truth = (0..size.max(1)).map(|_| random_triple(&mut rng)).collect();
        Self {
            rng,
            ground_truth,
            mutation_chance,
            uncover_outdated_chance,
        }
    }

    /// The current target graph.
    pub fn ground_truth(&self) -> &[Triple] {
        &self.ground_truth
    }

    /// True once `state` holds exactly the ground-truth triples.
    pub fn is_covered(&self, state: &HashMap<TripleHash, Triple>) -> bool {
        state.len() == self.dedup_len()
            && self.ground_truth.iter().all(|t| state.contains_key(&t.hash()))
    }

    fn dedup_len(&self) -> usize {
        let mut hashes: Vec<TripleHash> = self.ground_truth.iter().map(Triple::hash).collect();
        hashes.sort();
        hashes.dedup();
        hashes.len()
    }
}

impl EditSource for GraphGenerator {
    fn next_fragment(&mut self, state: &HashMap<TripleHash, Triple>) -> (FragmentOp, Triple) {
        if self.rng.gen_bool(self.mutation_chance) {
            let slot = self.rng.gen_range(0..self.ground_truth.len());
            self.ground_truth[slot] = random_triple(&mut self.rng);
        }

        // Sorted by hash so the pick is deterministic under a fixed seed.
        let mut outdated: Vec<&Triple> = state
            .values()
            .filter(|t| !self.ground_truth.contains(t))
            .collect();
        outdated.sort_by_key(|t| t.hash());
        if !outdated.is_empty() && self.rng.gen_bool(self.uncover_outdated_chance) {
            let pick = self.rng.gen_range(0..outdated.len());
            return (FragmentOp::Remove, outdated[pick].clone());
        }

        let uncovered: Vec<&Triple> = self
            .ground_truth
            .iter()
            .filter(|t| !state.contains_key(&t.hash()))
            .collect();
        if uncovered.is_empty() {
            // Fully covered: re-assert a known triple, a no-op edit.
            let pick = self.rng.gen_range(0..self.ground_truth.len());
            return (FragmentOp::Add, self.ground_truth[pick].clone());
        }
        let pick = self.rng.gen_range(0..uncovered.len());
        (FragmentOp::Add, uncovered[pick].clone())
    }
}

/// A fully scripted edit source for deterministic protocol tests.
///
/// Yields the queued fragments in order; once exhausted it re-asserts a
/// fixed filler triple, which is a no-op for a state that already holds it.
pub struct ScriptedEdits {
    queue: VecDeque<(FragmentOp, Triple)>,
}

impl ScriptedEdits {
    pub fn new(fragments: impl IntoIterator<Item = (FragmentOp, Triple)>) -> Self {
        Self {
            queue: fragments.into_iter().collect(),
        }
    }

    pub fn push(&mut self, op: FragmentOp, triple: Triple) {
        self.queue.push_back((op, triple));
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl EditSource for ScriptedEdits {
    fn next_fragment(&mut self, _state: &HashMap<TripleHash, Triple>) -> (FragmentOp, Triple) {
        self.queue
            .pop_front()
            .unwrap_or_else(|| (FragmentOp::Add, Triple::new("E0", "P0", "E0")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_ground_truth() {
        let a = GraphGenerator::new(DEFAULT_SEED);
        let b = GraphGenerator::new(DEFAULT_SEED);
        assert_eq!(a.ground_truth(), b.ground_truth());
    }

    #[test]
    fn fragments_converge_to_ground_truth_without_mutation() {
        let mut generator = GraphGenerator::with_params(7, 10, 0.0, 0.3);
        let mut state: HashMap<TripleHash, Triple> = HashMap::new();

        for _ in 0..200 {
            let (op, triple) = generator.next_fragment(&state);
            match op {
                FragmentOp::Add => {
                    state.insert(triple.hash(), triple);
                }
                FragmentOp::Remove => {
                    state.remove(&triple.hash());
                }
            }
            if generator.is_covered(&state) {
                return;
            }
        }
        panic!("state never covered the ground truth");
    }

    #[test]
    fn scripted_edits_replay_in_order() {
        let first = Triple::new("E1", "P1", "E2");
        let second = Triple::new("E2", "P2", "E3");
        let mut edits = ScriptedEdits::new(vec![
            (FragmentOp::Add, first.clone()),
            (FragmentOp::Remove, second.clone()),
        ]);

        let state = HashMap::new();
        assert_eq!(edits.next_fragment(&state), (FragmentOp::Add, first));
        assert_eq!(edits.next_fragment(&state), (FragmentOp::Remove, second));
        assert_eq!(edits.remaining(), 0);
    }
}
