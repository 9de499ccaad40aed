//! The per-peer replica: a revision DAG plus its materialized triple set.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use crate::delta::Delta;
use crate::error::{DocumentError, Result};
use crate::revision::Revision;
use crate::triple::Triple;
use crate::types::{AuthorId, RevisionHash, TripleHash};

/// Edit fragment operation produced by an [`EditSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentOp {
    Add,
    Remove,
}

impl FragmentOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentOp::Add => "+",
            FragmentOp::Remove => "-",
        }
    }
}

impl fmt::Display for FragmentOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of local edits, driven by the local-edit producer.
///
/// Implementations are external collaborators (simulation generators, real
/// applications); the core only pulls one fragment at a time against the
/// current materialized state.
pub trait EditSource: Send {
    fn next_fragment(&mut self, state: &HashMap<TripleHash, Triple>) -> (FragmentOp, Triple);
}

/// A peer's local replica of the shared graph.
///
/// Revisions live in a hash-keyed arena with parent links as hash
/// references; `cached_state` is the triple set obtained by folding every
/// delta along the head's ancestry (merge revisions carry their branch
/// effect pre-flattened, so replay is linear). `head` only ever points at a
/// revision present in the arena.
#[derive(Debug, Clone)]
pub struct Document {
    author: AuthorId,
    revisions: HashMap<RevisionHash, Revision>,
    head: Option<RevisionHash>,
    cached_state: HashMap<TripleHash, Triple>,
}

impl Document {
    pub fn new(author: AuthorId) -> Self {
        Self {
            author,
            revisions: HashMap::new(),
            head: None,
            cached_state: HashMap::new(),
        }
    }

    pub fn author(&self) -> &AuthorId {
        &self.author
    }

    pub fn head(&self) -> Option<RevisionHash> {
        self.head
    }

    pub fn head_revision(&self) -> Option<&Revision> {
        self.head.and_then(|hash| self.revisions.get(&hash))
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn revision_count(&self) -> usize {
        self.revisions.len()
    }

    pub fn contains(&self, hash: &RevisionHash) -> bool {
        self.revisions.contains_key(hash)
    }

    pub fn revision(&self, hash: &RevisionHash) -> Option<&Revision> {
        self.revisions.get(hash)
    }

    /// The materialized triple set at the current head.
    pub fn state(&self) -> &HashMap<TripleHash, Triple> {
        &self.cached_state
    }

    /// Start a fresh local revision on top of the current head (or a root
    /// revision if the document is empty) and make it the new head.
    pub fn new_revision(&mut self) -> RevisionHash {
        let parents: Vec<RevisionHash> = self.head.into_iter().collect();
        let revision = Revision::new(parents, self.author.clone());
        let hash = revision.hash();
        self.revisions.insert(hash, revision);
        self.head = Some(hash);
        hash
    }

    /// Add a triple to the in-progress local revision and the live state.
    pub fn add(&mut self, triple: Triple) -> Result<()> {
        let head = self.owned_head()?;
        if let Some(revision) = self.revisions.get_mut(&head) {
            revision.record_add(triple.clone());
        }
        self.cached_state.insert(triple.hash(), triple);
        self.rekey_head();
        Ok(())
    }

    /// Remove a triple via the in-progress local revision.
    pub fn remove(&mut self, triple: Triple) -> Result<()> {
        let head = self.owned_head()?;
        if let Some(revision) = self.revisions.get_mut(&head) {
            revision.record_remove(triple.clone());
        }
        self.cached_state.remove(&triple.hash());
        self.rekey_head();
        Ok(())
    }

    /// Apply one edit fragment.
    pub fn apply_fragment(&mut self, op: FragmentOp, triple: Triple) -> Result<()> {
        match op {
            FragmentOp::Add => self.add(triple),
            FragmentOp::Remove => self.remove(triple),
        }
    }

    /// Insert a fully-formed revision and advance the head to it.
    ///
    /// No ancestry validation happens here; callers are responsible for
    /// parent-completeness checks. The revision's own delta is applied to
    /// the cached state.
    pub fn append_revision(&mut self, revision: Revision) {
        for triple in revision.delta().adds().values() {
            self.cached_state.insert(triple.hash(), triple.clone());
        }
        for hash in revision.delta().removes().keys() {
            self.cached_state.remove(hash);
        }
        let hash = revision.hash();
        self.revisions.insert(hash, revision);
        self.head = Some(hash);
    }

    /// Nearest revision reachable from both the local head and `revision`.
    ///
    /// Bidirectional breadth-first search, one step per side per iteration
    /// so neither side can starve the other on skewed depths. Fails with
    /// [`DocumentError::MissingRevision`] when a referenced parent is not
    /// present locally, and with [`DocumentError::NoCommonAncestor`] when
    /// both ancestries are exhausted without intersecting.
    pub fn common_ancestor(&self, revision: &Revision) -> Result<Revision> {
        let head = self.head.ok_or(DocumentError::NoCommonAncestor)?;

        let mut visited_local: HashSet<RevisionHash> = HashSet::from([head]);
        let mut visited_other: HashSet<RevisionHash> = HashSet::from([revision.hash()]);
        let mut queue_local: VecDeque<RevisionHash> = VecDeque::from([head]);
        let mut queue_other: VecDeque<RevisionHash> = VecDeque::from([revision.hash()]);

        while !queue_local.is_empty() || !queue_other.is_empty() {
            if let Some(hash) = queue_local.pop_front() {
                if visited_other.contains(&hash) {
                    return Ok(self.resolve(hash, revision)?.clone());
                }
                for parent in self.resolve(hash, revision)?.parents().to_vec() {
                    if visited_local.insert(parent) {
                        queue_local.push_back(parent);
                    }
                }
            }
            if let Some(hash) = queue_other.pop_front() {
                if visited_local.contains(&hash) {
                    return Ok(self.resolve(hash, revision)?.clone());
                }
                for parent in self.resolve(hash, revision)?.parents().to_vec() {
                    if visited_other.insert(parent) {
                        queue_other.push_back(parent);
                    }
                }
            }
        }
        Err(DocumentError::NoCommonAncestor)
    }

    /// Revisions strictly after `ancestor` up to and including `revision`,
    /// in chronological order, found by breadth-first path search over
    /// parent links.
    pub fn revisions_between(
        &self,
        ancestor: &RevisionHash,
        revision: &Revision,
    ) -> Result<Vec<Revision>> {
        let mut queue: VecDeque<Vec<RevisionHash>> = VecDeque::from([vec![revision.hash()]]);

        while let Some(path) = queue.pop_front() {
            let Some(&last) = path.last() else { continue };
            if last == *ancestor {
                return path
                    .iter()
                    .rev()
                    .skip(1)
                    .map(|hash| self.resolve(*hash, revision).map(Revision::clone))
                    .collect();
            }
            for parent in self.resolve(last, revision)?.parents().to_vec() {
                let mut next = path.clone();
                next.push(parent);
                queue.push_back(next);
            }
        }
        Err(DocumentError::NoPath {
            from: *ancestor,
            to: revision.hash(),
        })
    }

    /// Fold an ordered chain of revisions into its net delta.
    ///
    /// The empty chain yields the identity delta, so an empty branch
    /// segment squashes to "no effect".
    pub fn combine_revisions(revisions: &[Revision]) -> Delta {
        revisions
            .iter()
            .fold(Delta::new(), |acc, revision| acc.squash(revision.delta()))
    }

    /// Build a two-parent merge of the local head and `revision`.
    ///
    /// Returns `Ok(None)` when there is nothing to merge: the common
    /// ancestor already is the local head (incoming is a descendant), or
    /// the document is still empty (plain append is bootstrap, not a
    /// fork). The merge is a three-way set merge with the incoming branch
    /// winning ties; nothing is appended here, that is the caller's call.
    pub fn merge_revision(&self, revision: &Revision) -> Result<Option<Revision>> {
        let Some(head) = self.head else {
            return Ok(None);
        };
        let ancestor = self.common_ancestor(revision)?;
        if ancestor.hash() == head {
            return Ok(None);
        }

        let head_revision = self
            .revisions
            .get(&head)
            .ok_or(DocumentError::MissingRevision(head))?;
        let local_chain = self.revisions_between(&ancestor.hash(), head_revision)?;
        let incoming_chain = self.revisions_between(&ancestor.hash(), revision)?;

        let local = Self::combine_revisions(&local_chain);
        let incoming = Self::combine_revisions(&incoming_chain);
        let delta = Delta::three_way(ancestor.delta(), &local, &incoming);

        Ok(Some(Revision::with_delta(
            vec![head, revision.hash()],
            self.author.clone(),
            delta,
        )))
    }

    /// True iff a common ancestor exists and every revision between it and
    /// the local head is locally authored (the branch since divergence is
    /// uncontested, so it may be relinked instead of merged).
    pub fn can_rebase(&self, revision: &Revision) -> Result<bool> {
        let Some(head) = self.head else {
            return Ok(false);
        };
        let ancestor = match self.common_ancestor(revision) {
            Ok(ancestor) => ancestor,
            Err(DocumentError::NoCommonAncestor) => return Ok(false),
            Err(e) => return Err(e),
        };
        let head_revision = self
            .revisions
            .get(&head)
            .ok_or(DocumentError::MissingRevision(head))?;
        let between = self.revisions_between(&ancestor.hash(), head_revision)?;
        Ok(between.iter().all(|r| r.author() == &self.author))
    }

    /// Linearize the local branch onto `revision`.
    ///
    /// Appends `revision`, then relinks every local revision after the
    /// common ancestor to chain behind it in chronological order. Because
    /// a revision's hash covers its parents, each relinked revision is
    /// re-keyed under its recomputed hash. Returns the relinked revisions;
    /// the protocol layer re-announces them to peers.
    pub fn rebase_revision(&mut self, revision: Revision) -> Result<Vec<Revision>> {
        let head = self.head.ok_or(DocumentError::EmptyDocument)?;
        let ancestor = self.common_ancestor(&revision)?;
        let head_revision = self
            .revisions
            .get(&head)
            .ok_or(DocumentError::MissingRevision(head))?
            .clone();
        let chain = self.revisions_between(&ancestor.hash(), &head_revision)?;

        let mut previous = revision.hash();
        self.append_revision(revision);

        let mut rebased = Vec::with_capacity(chain.len());
        for mut relinked in chain {
            self.revisions.remove(&relinked.hash());
            relinked.set_parents(vec![previous]);
            relinked.rehash();
            previous = relinked.hash();
            self.append_revision(relinked.clone());
            rebased.push(relinked);
        }
        Ok(rebased)
    }

    /// Re-materialize the triple set by replaying every delta from the
    /// root along the head's first-parent chain. Used to check the cached
    /// state invariant; fails on incomplete ancestry.
    pub fn replayed_state(&self) -> Result<HashMap<TripleHash, Triple>> {
        let Some(head) = self.head else {
            return Ok(HashMap::new());
        };

        let mut chain = Vec::new();
        let mut cursor = Some(head);
        while let Some(hash) = cursor {
            let revision = self
                .revisions
                .get(&hash)
                .ok_or(DocumentError::MissingRevision(hash))?;
            chain.push(revision);
            cursor = revision.parents().first().copied();
        }
        chain.reverse();

        let mut state = HashMap::new();
        for revision in chain {
            for triple in revision.delta().adds().values() {
                state.insert(triple.hash(), triple.clone());
            }
            for hash in revision.delta().removes().keys() {
                state.remove(hash);
            }
        }
        Ok(state)
    }

    /// Look up a revision, falling back to `incoming` for its own hash
    /// (the incoming revision is usually not in the arena yet).
    fn resolve<'a>(&'a self, hash: RevisionHash, incoming: &'a Revision) -> Result<&'a Revision> {
        if hash == incoming.hash() {
            return Ok(incoming);
        }
        self.revisions
            .get(&hash)
            .ok_or(DocumentError::MissingRevision(hash))
    }

    /// The current head, checked to be editable by the local author.
    fn owned_head(&self) -> Result<RevisionHash> {
        let head = self.head.ok_or(DocumentError::EmptyDocument)?;
        let revision = self
            .revisions
            .get(&head)
            .ok_or(DocumentError::MissingRevision(head))?;
        if revision.author() != &self.author {
            return Err(DocumentError::OwnershipViolation {
                owner: revision.author().clone(),
            });
        }
        Ok(head)
    }

    /// Re-key the head revision after its content changed.
    fn rekey_head(&mut self) {
        let Some(old) = self.head else { return };
        let Some(mut revision) = self.revisions.remove(&old) else {
            return;
        };
        revision.rehash();
        let new = revision.hash();
        self.revisions.insert(new, revision);
        self.head = Some(new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(subject: &str, object: &str) -> Triple {
        Triple::new(subject, "P1", object)
    }

    fn doc(author: &str) -> Document {
        Document::new(AuthorId::from(author))
    }

    /// A document with one root revision containing `+{(E1,P1,E2)}`.
    fn rooted(author: &str) -> Document {
        let mut document = doc(author);
        document.new_revision();
        document.add(t("E1", "E2")).unwrap();
        document
    }

    #[test]
    fn add_requires_a_revision() {
        let mut document = doc("a");
        assert!(matches!(
            document.add(t("E1", "E2")),
            Err(DocumentError::EmptyDocument)
        ));
    }

    #[test]
    fn add_updates_delta_and_state() {
        let document = rooted("a");
        let head = document.head_revision().unwrap();
        assert_eq!(head.delta().adds().len(), 1);
        assert!(document.state().contains_key(&t("E1", "E2").hash()));
    }

    #[test]
    fn mutating_head_rekeys_it() {
        let mut document = doc("a");
        let fresh = document.new_revision();
        document.add(t("E1", "E2")).unwrap();
        let head = document.head().unwrap();
        assert_ne!(head, fresh);
        assert!(!document.contains(&fresh));
        assert_eq!(document.head_revision().unwrap().hash(), head);
    }

    #[test]
    fn cannot_edit_foreign_revision() {
        let mut document = rooted("a");
        let foreign = Revision::new(vec![document.head().unwrap()], AuthorId::from("b"));
        document.append_revision(foreign);
        assert!(matches!(
            document.add(t("E1", "E3")),
            Err(DocumentError::OwnershipViolation { .. })
        ));
    }

    #[test]
    fn add_then_remove_is_a_noop_on_the_revision() {
        let mut document = rooted("a");
        document.new_revision();
        document.add(t("E5", "E6")).unwrap();
        document.remove(t("E5", "E6")).unwrap();
        assert!(document.head_revision().unwrap().delta().is_empty());
        assert!(!document.state().contains_key(&t("E5", "E6").hash()));
    }

    #[test]
    fn cached_state_matches_replay_over_linear_history() {
        let mut document = rooted("a");
        document.new_revision();
        document.add(t("E3", "E4")).unwrap();
        document.new_revision();
        document.remove(t("E1", "E2")).unwrap();
        document.add(t("E5", "E6")).unwrap();

        assert_eq!(*document.state(), document.replayed_state().unwrap());
        assert_eq!(document.state().len(), 2);
    }

    #[test]
    fn common_ancestor_of_head_with_itself() {
        let document = rooted("a");
        let head = document.head_revision().unwrap().clone();
        let ancestor = document.common_ancestor(&head).unwrap();
        assert_eq!(ancestor.hash(), head.hash());
    }

    #[test]
    fn common_ancestor_of_divergent_branches_is_the_root() {
        let mut a = rooted("a");
        let root = a.head_revision().unwrap().clone();

        let mut b = doc("b");
        b.append_revision(root.clone());
        b.new_revision();
        b.add(t("E1", "E3")).unwrap();
        let b_head = b.head_revision().unwrap().clone();

        a.new_revision();
        a.add(t("E1", "E4")).unwrap();

        let ancestor = a.common_ancestor(&b_head).unwrap();
        assert_eq!(ancestor.hash(), root.hash());
    }

    #[test]
    fn common_ancestor_reports_missing_parents() {
        let a = rooted("a");
        let ghost = RevisionHash::from_bytes([9; 32]);
        let orphan = Revision::new(vec![ghost], AuthorId::from("b"));
        assert!(matches!(
            a.common_ancestor(&orphan),
            Err(DocumentError::MissingRevision(hash)) if hash == ghost
        ));
    }

    #[test]
    fn disjoint_roots_have_no_common_ancestor() {
        let a = rooted("a");
        let foreign_root = Revision::new(Vec::new(), AuthorId::from("b"));
        assert!(matches!(
            a.common_ancestor(&foreign_root),
            Err(DocumentError::NoCommonAncestor)
        ));
    }

    #[test]
    fn revisions_between_is_chronological() {
        let mut document = rooted("a");
        let root = document.head().unwrap();
        document.new_revision();
        document.add(t("E3", "E4")).unwrap();
        let mid = document.head().unwrap();
        document.new_revision();
        document.add(t("E5", "E6")).unwrap();
        let head = document.head_revision().unwrap().clone();

        let between = document.revisions_between(&root, &head).unwrap();
        let hashes: Vec<_> = between.iter().map(Revision::hash).collect();
        assert_eq!(hashes, vec![mid, head.hash()]);
    }

    #[test]
    fn revisions_between_siblings_has_no_path() {
        let mut a = rooted("a");
        let root = a.head_revision().unwrap().clone();

        let mut b = doc("b");
        b.append_revision(root);
        b.new_revision();
        b.add(t("E1", "E3")).unwrap();
        let sibling = b.head_revision().unwrap().clone();

        a.new_revision();
        a.add(t("E1", "E4")).unwrap();
        let local = a.head().unwrap();

        assert!(matches!(
            a.revisions_between(&local, &sibling),
            Err(DocumentError::NoPath { .. })
        ));
    }

    #[test]
    fn combine_over_grouping_is_stable() {
        let mut document = rooted("a");
        let root = document.head().unwrap();
        document.new_revision();
        document.add(t("E3", "E4")).unwrap();
        document.new_revision();
        document.remove(t("E3", "E4")).unwrap();
        document.add(t("E5", "E6")).unwrap();

        // Same chain, folded whole vs. in two halves.
        let head = document.head_revision().unwrap().clone();
        let chain = document.revisions_between(&root, &head).unwrap();
        let whole = Document::combine_revisions(&chain);
        let halves = Document::combine_revisions(&chain[..1])
            .squash(&Document::combine_revisions(&chain[1..]));
        assert_eq!(whole, halves);
    }

    #[test]
    fn merge_of_divergent_single_edits_keeps_both() {
        let mut a = rooted("a");
        let root = a.head_revision().unwrap().clone();

        let mut b = doc("b");
        b.append_revision(root);
        b.new_revision();
        b.add(t("E1", "E3")).unwrap();
        let incoming = b.head_revision().unwrap().clone();

        a.new_revision();
        a.add(t("E1", "E4")).unwrap();

        let merge = a.merge_revision(&incoming).unwrap().unwrap();
        assert!(merge.is_merge());
        assert_eq!(merge.parents(), &[a.head().unwrap(), incoming.hash()]);

        let adds = merge.delta().adds();
        assert!(adds.contains_key(&t("E1", "E2").hash())); // root survives
        assert!(adds.contains_key(&t("E1", "E3").hash())); // incoming branch
        assert!(adds.contains_key(&t("E1", "E4").hash())); // local branch
    }

    #[test]
    fn merge_is_noop_for_descendants() {
        let mut a = rooted("a");
        let head = a.head().unwrap();
        let descendant = Revision::new(vec![head], AuthorId::from("b"));
        assert!(a.merge_revision(&descendant).unwrap().is_none());

        // Appending it plainly is the fast-forward path.
        a.append_revision(descendant.clone());
        assert_eq!(a.head(), Some(descendant.hash()));
    }

    #[test]
    fn merge_on_empty_document_is_noop() {
        let a = doc("a");
        let foreign = Revision::new(Vec::new(), AuthorId::from("b"));
        assert!(a.merge_revision(&foreign).unwrap().is_none());
    }

    #[test]
    fn can_rebase_false_when_branch_has_foreign_revisions() {
        let mut a = rooted("a");
        let root = a.head_revision().unwrap().clone();

        // Local head advances over a revision authored by b.
        let mut b = doc("b");
        b.append_revision(root.clone());
        b.new_revision();
        b.add(t("E1", "E3")).unwrap();
        a.append_revision(b.head_revision().unwrap().clone());

        let mut c = doc("c");
        c.append_revision(root);
        c.new_revision();
        c.add(t("E1", "E5")).unwrap();
        let incoming = c.head_revision().unwrap().clone();

        assert!(!a.can_rebase(&incoming).unwrap());
    }

    #[test]
    fn can_rebase_true_for_private_branch() {
        let mut a = rooted("a");
        let root = a.head_revision().unwrap().clone();
        a.new_revision();
        a.add(t("E1", "E4")).unwrap();

        let mut c = doc("c");
        c.append_revision(root);
        c.new_revision();
        c.add(t("E1", "E5")).unwrap();
        let incoming = c.head_revision().unwrap().clone();

        assert!(a.can_rebase(&incoming).unwrap());
    }

    #[test]
    fn can_rebase_true_when_incoming_is_a_descendant() {
        let a = rooted("a");
        let descendant = Revision::new(vec![a.head().unwrap()], AuthorId::from("b"));
        // Nothing diverged; rebase degenerates to a fast-forward append.
        assert!(a.can_rebase(&descendant).unwrap());
    }

    #[test]
    fn rebase_relinks_and_rekeys_the_local_branch() {
        let mut a = rooted("a");
        let root = a.head_revision().unwrap().clone();
        a.new_revision();
        a.add(t("E1", "E4")).unwrap();
        let old_tip = a.head().unwrap();

        // Incoming revision that extends the root on another peer.
        let mut b = doc("b");
        b.append_revision(root);
        b.new_revision();
        b.add(t("E1", "E3")).unwrap();
        let incoming = b.head_revision().unwrap().clone();

        let rebased = a.rebase_revision(incoming.clone()).unwrap();
        assert_eq!(rebased.len(), 1);
        let relinked = &rebased[0];
        assert_ne!(relinked.hash(), old_tip);
        assert_eq!(relinked.parents(), &[incoming.hash()]);
        assert_eq!(a.head(), Some(relinked.hash()));
        assert!(!a.contains(&old_tip));

        // Net state holds the root triple plus both branch edits.
        assert_eq!(*a.state(), a.replayed_state().unwrap());
        assert!(a.state().contains_key(&t("E1", "E2").hash()));
        assert!(a.state().contains_key(&t("E1", "E3").hash()));
        assert!(a.state().contains_key(&t("E1", "E4").hash()));
    }
}
