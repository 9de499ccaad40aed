//! Prebuilt documents for DAG tests.

use rdfmesh_core::{AuthorId, Document, Revision, Triple};

/// A document with `edits` single-add revisions on top of a root that
/// contains `(E0, P0, E1)`. Panics on ownership errors, which cannot occur
/// for a self-built chain.
pub fn linear_document(author: &str, edits: usize) -> Document {
    let mut doc = Document::new(AuthorId::from(author));
    doc.new_revision();
    apply_add(&mut doc, Triple::new("E0", "P0", "E1"));
    for i in 0..edits {
        doc.new_revision();
        apply_add(&mut doc, Triple::new(format!("E{i}"), "P1", format!("E{}", i + 1)));
    }
    doc
}

/// Two documents by different authors diverging from one shared root.
///
/// Each holds the root plus one revision of its own: `a` added
/// `(E1, P1, E2)`, `b` added `(E1, P1, E3)`. Returns `(a, b, root)`.
pub fn divergent_pair(author_a: &str, author_b: &str) -> (Document, Document, Revision) {
    let mut a = Document::new(AuthorId::from(author_a));
    a.new_revision();
    apply_add(&mut a, Triple::new("E0", "P0", "E1"));
    let root = match a.head_revision() {
        Some(revision) => revision.clone(),
        None => unreachable!("document was just given a revision"),
    };

    let mut b = Document::new(AuthorId::from(author_b));
    b.append_revision(root.clone());

    a.new_revision();
    apply_add(&mut a, Triple::new("E1", "P1", "E2"));
    b.new_revision();
    apply_add(&mut b, Triple::new("E1", "P1", "E3"));

    (a, b, root)
}

fn apply_add(doc: &mut Document, triple: Triple) {
    if let Err(e) = doc.add(triple) {
        panic!("fixture edit failed: {e}");
    }
}
