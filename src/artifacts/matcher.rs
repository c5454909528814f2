//! Parent-link resolution between a commit and its parent
//!
//! The fileop builder needs to know, for every file in a commit, which
//! revision (if any) the parent commit holds for the same master, and for
//! every file in the parent whether the commit still carries it. Both
//! commits' revision sequences are sorted by interned-name order, so the
//! pairing can be computed with one cursor over the parent sequence; the
//! per-commit Bloom filter short-circuits files the parent provably does
//! not have.
//!
//! The links live in a side table rebuilt per commit and discarded right
//! after its fileops are built; the DAG itself stays untouched.

use crate::artifacts::atom::AtomTable;
use crate::artifacts::dag::{CommitId, Dag, RevId};
use std::collections::{HashMap, HashSet};

/// Pairing of shared file references between a commit and its parent.
#[derive(Debug, Default)]
pub struct ParentLinks {
    child_to_parent: HashMap<RevId, RevId>,
    matched_parent: HashSet<RevId>,
}

impl ParentLinks {
    /// Links for a commit with no parent: nothing matches.
    pub fn empty() -> Self {
        ParentLinks::default()
    }

    /// Pair up the shared file references of `commit` and `parent`.
    pub fn compute(dag: &Dag, atoms: &AtomTable, commit: CommitId, parent: CommitId) -> Self {
        let mut links = ParentLinks::default();
        let commit = dag.commit(commit);
        let parent = dag.commit(parent);

        let mut cursor = 0;
        let mut maxmatch = commit.revisions.len().min(parent.revisions.len());
        for &cf in &commit.revisions {
            if maxmatch == 0 {
                break;
            }
            let name = dag.rev(cf).master;
            if !parent.bloom.covers(&atoms.bloom(name)) {
                continue;
            }
            // both sequences share interned-name order, so matches only
            // ever advance the cursor
            for (offset, &pf) in parent.revisions[cursor..].iter().enumerate() {
                if dag.rev(pf).master == name {
                    links.child_to_parent.insert(cf, pf);
                    links.matched_parent.insert(pf);
                    cursor += offset + 1;
                    maxmatch -= 1;
                    break;
                }
            }
        }
        links
    }

    /// The parent's revision of the same master, if the parent has one.
    pub fn parent_of(&self, rev: RevId) -> Option<RevId> {
        self.child_to_parent.get(&rev).copied()
    }

    /// Whether a parent-side revision found its counterpart in the commit.
    pub fn parent_matched(&self, rev: RevId) -> bool {
        self.matched_parent.contains(&rev)
    }
}
