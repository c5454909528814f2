//! Commit ordering
//!
//! The planner flattens the per-branch chains into one emission sequence.
//!
//! ## Algorithm
//!
//! Phase A walks every non-grafted head, measures its exclusive segment
//! (head down to the segment tail, inclusive), and lays the segments out
//! back to back: branches concatenated in head order, each branch
//! internally root-to-head. Fast mode emits exactly this order.
//!
//! Phase B (canonical mode) first checks that topological order agrees
//! with timestamps, meaning every commit is dated no earlier than its
//! parent. If it does, a stable sort produces the canonical total order:
//! timestamp
//! ascending, parent/grandparent adjacency breaking ties, then author and
//! log text as deterministic tiebreakers. If it does not, the sort would
//! reorder parents after children, so the planner warns once and keeps the
//! Phase A order.

use crate::artifacts::atom::{Atom, AtomTable};
use crate::artifacts::dag::{CommitId, Dag};
use std::cmp::Ordering;

/// One emission slot: a commit and the head whose branch it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedCommit {
    pub commit: CommitId,
    /// Index into `dag.heads`.
    pub head: usize,
}

/// Phase A: branches concatenated in head order, each root-to-head.
pub fn plan(dag: &Dag) -> Vec<PlannedCommit> {
    let mut sequence = Vec::with_capacity(dag.total_commits());

    for (head_index, head) in dag.heads.iter().enumerate() {
        if head.tail {
            continue;
        }
        let base = sequence.len();
        let mut length = 0;
        let mut cursor = head.head;
        while let Some(id) = cursor {
            length += 1;
            let commit = dag.commit(id);
            cursor = if commit.tail { None } else { commit.parent };
        }

        // fill the segment back to front so it reads root-to-head
        sequence.resize(
            base + length,
            PlannedCommit {
                commit: CommitId(0),
                head: head_index,
            },
        );
        let mut cursor = head.head;
        let mut slot = base + length;
        while let Some(id) = cursor {
            slot -= 1;
            sequence[slot] = PlannedCommit {
                commit: id,
                head: head_index,
            };
            let commit = dag.commit(id);
            cursor = if commit.tail { None } else { commit.parent };
        }
    }

    sequence
}

/// Phase B: sort into canonical order when timestamps allow it.
///
/// # Returns
///
/// Whether the sequence was sorted. A `false` means the topological order
/// disagreed with timestamps somewhere; the warning has already been
/// issued and the Phase A order stands.
pub fn sort_canonical(dag: &Dag, atoms: &AtomTable, sequence: &mut [PlannedCommit]) -> bool {
    for planned in sequence.iter() {
        let commit = dag.commit(planned.commit);
        if let Some(parent) = commit.parent
            && dag.commit(parent).date > commit.date
        {
            log::warn!(
                "some commit timestamps predate their parents; keeping topological order"
            );
            return false;
        }
    }

    sequence.sort_by(|a, b| compare_commits(dag, atoms, a.commit, b.commit));
    true
}

/// Author atoms in first-seen Phase A order.
pub fn unique_authors(dag: &Dag) -> Vec<Atom> {
    let mut seen = std::collections::HashSet::new();
    let mut authors = Vec::new();
    for planned in plan(dag) {
        let author = dag.commit(planned.commit).author;
        if seen.insert(author) {
            authors.push(author);
        }
    }
    authors
}

/// Canonical total order over commits.
///
/// Ties beyond author and log chase parents in lock-step; two chains equal
/// all the way down compare equal.
fn compare_commits(dag: &Dag, atoms: &AtomTable, a: CommitId, b: CommitId) -> Ordering {
    let (mut a, mut b) = (a, b);
    loop {
        if a == b {
            return Ordering::Equal;
        }
        let ca = dag.commit(a);
        let cb = dag.commit(b);

        match ca.date.cmp(&cb.date) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        // a commit sorts after its own parent or grandparent
        if within_two_generations(dag, a, b) {
            return Ordering::Greater;
        }
        if within_two_generations(dag, b, a) {
            return Ordering::Less;
        }
        match atoms.name(ca.author).cmp(atoms.name(cb.author)) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        match ca.log.cmp(&cb.log) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        match (ca.parent, cb.parent) {
            (Some(pa), Some(pb)) => {
                a = pa;
                b = pb;
            }
            _ => return Ordering::Equal,
        }
    }
}

/// Whether `ancestor` is the parent or grandparent of `commit`.
fn within_two_generations(dag: &Dag, commit: CommitId, ancestor: CommitId) -> bool {
    match dag.commit(commit).parent {
        None => false,
        Some(parent) if parent == ancestor => true,
        Some(parent) => dag.commit(parent).parent == Some(ancestor),
    }
}
