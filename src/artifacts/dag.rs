//! The merged revision DAG handed over by the parse/merge phase
//!
//! The DAG is a forest of per-branch commit chains. Each branch is headed
//! by a [`Ref`]; commits chain toward the root through their single parent.
//! A commit owns an ordered list of [`FileRevision`]s, one per file present
//! in that commit's tree; unchanged files share the same revision object
//! (by id) with the parent commit.
//!
//! Everything in here is created by the external parse/merge phase and
//! read-only afterwards, except the `serial` slots, which the export core
//! fills in exactly once.
//!
//! ## Chain segments and tail flags
//!
//! Branch chains overlap: a side branch's parent pointers eventually run
//! into commits that belong to the trunk. Each commit therefore carries a
//! `tail` flag marking the last commit of its branch's exclusive segment;
//! traversal from a head stops at the tail commit, inclusive. A [`Ref`]
//! whose own `tail` flag is set was produced by grafting and owns no
//! commits at all; planners skip it entirely.

use crate::areas::mark_table::Serial;
use crate::artifacts::atom::{Atom, AtomTable, Bloom};
use bytes::Bytes;
use std::collections::HashSet;

/// Seconds between the RCS epoch (1972-01-01) and the Unix epoch.
///
/// Commit and revision dates are stored as seconds since the RCS epoch;
/// adding this constant yields the Unix timestamps the stream wants.
pub const RCS_EPOCH: i64 = 63_072_000;

/// Index of a [`FileRevision`] in the DAG's revision arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RevId(pub u32);

/// Index of a [`Commit`] in the DAG's commit arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(pub u32);

/// Dotted CVS revision number (`1.2`, `1.4.2.3`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RevNumber(pub Vec<u16>);

impl std::fmt::Display for RevNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for part in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{}", part)?;
            first = false;
        }
        Ok(())
    }
}

/// Immutable snapshot of one versioned file at one CVS revision.
#[derive(Debug, Clone)]
pub struct FileRevision {
    /// Interned master name, as it appears in the repository layout.
    pub master: Atom,
    /// POSIX mode bits of the master file.
    pub mode: u32,
    /// Dotted revision number inside the master.
    pub number: RevNumber,
    /// Assigned once during content generation; [`Serial::NONE`] before.
    pub serial: Serial,
}

/// Node in the merged DAG.
#[derive(Debug, Clone)]
pub struct Commit {
    /// Interned author key (CVS login).
    pub author: Atom,
    /// Commit log text.
    pub log: String,
    /// Seconds since the RCS epoch.
    pub date: i64,
    pub parent: Option<CommitId>,
    /// Union of the Bloom fingerprints of every file name in this commit.
    pub bloom: Bloom,
    /// File revisions sorted by interned-name order.
    pub revisions: Vec<RevId>,
    /// Last commit of its branch's exclusive segment.
    pub tail: bool,
    /// Assigned at emission time, immediately before the commit's mark.
    pub serial: Serial,
}

/// Branch head.
#[derive(Debug, Clone)]
pub struct Ref {
    pub name: String,
    pub head: Option<CommitId>,
    /// Set when the branch was produced by grafting and its chain must not
    /// be re-emitted.
    pub tail: bool,
}

/// A name paired with a target commit.
#[derive(Debug, Clone)]
pub struct Tag {
    pub name: String,
    pub commit: CommitId,
    /// Date of the target commit, seconds since the RCS epoch.
    pub date: i64,
}

/// Drives blob content for one master through a callback.
///
/// Implementations must invoke the sink exactly once per file revision, in
/// depth-first master order. The export core assigns the revision's serial
/// before the sink body runs.
pub trait ContentGenerator {
    fn generate(
        &self,
        sink: &mut dyn FnMut(RevId, Bytes) -> anyhow::Result<()>,
    ) -> anyhow::Result<()>;
}

/// Generator backed by an in-memory table.
///
/// The production parser streams content out of RCS deltas; tests and
/// small callers hand the payloads over up front instead.
#[derive(Debug, Default)]
pub struct MemoryGenerator {
    payloads: Vec<(RevId, Bytes)>,
}

impl MemoryGenerator {
    pub fn new() -> Self {
        MemoryGenerator::default()
    }

    pub fn push(&mut self, rev: RevId, payload: impl Into<Bytes>) {
        self.payloads.push((rev, payload.into()));
    }
}

impl ContentGenerator for MemoryGenerator {
    fn generate(
        &self,
        sink: &mut dyn FnMut(RevId, Bytes) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        for (rev, payload) in &self.payloads {
            sink(*rev, payload.clone())?;
        }
        Ok(())
    }
}

/// The forest of per-branch chains plus everything the export needs to
/// size and pace itself.
#[derive(Default)]
pub struct Dag {
    revisions: Vec<FileRevision>,
    commits: Vec<Commit>,
    pub heads: Vec<Ref>,
    pub tags: Vec<Tag>,
    pub generators: Vec<Box<dyn ContentGenerator>>,
    /// Total source bytes across all masters; drives the adaptive mode pick.
    pub source_bytes: u64,
    /// Changeset clustering window, seconds.
    pub time_window: i64,
    /// Earliest timestamp vulnerable to client clock skew, if any.
    pub skew_vulnerable: Option<i64>,
    /// Number of masters contributing to the DAG.
    pub masters: usize,
}

impl std::fmt::Debug for Dag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dag")
            .field("revisions", &self.revisions.len())
            .field("commits", &self.commits.len())
            .field("heads", &self.heads)
            .field("tags", &self.tags)
            .field("source_bytes", &self.source_bytes)
            .finish_non_exhaustive()
    }
}

impl Dag {
    pub fn new() -> Self {
        Dag {
            time_window: 300,
            ..Dag::default()
        }
    }

    pub fn add_revision(&mut self, master: Atom, mode: u32, number: RevNumber) -> RevId {
        let id = RevId(self.revisions.len() as u32);
        self.revisions.push(FileRevision {
            master,
            mode,
            number,
            serial: Serial::NONE,
        });
        id
    }

    /// Add a commit, flattening its file list into name order and unioning
    /// the Bloom fingerprints.
    ///
    /// The two-level directory bucketing of the merge phase never crosses
    /// this boundary; downstream code sees one ordered sequence per commit.
    pub fn add_commit(
        &mut self,
        atoms: &AtomTable,
        author: Atom,
        log: &str,
        date: i64,
        parent: Option<CommitId>,
        mut revisions: Vec<RevId>,
    ) -> CommitId {
        revisions.sort_by_key(|&rev| self.revisions[rev.0 as usize].master);
        let bloom = revisions.iter().fold(Bloom::ZERO, |acc, &rev| {
            acc.union(&atoms.bloom(self.revisions[rev.0 as usize].master))
        });

        let id = CommitId(self.commits.len() as u32);
        self.commits.push(Commit {
            author,
            log: log.to_string(),
            date,
            parent,
            bloom,
            revisions,
            tail: false,
            serial: Serial::NONE,
        });
        id
    }

    pub fn add_head(&mut self, name: &str, head: Option<CommitId>) {
        self.heads.push(Ref {
            name: name.to_string(),
            head,
            tail: false,
        });
    }

    pub fn add_tag(&mut self, name: &str, commit: CommitId) {
        let date = self.commit(commit).date;
        self.tags.push(Tag {
            name: name.to_string(),
            commit,
            date,
        });
    }

    pub fn rev(&self, id: RevId) -> &FileRevision {
        &self.revisions[id.0 as usize]
    }

    pub fn rev_mut(&mut self, id: RevId) -> &mut FileRevision {
        &mut self.revisions[id.0 as usize]
    }

    pub fn commit(&self, id: CommitId) -> &Commit {
        &self.commits[id.0 as usize]
    }

    pub fn commit_mut(&mut self, id: CommitId) -> &mut Commit {
        &mut self.commits[id.0 as usize]
    }

    pub fn total_revisions(&self) -> usize {
        self.revisions.len()
    }

    pub fn total_commits(&self) -> usize {
        self.commits.len()
    }

    /// Assign chain segments: walk each head in order, mark the last
    /// not-yet-covered commit of each chain as the segment tail, and flag
    /// heads whose entire chain was already covered by an earlier head.
    ///
    /// The merge phase normally hands over a DAG with these flags already
    /// set; builders that assemble a DAG directly call this once after the
    /// last head is added.
    pub fn seal(&mut self) {
        let mut covered: HashSet<CommitId> = HashSet::new();
        for head_index in 0..self.heads.len() {
            let mut cursor = self.heads[head_index].head;
            let mut last_owned: Option<CommitId> = None;
            while let Some(id) = cursor {
                if !covered.insert(id) {
                    break;
                }
                last_owned = Some(id);
                cursor = self.commit(id).parent;
            }
            match last_owned {
                Some(tail) => self.commit_mut(tail).tail = true,
                None => self.heads[head_index].tail = true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_branch_dag() -> (Dag, AtomTable) {
        let mut atoms = AtomTable::new();
        let author = atoms.intern("anon");
        let mut dag = Dag::new();
        let c0 = dag.add_commit(&atoms, author, "root", 100, None, vec![]);
        let c1 = dag.add_commit(&atoms, author, "trunk", 200, Some(c0), vec![]);
        let s1 = dag.add_commit(&atoms, author, "side", 300, Some(c0), vec![]);
        dag.add_head("master", Some(c1));
        dag.add_head("side", Some(s1));
        dag.seal();
        (dag, atoms)
    }

    #[test]
    fn commit_revisions_sort_by_interning_order() {
        let mut atoms = AtomTable::new();
        let author = atoms.intern("anon");
        let early = atoms.intern("a,v");
        let late = atoms.intern("z,v");
        let mut dag = Dag::new();
        let rz = dag.add_revision(late, 0o644, RevNumber(vec![1, 1]));
        let ra = dag.add_revision(early, 0o644, RevNumber(vec![1, 1]));

        let commit = dag.add_commit(&atoms, author, "log", 1, None, vec![rz, ra]);
        assert_eq!(dag.commit(commit).revisions, vec![ra, rz]);
    }

    #[test]
    fn commit_bloom_covers_every_member_name() {
        let mut atoms = AtomTable::new();
        let author = atoms.intern("anon");
        let a = atoms.intern("a,v");
        let b = atoms.intern("b,v");
        let mut dag = Dag::new();
        let ra = dag.add_revision(a, 0o644, RevNumber(vec![1, 1]));
        let rb = dag.add_revision(b, 0o644, RevNumber(vec![1, 1]));

        let commit = dag.add_commit(&atoms, author, "log", 1, None, vec![ra, rb]);
        assert!(dag.commit(commit).bloom.covers(&atoms.bloom(a)));
        assert!(dag.commit(commit).bloom.covers(&atoms.bloom(b)));
    }

    #[test]
    fn seal_marks_segment_tails() {
        let (dag, _) = two_branch_dag();

        // master owns c1 and c0; its tail is the root
        assert!(dag.commit(CommitId(0)).tail);
        assert!(!dag.commit(CommitId(1)).tail);
        // side owns only its own commit
        assert!(dag.commit(CommitId(2)).tail);
        assert!(!dag.heads[0].tail);
        assert!(!dag.heads[1].tail);
    }

    #[test]
    fn seal_flags_fully_covered_heads() {
        let mut atoms = AtomTable::new();
        let author = atoms.intern("anon");
        let mut dag = Dag::new();
        let c0 = dag.add_commit(&atoms, author, "root", 100, None, vec![]);
        dag.add_head("master", Some(c0));
        dag.add_head("graft", Some(c0));
        dag.seal();

        assert!(!dag.heads[0].tail);
        assert!(dag.heads[1].tail);
    }

    #[test]
    fn rev_number_displays_dotted() {
        assert_eq!(RevNumber(vec![1, 4, 2, 3]).to_string(), "1.4.2.3");
        assert_eq!(RevNumber(vec![1, 1]).to_string(), "1.1");
    }
}
