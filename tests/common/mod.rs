#![allow(dead_code)]

//! Shared fixtures: a small builder assembling DAGs the way the upstream
//! parse/merge phase would hand them over, plus stream helpers.

use bytes::Bytes;
use cvs_fast_export::{
    AtomTable, AuthorEntry, AuthorMap, CommitId, Dag, ExportOptions, MemoryGenerator, RevId,
    RevNumber, export,
};
use std::collections::HashSet;

/// The ignore patterns CVS applies by default, as they appear in the
/// synthetic `.gitignore` blob.
pub const CVS_IGNORES: &str = "\
# CVS default ignores begin
tags
TAGS
.make.state
.nse_depinfo
*~
#*
.#*
,*
_$*
*$
*.old
*.bak
*.BAK
*.orig
*.rej
.del-*
*.a
*.olb
*.o
*.obj
*.so
*.exe
*.Z
*.elc
*.ln
core
# CVS default ignores end
";

pub struct RepoBuilder {
    pub dag: Dag,
    pub atoms: AtomTable,
    pub authors: AuthorMap,
    generator: MemoryGenerator,
    masters: HashSet<String>,
}

impl RepoBuilder {
    pub fn new() -> Self {
        RepoBuilder {
            dag: Dag::new(),
            atoms: AtomTable::new(),
            authors: AuthorMap::new(),
            generator: MemoryGenerator::new(),
            masters: HashSet::new(),
        }
    }

    /// Register a file revision together with its generated content.
    pub fn file_rev(&mut self, master: &str, mode: u32, number: &[u16], content: &str) -> RevId {
        let atom = self.atoms.intern(master);
        let rev = self.dag.add_revision(atom, mode, RevNumber(number.to_vec()));
        self.generator.push(rev, Bytes::from(content.to_string()));
        self.dag.source_bytes += content.len() as u64;
        self.masters.insert(master.to_string());
        rev
    }

    pub fn commit(
        &mut self,
        author: &str,
        log: &str,
        date: i64,
        parent: Option<CommitId>,
        revisions: Vec<RevId>,
    ) -> CommitId {
        let author = self.atoms.intern(author);
        self.dag
            .add_commit(&self.atoms, author, log, date, parent, revisions)
    }

    pub fn head(&mut self, name: &str, commit: Option<CommitId>) {
        self.dag.add_head(name, commit);
    }

    pub fn tag(&mut self, name: &str, commit: CommitId) {
        self.dag.add_tag(name, commit);
    }

    pub fn author(&mut self, key: &str, full_name: &str, email: &str, timezone: &str) {
        self.authors.insert(
            key,
            AuthorEntry::new(
                full_name.to_string(),
                email.to_string(),
                timezone.to_string(),
            ),
        );
    }

    /// Seal the DAG and wire the content generator in.
    pub fn finish(mut self) -> Repo {
        self.dag.generators.push(Box::new(self.generator));
        self.dag.masters = self.masters.len();
        self.dag.seal();
        Repo {
            dag: self.dag,
            atoms: self.atoms,
            authors: self.authors,
        }
    }
}

pub struct Repo {
    pub dag: Dag,
    pub atoms: AtomTable,
    pub authors: AuthorMap,
}

impl Repo {
    /// Run one export and hand back the stream as text.
    pub fn export_with(&mut self, opts: ExportOptions) -> String {
        let mut out = Vec::new();
        export(&mut self.dag, &mut self.atoms, &self.authors, opts, &mut out)
            .expect("export failed");
        String::from_utf8(out).expect("stream is not valid UTF-8")
    }
}

/// Every `mark :N` definition, in stream order.
pub fn defined_marks(stream: &str) -> Vec<u32> {
    let pattern = regex::Regex::new(r"(?m)^mark :(\d+)$").unwrap();
    pattern
        .captures_iter(stream)
        .map(|capture| capture[1].parse().unwrap())
        .collect()
}

/// Every `:N` back-reference (`from` lines and `M` fileops), in stream
/// order, paired with the byte offset it appears at.
pub fn mark_references(stream: &str) -> Vec<(usize, u32)> {
    let pattern = regex::Regex::new(r"(?m)^(?:from :(\d+)|M \d+ :(\d+) .*)$").unwrap();
    pattern
        .captures_iter(stream)
        .map(|capture| {
            let whole = capture.get(0).unwrap();
            let number = capture
                .get(1)
                .or_else(|| capture.get(2))
                .unwrap()
                .as_str()
                .parse()
                .unwrap();
            (whole.start(), number)
        })
        .collect()
}

/// Byte offset of each mark definition, keyed by mark number.
pub fn definition_offsets(stream: &str) -> std::collections::HashMap<u32, usize> {
    let pattern = regex::Regex::new(r"(?m)^mark :(\d+)$").unwrap();
    pattern
        .captures_iter(stream)
        .map(|capture| {
            let whole = capture.get(0).unwrap();
            (capture[1].parse().unwrap(), whole.start())
        })
        .collect()
}

/// The `committer` timestamps, in stream order.
pub fn committer_timestamps(stream: &str) -> Vec<i64> {
    let pattern = regex::Regex::new(r"(?m)^committer .* (\d+) [+-]\d{4}$").unwrap();
    pattern
        .captures_iter(stream)
        .map(|capture| capture[1].parse().unwrap())
        .collect()
}
