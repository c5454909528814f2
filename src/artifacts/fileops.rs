//! Per-commit file operations
//!
//! Given a commit and the parent links computed for it, this module builds
//! the ordered list of `M`/`D` operations the emitter writes into the
//! commit record.
//!
//! ## Path translation
//!
//! Master names still carry the CVS repository layout: `Attic/` and `RCS/`
//! components and the `,v` suffix. Output paths strip all of that, and a
//! `.cvsignore` basename becomes `.gitignore`. Translation is memoized per
//! master, so it runs once however many commits touch the file.
//!
//! ## Ordering
//!
//! Operations are sorted so that files inside a directory come before the
//! directory itself: at the first differing path segment the comparison is
//! lexicographic, and a path that is a proper prefix of another sorts
//! after it. Deletes of children therefore precede any replacement of
//! their parent.

use crate::artifacts::atom::{Atom, AtomTable};
use crate::artifacts::dag::{CommitId, Dag, RevId};
use crate::artifacts::matcher::ParentLinks;
use std::cmp::Ordering;
use std::collections::HashMap;

/// One file operation inside a commit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Modify {
        /// Already clamped to `0o100644` or `0o100755`.
        mode: u32,
        rev: RevId,
        path: Atom,
    },
    Delete {
        path: Atom,
    },
}

impl FileOp {
    pub fn path(&self) -> Atom {
        match self {
            FileOp::Modify { path, .. } | FileOp::Delete { path } => *path,
        }
    }
}

/// Compute the sorted fileops of `commit` against its parent.
///
/// A file is modified when the parent has no revision of the same master
/// or holds a different one; a parent file with no counterpart in the
/// commit is deleted.
pub fn build(
    dag: &Dag,
    atoms: &mut AtomTable,
    path_cache: &mut HashMap<Atom, Atom>,
    commit: CommitId,
    parent: Option<CommitId>,
    links: &ParentLinks,
) -> Vec<FileOp> {
    let mut ops = Vec::new();

    for &cf in &dag.commit(commit).revisions {
        let changed = match links.parent_of(cf) {
            None => true,
            Some(pf) => dag.rev(cf).serial != dag.rev(pf).serial,
        };
        if changed {
            let rev = dag.rev(cf);
            ops.push(FileOp::Modify {
                mode: clamp_mode(rev.mode),
                rev: cf,
                path: git_path(atoms, path_cache, rev.master),
            });
        }
    }

    if let Some(parent) = parent {
        for &pf in &dag.commit(parent).revisions {
            if !links.parent_matched(pf) {
                ops.push(FileOp::Delete {
                    path: git_path(atoms, path_cache, dag.rev(pf).master),
                });
            }
        }
    }

    ops.sort_by(|a, b| path_deep_compare(atoms.name(a.path()), atoms.name(b.path())));
    ops
}

/// Clamp a master's POSIX mode to the two modes the stream admits.
pub fn clamp_mode(mode: u32) -> u32 {
    if mode & 0o111 != 0 { 0o100755 } else { 0o100644 }
}

/// Whether a master holds a `.cvsignore` file (before translation).
pub fn is_cvsignore(master_name: &str) -> bool {
    master_name
        .rsplit('/')
        .next()
        .map(|base| base.strip_suffix(",v").unwrap_or(base) == ".cvsignore")
        .unwrap_or(false)
}

/// Translate a master name into its output path, memoized.
pub fn git_path(atoms: &mut AtomTable, cache: &mut HashMap<Atom, Atom>, master: Atom) -> Atom {
    if let Some(&path) = cache.get(&master) {
        return path;
    }
    let translated = translate_master_name(atoms.name(master));
    let path = atoms.intern(&translated);
    cache.insert(master, path);
    path
}

fn translate_master_name(name: &str) -> String {
    let mut segments: Vec<&str> = name
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "Attic" && *segment != "RCS")
        .collect();

    let base = segments.pop().unwrap_or("");
    let base = base.strip_suffix(",v").unwrap_or(base);
    let base = if base == ".cvsignore" {
        ".gitignore"
    } else {
        base
    };
    segments.push(base);
    segments.join("/")
}

/// Order paths so that everything inside a directory precedes the
/// directory itself.
pub fn path_deep_compare(a: &str, b: &str) -> Ordering {
    let mut left = a.split('/');
    let mut right = b.split('/');
    loop {
        match (left.next(), right.next()) {
            (Some(x), Some(y)) => match x.cmp(y) {
                Ordering::Equal => continue,
                unequal => return unequal,
            },
            // the longer path is inside the shorter one: child first
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
        }
    }
}
