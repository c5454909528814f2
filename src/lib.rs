//! Export engine turning a merged CVS revision DAG into a git fast-import
//! stream.
//!
//! The input is a forest of per-branch commit chains (already parsed out of
//! CVS master files and clustered into changesets by an upstream phase),
//! together with per-master content generators. The output is a single
//! deterministic byte stream in the fast-import format: `blob` records,
//! `commit` records with their file operations, tag and branch `reset`
//! records, and a closing `done`.
//!
//! ## Guarantees
//!
//! - Every mark is defined in the stream before anything refers to it.
//! - Commits are emitted either in per-branch root-to-head order (fast
//!   mode) or in a canonical total order compatible with timestamps and
//!   topology (canonical mode).
//! - Blob content is streamed through bounded memory; repositories larger
//!   than RAM spill into an on-disk store that is deleted when the export
//!   finishes.
//!
//! ## Entry points
//!
//! [`export`] runs a full export against a writer; [`export_authors`]
//! prints the unique author keys in first-seen order. Everything else is
//! plumbing that those two drive.

pub mod areas;
pub mod artifacts;
pub mod export;

pub use areas::mark_table::{Mark, MarkTable, Serial};
pub use artifacts::atom::{Atom, AtomTable, Bloom};
pub use artifacts::authors::{AuthorEntry, AuthorMap};
pub use artifacts::dag::{
    Commit, CommitId, ContentGenerator, Dag, FileRevision, MemoryGenerator, RCS_EPOCH, Ref, RevId,
    RevNumber, Tag,
};
pub use export::{ExportOptions, ExportStats, ReportMode, export, export_authors};
