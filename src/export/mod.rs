//! Export driver
//!
//! Top-level orchestration of one export run: pick an operating mode,
//! drive blob generation, plan the commit order, and hand every commit to
//! the emitter. All run-scoped state (counters, mark map, blob store,
//! statistics) lives in one context value threaded through the run, so a
//! finished export leaves nothing behind but its output stream.
//!
//! ## Modes
//!
//! - *Fast* streams blobs inline as they are generated and emits branches
//!   one after another. Nothing is buffered on disk.
//! - *Canonical* spills blobs into the on-disk store so they can be
//!   re-emitted interleaved with the commits that first use them, in a
//!   total order comparable across tools.
//!
//! An incremental cutoff forces canonical mode; otherwise the adaptive
//! default picks canonical for small repositories and fast for anything
//! big enough that spilling would hurt.

pub mod emitter;

use crate::areas::blob_store::BlobStore;
use crate::areas::mark_table::{MarkTable, Serial};
use crate::artifacts::atom::{Atom, AtomTable};
use crate::artifacts::authors::AuthorMap;
use crate::artifacts::dag::{Dag, RCS_EPOCH, RevId};
use crate::artifacts::{fileops, planner};
use anyhow::Context;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::Write;

/// Source-byte threshold below which the adaptive mode picks canonical.
const SMALL_REPOSITORY: u64 = 1 << 20;

/// Whether blob store entries are zlib-compressed on disk.
const COMPRESS_BLOB_ENTRIES: bool = true;

/// Commit ordering requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportMode {
    /// Canonical for small repositories, fast otherwise.
    #[default]
    Adaptive,
    Fast,
    Canonical,
}

/// Caller-facing switches for one export run.
pub struct ExportOptions {
    pub mode: ReportMode,
    /// Prepended to branch names in `commit` and `reset` records.
    pub branch_prefix: String,
    /// Replace commit dates with a synthetic monotonic function of the
    /// mark; used when real dates are too skewed to be useful.
    pub force_dates: bool,
    /// Append `CVS-ID:` revision pairs to every commit log.
    pub embed_ids: bool,
    /// Emit `property cvs-revision` records for reposurgeon.
    pub reposurgeon: bool,
    /// Sink receiving one `<path> <rev> :<mark>` line per file reference.
    pub revision_map: Option<Box<dyn Write>>,
    /// Incremental cutoff: suppress commits dated at or before this.
    pub fromtime: Option<i64>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            mode: ReportMode::default(),
            branch_prefix: "refs/heads/".to_string(),
            force_dates: false,
            embed_ids: false,
            reposurgeon: false,
            revision_map: None,
            fromtime: None,
        }
    }
}

impl std::fmt::Debug for ExportOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportOptions")
            .field("mode", &self.mode)
            .field("branch_prefix", &self.branch_prefix)
            .field("force_dates", &self.force_dates)
            .field("embed_ids", &self.embed_ids)
            .field("reposurgeon", &self.reposurgeon)
            .field("revision_map", &self.revision_map.is_some())
            .field("fromtime", &self.fromtime)
            .finish()
    }
}

/// Counters accumulated over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub commits: usize,
    pub blobs: usize,
    /// Total snapshot bytes generated, prefixes included.
    pub snap_bytes: u64,
}

/// Resolved operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Fast,
    Canonical,
}

/// Run-scoped context threaded through generation, planning, and emission.
pub(crate) struct Export<'a, W: Write> {
    pub(crate) dag: &'a mut Dag,
    pub(crate) atoms: &'a mut AtomTable,
    pub(crate) authors: &'a AuthorMap,
    pub(crate) opts: ExportOptions,
    pub(crate) out: W,
    pub(crate) mode: Mode,
    pub(crate) marks: MarkTable,
    pub(crate) store: Option<BlobStore>,
    /// Whether each serial's blob already appeared in the stream.
    pub(crate) emitted: Vec<bool>,
    pub(crate) path_cache: HashMap<Atom, Atom>,
    pub(crate) stats: ExportStats,
    /// Interned `.gitignore`, for the synthetic-injection check.
    pub(crate) gitignore: Atom,
}

/// Run a full export of `dag` into `out`.
///
/// On success the temporary blob store is gone and the stream ends with
/// `done`. On error the store is left behind for the operator, matching
/// the guarantee that cleanup happens only on the normal exit path.
pub fn export<W: Write>(
    dag: &mut Dag,
    atoms: &mut AtomTable,
    authors: &AuthorMap,
    opts: ExportOptions,
    out: W,
) -> anyhow::Result<ExportStats> {
    let mode = choose_mode(&opts, dag);
    warn_clock_skew(dag, &opts);

    let store = match mode {
        Mode::Canonical => Some(BlobStore::create(COMPRESS_BLOB_ENTRIES)?),
        Mode::Fast => None,
    };
    let gitignore = atoms.intern(".gitignore");
    let emitted = vec![false; dag.total_revisions() + 1];

    let mut exporter = Export {
        dag,
        atoms,
        authors,
        opts,
        out,
        mode,
        marks: MarkTable::new(),
        store,
        emitted,
        path_cache: HashMap::new(),
        stats: ExportStats::default(),
        gitignore,
    };
    exporter.run()?;

    if let Some(store) = exporter.store.take() {
        store.destroy();
    }
    exporter.out.flush().context("Unable to flush output stream")?;

    log::debug!(
        "export complete: {} commits, {} blobs, {} snapshot bytes",
        exporter.stats.commits,
        exporter.stats.blobs,
        exporter.stats.snap_bytes
    );
    Ok(exporter.stats)
}

/// Print the unique author keys of `dag` in first-seen order.
pub fn export_authors(dag: &Dag, atoms: &AtomTable, out: &mut impl Write) -> anyhow::Result<()> {
    for author in planner::unique_authors(dag) {
        writeln!(out, "{}", atoms.name(author))?;
    }
    Ok(())
}

fn choose_mode(opts: &ExportOptions, dag: &Dag) -> Mode {
    if opts.fromtime.is_some() {
        return Mode::Canonical;
    }
    match opts.mode {
        ReportMode::Fast => Mode::Fast,
        ReportMode::Canonical => Mode::Canonical,
        ReportMode::Adaptive => {
            if dag.source_bytes < SMALL_REPOSITORY {
                Mode::Canonical
            } else {
                Mode::Fast
            }
        }
    }
}

fn warn_clock_skew(dag: &Dag, opts: &ExportOptions) {
    if let Some(skew) = dag.skew_vulnerable
        && skew > 0
        && dag.masters > 1
        && !opts.force_dates
    {
        let earliest = chrono::DateTime::from_timestamp(RCS_EPOCH + skew, 0)
            .map(|when| when.to_rfc3339())
            .unwrap_or_else(|| skew.to_string());
        log::warn!(
            "commits before {} may be misordered by client clock skew; consider forcing dates",
            earliest
        );
    }
}

impl<W: Write> Export<'_, W> {
    fn run(&mut self) -> anyhow::Result<()> {
        self.generate_blobs()?;

        let mut sequence = planner::plan(self.dag);
        if self.mode == Mode::Canonical {
            planner::sort_canonical(self.dag, self.atoms, &mut sequence);
        }

        for planned in sequence {
            if let Some(cutoff) = self.opts.fromtime
                && self.dag.commit(planned.commit).date <= cutoff
            {
                continue;
            }
            self.emit_commit(planned)?;
        }

        self.emit_tags()?;
        self.emit_branch_resets()?;
        self.out.write_all(b"done\n")?;
        Ok(())
    }

    /// Drive every content generator, numbering revisions as they appear.
    fn generate_blobs(&mut self) -> anyhow::Result<()> {
        let generators = std::mem::take(&mut self.dag.generators);
        for generator in &generators {
            generator.generate(&mut |rev, payload| self.ingest(rev, payload))?;
        }
        Ok(())
    }

    /// Accept one generated payload: assign the revision's serial, then
    /// spill it (canonical) or stream it out immediately (fast).
    fn ingest(&mut self, rev: RevId, payload: Bytes) -> anyhow::Result<()> {
        let serial = self.marks.next_serial()?;
        self.dag.rev_mut(rev).serial = serial;

        let master = self.dag.rev(rev).master;
        let prefix = if fileops::is_cvsignore(self.atoms.name(master)) {
            Some(emitter::CVS_IGNORES.as_bytes())
        } else {
            None
        };
        self.stats.snap_bytes += (prefix.map_or(0, <[u8]>::len) + payload.len()) as u64;

        match self.mode {
            Mode::Canonical => {
                let store = self
                    .store
                    .as_ref()
                    .context("Blob store missing in canonical mode")?;
                store.write(serial, prefix, &payload)?;
            }
            Mode::Fast => {
                let mark = self.marks.next_mark()?;
                self.marks.bind(serial, mark);
                emitter::write_blob(&mut self.out, mark, prefix, &payload)?;
                self.set_emitted(serial);
                self.stats.blobs += 1;
            }
        }
        Ok(())
    }

    pub(crate) fn is_emitted(&self, serial: Serial) -> bool {
        self.emitted
            .get(serial.as_u32() as usize)
            .copied()
            .unwrap_or(false)
    }

    pub(crate) fn set_emitted(&mut self, serial: Serial) {
        let slot = serial.as_u32() as usize;
        if slot >= self.emitted.len() {
            self.emitted.resize(slot + 1, false);
        }
        self.emitted[slot] = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_cutoff_forces_canonical_mode() {
        let dag = Dag::new();
        let opts = ExportOptions {
            mode: ReportMode::Fast,
            fromtime: Some(100),
            ..ExportOptions::default()
        };

        assert_eq!(choose_mode(&opts, &dag), Mode::Canonical);
    }

    #[test]
    fn adaptive_mode_splits_on_repository_size() {
        let mut dag = Dag::new();
        let opts = ExportOptions::default();

        dag.source_bytes = SMALL_REPOSITORY - 1;
        assert_eq!(choose_mode(&opts, &dag), Mode::Canonical);
        dag.source_bytes = SMALL_REPOSITORY;
        assert_eq!(choose_mode(&opts, &dag), Mode::Fast);
    }

    #[test]
    fn explicit_modes_are_respected() {
        let mut dag = Dag::new();
        dag.source_bytes = u64::MAX;

        let fast = ExportOptions {
            mode: ReportMode::Fast,
            ..ExportOptions::default()
        };
        let canonical = ExportOptions {
            mode: ReportMode::Canonical,
            ..ExportOptions::default()
        };
        assert_eq!(choose_mode(&fast, &dag), Mode::Fast);
        assert_eq!(choose_mode(&canonical, &dag), Mode::Canonical);
    }
}
