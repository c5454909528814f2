//! Stream emission
//!
//! Writers for every record kind of the fast-import grammar: `blob`,
//! `commit` with its fileops, `reset` for tags and branch tips, and the
//! closing `done`. Records are separated by a single blank line and marks
//! are bound strictly at definition time, so anything referring back via
//! `:N` is guaranteed to point at an earlier record.
//!
//! ## Commit record layout
//!
//! ```text
//! commit <branch_prefix><branch>
//! mark :N
//! committer <name> <email> <timestamp> <offset>
//! data <len>
//! <log>
//! from :<parent-mark>          (or a ^0 anchor in incremental mode)
//! M <mode> :<blob-mark> <path> / D <path>   (comparator order)
//! ```
//!
//! The first commit of a run that does not itself carry a `.gitignore`
//! gets the CVS default-ignore boilerplate injected as an inline blob, so
//! checkouts ignore the same files CVS ignored.

use crate::areas::mark_table::{Mark, Serial};
use crate::artifacts::dag::RCS_EPOCH;
use crate::artifacts::fileops::{self, FileOp};
use crate::artifacts::matcher::ParentLinks;
use crate::artifacts::planner::PlannedCommit;
use crate::export::{Export, Mode};
use anyhow::Context;
use chrono::FixedOffset;
use std::io::Read;
use std::io::Write;

/// The ignore patterns CVS applies by default.
///
/// Injected as the synthetic `.gitignore` and prepended to every converted
/// `.cvsignore`, so the converted repository ignores what CVS ignored.
pub(crate) const CVS_IGNORES: &str = "\
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

/// Write one framed blob record.
pub(crate) fn write_blob(
    out: &mut impl Write,
    mark: Mark,
    prefix: Option<&[u8]>,
    payload: &[u8],
) -> anyhow::Result<()> {
    let len = prefix.map_or(0, <[u8]>::len) + payload.len();
    write!(out, "blob\nmark :{}\ndata {}\n", mark, len)?;
    if let Some(prefix) = prefix {
        out.write_all(prefix)?;
    }
    out.write_all(payload)?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Format a UTC offset the way the stream wants it (`+0000`, `-0500`).
fn format_offset(offset: FixedOffset) -> String {
    let seconds = offset.local_minus_utc();
    let sign = if seconds < 0 { '-' } else { '+' };
    let minutes = seconds.abs() / 60;
    format!("{}{:02}{:02}", sign, minutes / 60, minutes % 60)
}

impl<W: Write> Export<'_, W> {
    /// Emit one commit record, preceded by any blobs it is first to use.
    pub(crate) fn emit_commit(&mut self, planned: PlannedCommit) -> anyhow::Result<()> {
        let commit_id = planned.commit;
        let parent = self.dag.commit(commit_id).parent;

        let links = match parent {
            Some(p) => ParentLinks::compute(self.dag, self.atoms, commit_id, p),
            None => ParentLinks::empty(),
        };
        let ops = fileops::build(
            self.dag,
            self.atoms,
            &mut self.path_cache,
            commit_id,
            parent,
            &links,
        );

        // blobs this commit is first to reference
        if self.mode == Mode::Canonical {
            for op in &ops {
                if let FileOp::Modify { rev, .. } = op {
                    let serial = self.dag.rev(*rev).serial;
                    if !self.is_emitted(serial) {
                        self.emit_stored_blob(serial)?;
                    }
                }
            }
        }

        // commit header and mark
        let serial = self.marks.next_serial()?;
        self.dag.commit_mut(commit_id).serial = serial;
        let mark = self.marks.next_mark()?;
        self.marks.bind(serial, mark);
        let branch = self.dag.heads[planned.head].name.clone();
        write!(
            self.out,
            "commit {}{}\nmark :{}\n",
            self.opts.branch_prefix, branch, mark
        )?;

        // committer identity and timestamp
        let commit = self.dag.commit(commit_id);
        let entry = self.authors.resolve(self.atoms.name(commit.author));
        let timestamp = if self.opts.force_dates {
            mark.as_u32() as i64 * self.dag.time_window * 2
        } else {
            RCS_EPOCH + commit.date
        };
        writeln!(
            self.out,
            "committer {} {} {}",
            entry.display_name(),
            timestamp,
            format_offset(entry.offset())
        )?;

        // log payload, with the revision-pair block folded in if asked
        let commit = self.dag.commit(commit_id);
        let mut payload = commit.log.clone();
        let revpairs = self.revision_pairs(&ops);
        if self.opts.embed_ids {
            if !payload.ends_with('\n') {
                payload.push('\n');
            }
            payload.push('\n');
            for line in revpairs.lines() {
                payload.push_str("CVS-ID: ");
                payload.push_str(line);
                payload.push('\n');
            }
        }
        write!(self.out, "data {}\n{}\n", payload.len(), payload)?;

        // parent link
        if let Some(parent) = parent {
            let parent_serial = self.dag.commit(parent).serial;
            match self.marks.mark_of(parent_serial) {
                Some(parent_mark) => writeln!(self.out, "from :{}", parent_mark)?,
                // the parent was suppressed by the incremental cutoff:
                // anchor onto the recipient's existing branch tip
                None if self.opts.fromtime.is_some() => writeln!(
                    self.out,
                    "from {}{}^0",
                    self.opts.branch_prefix, branch
                )?,
                None => {}
            }
        }

        // fileops in comparator order
        for op in &ops {
            match op {
                FileOp::Modify { mode, rev, path } => {
                    let blob_serial = self.dag.rev(*rev).serial;
                    let blob_mark = self
                        .marks
                        .mark_of(blob_serial)
                        .context("Modify operation references an unemitted blob")?;
                    writeln!(
                        self.out,
                        "M {:o} :{} {}",
                        mode,
                        blob_mark,
                        self.atoms.name(*path)
                    )?;
                }
                FileOp::Delete { path } => {
                    writeln!(self.out, "D {}", self.atoms.name(*path))?;
                }
            }
        }

        // annotated revision map, one line per file reference
        if let Some(sink) = self.opts.revision_map.as_mut() {
            for line in revpairs.lines() {
                writeln!(sink, "{} :{}", line, mark)?;
            }
        }

        if self.opts.reposurgeon && !revpairs.is_empty() {
            write!(
                self.out,
                "property cvs-revision {} {}",
                revpairs.len(),
                revpairs
            )?;
        }

        self.out.write_all(b"\n")?;

        if self.stats.commits == 0 && !ops.iter().any(|op| op.path() == self.gitignore) {
            write!(
                self.out,
                "M 100644 inline .gitignore\ndata {}\n{}\n",
                CVS_IGNORES.len(),
                CVS_IGNORES
            )?;
        }

        self.stats.commits += 1;
        Ok(())
    }

    /// `<path> <rev>` lines for every Modify op, in fileop order.
    fn revision_pairs(&self, ops: &[FileOp]) -> String {
        if !(self.opts.embed_ids || self.opts.reposurgeon || self.opts.revision_map.is_some()) {
            return String::new();
        }
        let mut pairs = String::new();
        for op in ops {
            if let FileOp::Modify { rev, path, .. } = op {
                let revision = self.dag.rev(*rev);
                pairs.push_str(self.atoms.name(*path));
                pairs.push(' ');
                pairs.push_str(&revision.number.to_string());
                pairs.push('\n');
            }
        }
        pairs
    }

    /// Stream one spilled blob out of the store, mark-first.
    fn emit_stored_blob(&mut self, serial: Serial) -> anyhow::Result<()> {
        let mark = self.marks.next_mark()?;
        self.marks.bind(serial, mark);
        write!(self.out, "blob\nmark :{}\n", mark)?;

        let store = self
            .store
            .as_ref()
            .context("Blob store missing in canonical mode")?;
        let (len, reader) = store.read_and_unlink(serial)?;
        write!(self.out, "data {}\n", len)?;
        let mut limited = reader.take(len);
        let copied = std::io::copy(&mut limited, &mut self.out)
            .context("Unable to stream blob payload")?;
        anyhow::ensure!(
            copied == len,
            "Blob entry for serial {} is truncated: expected {} bytes, copied {}",
            serial.as_u32(),
            len,
            copied
        );
        self.out.write_all(b"\n")?;

        self.set_emitted(serial);
        self.stats.blobs += 1;
        Ok(())
    }

    /// Tag resets for every tag whose target made it into the stream.
    pub(crate) fn emit_tags(&mut self) -> anyhow::Result<()> {
        for tag in &self.dag.tags {
            let serial = self.dag.commit(tag.commit).serial;
            let Some(mark) = self.marks.mark_of(serial) else {
                continue;
            };
            if let Some(cutoff) = self.opts.fromtime
                && tag.date <= cutoff
            {
                continue;
            }
            write!(self.out, "reset refs/tags/{}\nfrom :{}\n\n", tag.name, mark)?;
        }
        Ok(())
    }

    /// Final branch-tip resets, head by head.
    pub(crate) fn emit_branch_resets(&mut self) -> anyhow::Result<()> {
        for head in &self.dag.heads {
            let Some(commit) = head.head else {
                continue;
            };
            let serial = self.dag.commit(commit).serial;
            let Some(mark) = self.marks.mark_of(serial) else {
                continue;
            };
            write!(
                self.out,
                "reset {}{}\nfrom :{}\n\n",
                self.opts.branch_prefix, head.name, mark
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_format_like_percent_z() {
        let east = FixedOffset::east_opt(2 * 3600 + 30 * 60).unwrap();
        let west = FixedOffset::west_opt(5 * 3600).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();

        assert_eq!(format_offset(east), "+0230");
        assert_eq!(format_offset(west), "-0500");
        assert_eq!(format_offset(utc), "+0000");
    }

    #[test]
    fn blob_records_frame_prefix_and_payload_together() {
        let mut table = crate::areas::mark_table::MarkTable::new();
        let mark = table.next_mark().unwrap();
        let mut out = Vec::new();

        write_blob(&mut out, mark, Some(b"# pre\n"), b"body\n").unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "blob\nmark :1\ndata 11\n# pre\nbody\n\n"
        );
    }

    #[test]
    fn cvs_ignore_boilerplate_is_line_terminated() {
        assert!(CVS_IGNORES.ends_with("# CVS default ignores end\n"));
        assert!(CVS_IGNORES.starts_with("# CVS default ignores begin\n"));
    }
}
