//! On-disk spill area for blob content
//!
//! Canonical mode decouples blob generation order from blob emission order:
//! content is generated master by master, but emitted interleaved with the
//! commits that first reference it. The store parks each payload on local
//! disk under a serial-derived path, to be read back exactly once and
//! unlinked.
//!
//! ## Storage Format
//!
//! - Root: `<TMPDIR or /tmp>/cvs-fast-export-XXXXXX/`
//! - Path: radix-256 digits of the serial, most significant first; every
//!   digit is a nested `%x` directory except the last, which becomes the
//!   leaf name `=%x`
//! - Content: an 8-byte big-endian payload length followed by the payload,
//!   the whole entry transparently zlib-compressed when the store is built
//!   with compression on
//!
//! Fast mode never creates the store; blobs go straight to the output.

use crate::areas::mark_table::Serial;
use anyhow::Context;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Directory splay width. 256 keeps per-directory child counts small enough
/// that filesystem lookups stay cheap on large repositories.
const FANOUT: u32 = 256;

fn write_entry(writer: &mut impl Write, prefix: Option<&[u8]>, payload: &[u8]) -> io::Result<()> {
    let len = prefix.map_or(0, <[u8]>::len) + payload.len();
    writer.write_u64::<byteorder::NetworkEndian>(len as u64)?;
    if let Some(prefix) = prefix {
        writer.write_all(prefix)?;
    }
    writer.write_all(payload)
}

/// Content spill area rooted in a fresh temporary directory.
///
/// The store exists for one export run. [`BlobStore::destroy`] removes the
/// root on the normal exit path; on abnormal termination the root is leaked
/// and must be cleaned up by the operator.
#[derive(Debug)]
pub struct BlobStore {
    root: PathBuf,
    compress: bool,
}

impl BlobStore {
    /// Create the temporary root under `TMPDIR` (or `/tmp`).
    pub fn create(compress: bool) -> anyhow::Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("cvs-fast-export-")
            .tempdir()
            .context("Unable to create blob store temporary directory")?
            .keep();

        Ok(BlobStore { root, compress })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compute the fan-out path for a serial.
    fn entry_path(&self, serial: Serial) -> PathBuf {
        let mut digits = Vec::new();
        let mut rest = serial.as_u32();
        loop {
            digits.push(rest % FANOUT);
            rest /= FANOUT;
            if rest == 0 {
                break;
            }
        }
        digits.reverse();

        let mut path = self.root.clone();
        let leaf = digits.pop().expect("serial has at least one digit");
        for digit in digits {
            path.push(format!("{:x}", digit));
        }
        path.push(format!("={:x}", leaf));
        path
    }

    /// Park one payload under the serial's fan-out path.
    ///
    /// `prefix`, when present, is concatenated before the payload so that
    /// the stored length covers both; the caller passes the CVS-ignore
    /// boilerplate here for `.cvsignore` masters.
    pub fn write(
        &self,
        serial: Serial,
        prefix: Option<&[u8]>,
        payload: &[u8],
    ) -> anyhow::Result<()> {
        let path = self.entry_path(serial);
        // best-effort: the parent may already exist from a sibling serial
        std::fs::create_dir_all(path.parent().context("Blob entry path has no parent")?)
            .with_context(|| format!("Unable to create blob directory for {}", path.display()))?;

        let file = File::create(&path)
            .with_context(|| format!("Unable to create blob file {}", path.display()))?;
        let result = if self.compress {
            let mut writer =
                flate2::write::ZlibEncoder::new(file, flate2::Compression::default());
            write_entry(&mut writer, prefix, payload).and_then(|_| writer.finish().map(|_| ()))
        } else {
            let mut writer = BufWriter::new(file);
            write_entry(&mut writer, prefix, payload).and_then(|_| writer.flush())
        };
        result.with_context(|| format!("Unable to write blob file {}", path.display()))
    }

    /// Open a stored entry, unlink it, and return its payload stream.
    ///
    /// The entry is removed from the filesystem immediately; the returned
    /// reader keeps the open handle alive, so the payload can still be
    /// copied out through bounded memory.
    ///
    /// # Returns
    ///
    /// The payload length and a reader positioned at the payload's first
    /// byte.
    pub fn read_and_unlink(&self, serial: Serial) -> anyhow::Result<(u64, Box<dyn Read>)> {
        let path = self.entry_path(serial);
        let file = File::open(&path)
            .with_context(|| format!("Unable to open blob file {}", path.display()))?;

        if let Err(err) = std::fs::remove_file(&path) {
            log::warn!("failed to unlink blob file {}: {}", path.display(), err);
        }

        let mut reader: Box<dyn Read> = if self.compress {
            Box::new(flate2::read::ZlibDecoder::new(file))
        } else {
            Box::new(BufReader::new(file))
        };
        let len = reader
            .read_u64::<byteorder::NetworkEndian>()
            .with_context(|| format!("Blob file {} is truncated", path.display()))?;

        Ok((len, reader))
    }

    /// Recursively remove the temporary root.
    ///
    /// Cleanup failures are reported but never alter the outcome of the
    /// export; the stream has already been written by the time this runs.
    pub fn destroy(self) {
        for entry in walkdir::WalkDir::new(&self.root).contents_first(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("blob store cleanup walk failed: {}", err);
                    continue;
                }
            };
            let result = if entry.file_type().is_dir() {
                std::fs::remove_dir(entry.path())
            } else {
                std::fs::remove_file(entry.path())
            };
            if let Err(err) = result {
                log::warn!("failed to remove {}: {}", entry.path().display(), err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use predicates::prelude::*;

    fn read_payload(store: &BlobStore, serial: Serial) -> Vec<u8> {
        let (len, mut reader) = store.read_and_unlink(serial).unwrap();
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload).unwrap();
        assert_eq!(payload.len() as u64, len);
        payload
    }

    #[test]
    fn write_then_read_round_trips_payload() {
        let store = BlobStore::create(false).unwrap();
        let serial = Serial::from_test_value(7);

        store.write(serial, None, b"hello\n").unwrap();
        assert_eq!(read_payload(&store, serial), b"hello\n");
        store.destroy();
    }

    #[test]
    fn compressed_entries_are_transparent() {
        let store = BlobStore::create(true).unwrap();
        let serial = Serial::from_test_value(300);
        let payload = b"squeeze me".repeat(100);

        store.write(serial, None, &payload).unwrap();
        assert_eq!(read_payload(&store, serial), payload);
        store.destroy();
    }

    #[test]
    fn prefix_is_counted_into_the_stored_length() {
        let store = BlobStore::create(false).unwrap();
        let serial = Serial::from_test_value(1);

        store.write(serial, Some(b"# head\n"), b"tail\n").unwrap();
        assert_eq!(read_payload(&store, serial), b"# head\ntail\n");
        store.destroy();
    }

    #[test]
    fn fan_out_splits_serials_into_nested_directories() {
        let store = BlobStore::create(false).unwrap();
        // 0x1_02_03 needs two directory levels below the root
        let serial = Serial::from_test_value(0x10203);

        store.write(serial, None, b"x").unwrap();
        let expected = store.root().join("1").join("2").join("=3");
        assert!(predicate::path::is_file().eval(&expected));
        store.destroy();
    }

    #[test]
    fn read_unlinks_the_entry() {
        let store = BlobStore::create(false).unwrap();
        let serial = Serial::from_test_value(9);

        store.write(serial, None, b"once").unwrap();
        read_payload(&store, serial);
        assert!(store.read_and_unlink(serial).is_err());
        store.destroy();
    }

    #[test]
    fn destroy_removes_the_root() {
        let store = BlobStore::create(false).unwrap();
        store.write(Serial::from_test_value(42), None, b"gone").unwrap();

        let root = store.root().to_path_buf();
        store.destroy();
        assert!(!root.exists());
    }
}
