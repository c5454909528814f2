//! Serial and mark bookkeeping
//!
//! Two integer namespaces drive the export:
//!
//! - **Serials** are internal handles, assigned in generation order to every
//!   file revision and (at emission time) to every commit.
//! - **Marks** are the external handles that appear in the output stream
//!   (`mark :N`), assigned in emission order.
//!
//! The table maps serials to marks so that a record emitted earlier can be
//! referred back to (`from :N`, `M 100644 :N path`). A mark may only be
//! referenced after it has been defined in the stream; the emitter enforces
//! that by binding marks strictly at definition time.

use anyhow::Context;

/// Internal dense identifier for a file revision or commit.
///
/// Serial 0 is reserved and means "not assigned yet".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Serial(u32);

impl Serial {
    /// The reserved "unassigned" serial.
    pub const NONE: Serial = Serial(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

#[cfg(test)]
impl Serial {
    /// Build a raw serial for store and table tests.
    pub(crate) fn from_test_value(value: u32) -> Serial {
        Serial(value)
    }
}

/// External dense identifier appearing in the output stream as `:N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mark(u32);

impl Mark {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Mark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counters and the serial-to-mark map for one export run.
///
/// Serials and marks both start at 1 and increase monotonically. Exhausting
/// the serial space is a fatal error; the export cannot continue once the
/// configured width overflows.
#[derive(Debug, Default)]
pub struct MarkTable {
    last_serial: u32,
    last_mark: u32,
    /// Mark bound to each serial, indexed by serial value; 0 means unbound.
    /// Slot 0 is the reserved serial and stays unbound forever.
    marks: Vec<u32>,
}

impl MarkTable {
    pub fn new() -> Self {
        MarkTable::default()
    }

    /// Hand out the next serial.
    pub fn next_serial(&mut self) -> anyhow::Result<Serial> {
        self.last_serial = self
            .last_serial
            .checked_add(1)
            .context("Serial space exhausted: too many revisions for the configured width")?;
        Ok(Serial(self.last_serial))
    }

    /// Hand out the next mark.
    pub fn next_mark(&mut self) -> anyhow::Result<Mark> {
        self.last_mark = self
            .last_mark
            .checked_add(1)
            .context("Mark space exhausted: too many records for the configured width")?;
        Ok(Mark(self.last_mark))
    }

    /// Bind a serial to a mark.
    ///
    /// Rebinding an already-bound serial overwrites silently; the canonical
    /// path numbers a revision at generation time and mark-numbers it again
    /// at emission time.
    pub fn bind(&mut self, serial: Serial, mark: Mark) {
        let slot = serial.0 as usize;
        if slot >= self.marks.len() {
            self.marks.resize(slot + 1, 0);
        }
        self.marks[slot] = mark.0;
    }

    /// Look up the mark bound to a serial, if any.
    pub fn mark_of(&self, serial: Serial) -> Option<Mark> {
        if serial.is_none() {
            return None;
        }
        match self.marks.get(serial.0 as usize) {
            Some(&m) if m != 0 => Some(Mark(m)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serials_and_marks_start_at_one() {
        let mut table = MarkTable::new();

        assert_eq!(table.next_serial().unwrap().as_u32(), 1);
        assert_eq!(table.next_serial().unwrap().as_u32(), 2);
        assert_eq!(table.next_mark().unwrap().as_u32(), 1);
        assert_eq!(table.next_mark().unwrap().as_u32(), 2);
    }

    #[test]
    fn bind_then_lookup() {
        let mut table = MarkTable::new();
        let serial = table.next_serial().unwrap();
        let mark = table.next_mark().unwrap();

        assert_eq!(table.mark_of(serial), None);
        table.bind(serial, mark);
        assert_eq!(table.mark_of(serial), Some(mark));
    }

    #[test]
    fn rebinding_overwrites_silently() {
        let mut table = MarkTable::new();
        let serial = table.next_serial().unwrap();
        let first = table.next_mark().unwrap();
        let second = table.next_mark().unwrap();

        table.bind(serial, first);
        table.bind(serial, second);
        assert_eq!(table.mark_of(serial), Some(second));
    }

    #[test]
    fn reserved_serial_is_never_bound() {
        let table = MarkTable::new();

        assert_eq!(table.mark_of(Serial::NONE), None);
    }

    #[test]
    fn serial_overflow_is_fatal() {
        let mut table = MarkTable {
            last_serial: u32::MAX,
            ..MarkTable::default()
        };

        let err = table.next_serial().unwrap_err();
        assert!(err.to_string().contains("Serial space exhausted"));
    }
}
