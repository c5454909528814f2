//! String interning and Bloom fingerprints
//!
//! Master names, author keys, and derived output paths are interned so that
//! equality checks collapse to integer comparison and every copy of a name
//! shares one allocation. Interning order doubles as a total order on
//! names: any two commits' file sequences are sorted by it, which is what
//! lets the parent matcher walk both sequences with a single cursor.
//!
//! Each interned name also gets a 256-bit Bloom fingerprint. A commit's
//! filter is the union of its revisions' fingerprints; a failed subset test
//! against it proves a name is absent without touching the revision list.

use std::collections::HashMap;

/// Number of probe bits set per name.
const BLOOM_PROBES: u64 = 3;

/// Canonical handle for an interned string.
///
/// Two atoms compare equal exactly when the underlying strings are equal.
/// Ordering follows interning order, which is consistent across the whole
/// run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(u32);

impl Atom {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Fixed-width bit vector summarizing a set of interned names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bloom([u64; 4]);

impl Bloom {
    pub const ZERO: Bloom = Bloom([0; 4]);

    /// Fingerprint of a single name.
    pub fn of_name(name: &str) -> Bloom {
        let mut bloom = Bloom::ZERO;
        for salt in 0..BLOOM_PROBES {
            let bit = fnv1a(name, salt.wrapping_mul(0x9e37_79b9_7f4a_7c15)) % 256;
            bloom.0[(bit / 64) as usize] |= 1 << (bit % 64);
        }
        bloom
    }

    pub fn union(&self, other: &Bloom) -> Bloom {
        let mut out = *self;
        for (slot, word) in out.0.iter_mut().zip(other.0.iter()) {
            *slot |= word;
        }
        out
    }

    /// Whether every bit of `other` is set in `self`.
    ///
    /// A `false` result is a proof of absence; `true` only means "possibly
    /// present" and must be confirmed against the actual revision list.
    pub fn covers(&self, other: &Bloom) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(mine, theirs)| mine & theirs == *theirs)
    }
}

fn fnv1a(name: &str, salt: u64) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64 ^ salt;
    for byte in name.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Interning table for the whole run.
#[derive(Debug, Default)]
pub struct AtomTable {
    names: Vec<String>,
    blooms: Vec<Bloom>,
    index: HashMap<String, u32>,
}

impl AtomTable {
    pub fn new() -> Self {
        AtomTable::default()
    }

    /// Return the canonical atom for a string, interning it on first sight.
    pub fn intern(&mut self, name: &str) -> Atom {
        if let Some(&id) = self.index.get(name) {
            return Atom(id);
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_string());
        self.blooms.push(Bloom::of_name(name));
        self.index.insert(name.to_string(), id);
        Atom(id)
    }

    pub fn name(&self, atom: Atom) -> &str {
        &self.names[atom.index()]
    }

    /// Cached fingerprint of an interned name.
    pub fn bloom(&self, atom: Atom) -> Bloom {
        self.blooms[atom.index()]
    }
}
