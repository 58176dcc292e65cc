//! Identity and deduplication tables, cleared between encodes.
//!
//! Two table shapes serve the walker:
//!
//! - [`PtrTable`]: keyed by the *memory identity* of a shared handle, maps
//!   to the body offset where that value was fully emitted. Three instances
//!   exist per encoder (strong-seen, weak-seen, string-identity-seen).
//! - [`StringTable`]: keyed by string *content* (bytes plus UTF-8 flag),
//!   maps to the offset of the first emission of identical content. Backs
//!   COPY/ALIAS dedup and shared hash keys.
//!
//! Every recorded offset points at the first byte of a complete,
//! independently-decodable item; the walker records offsets before
//! descending so in-progress cycles backreference correctly.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use twox_hash::XxHash64;

type XxBuild = BuildHasherDefault<XxHash64>;

/// Pointer-identity table: opaque handle identity to emitted body offset.
#[derive(Debug, Default)]
pub struct PtrTable {
    entries: HashMap<usize, u64, XxBuild>,
}

impl PtrTable {
    /// Records that the value with this identity was emitted at `offset`.
    pub fn mark_seen(&mut self, identity: usize, offset: u64) {
        self.entries.insert(identity, offset);
    }

    /// Prior emission point for this identity during the current encode.
    pub fn lookup(&self, identity: usize) -> Option<u64> {
        self.entries.get(&identity).copied()
    }

    /// Forgets an identity, if present.
    pub fn remove(&mut self, identity: usize) {
        self.entries.remove(&identity);
    }

    /// Empties the table, keeping its backing storage.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of tracked identities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Content-keyed string table for COPY/ALIAS deduplication.
///
/// The key hashes the raw bytes (xxhash) with full-content comparison on
/// collision, which the `HashMap` contract provides. The UTF-8 flag is part
/// of the key: a byte string and a text string with identical bytes are
/// distinct wire items and must not alias each other.
#[derive(Debug, Default)]
pub struct StringTable {
    // One map per UTF-8 flag; lets lookups borrow `&[u8]` without cloning.
    binary: HashMap<Vec<u8>, u64, XxBuild>,
    text: HashMap<Vec<u8>, u64, XxBuild>,
}

impl StringTable {
    fn side(&self, utf8: bool) -> &HashMap<Vec<u8>, u64, XxBuild> {
        if utf8 { &self.text } else { &self.binary }
    }

    fn side_mut(&mut self, utf8: bool) -> &mut HashMap<Vec<u8>, u64, XxBuild> {
        if utf8 { &mut self.text } else { &mut self.binary }
    }

    /// Prior emission offset for identical content, if any.
    pub fn lookup(&self, bytes: &[u8], utf8: bool) -> Option<u64> {
        self.side(utf8).get(bytes).copied()
    }

    /// Records the first emission of this content at `offset`.
    ///
    /// Keeps the earliest offset on repeat insertion; backreferences must
    /// always point at the first occurrence.
    pub fn record(&mut self, bytes: &[u8], utf8: bool, offset: u64) {
        self.side_mut(utf8)
            .entry(bytes.to_vec())
            .or_insert(offset);
    }

    /// Empties the table, keeping its backing storage.
    pub fn clear(&mut self) {
        self.binary.clear();
        self.text.clear();
    }

    /// Number of distinct strings recorded.
    pub fn len(&self) -> usize {
        self.binary.len() + self.text.len()
    }

    /// True if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.binary.is_empty() && self.text.is_empty()
    }
}
