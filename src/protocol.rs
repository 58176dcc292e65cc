//! Wire-format constants: magic bytes, the tag table, and descriptor packing.
//!
//! A document looks like this:
//!
//! ```text
//! [ Magic (4) ] [ VersionByte (1) ] [ HeaderSuffix ] [ Body ]
//! ```
//!
//! The version byte packs two fields:
//!
//! ```text
//! +----------+
//! | EEEE VVVV |
//! +----------+
//! VVVV = protocol version (2..=4)
//! EEEE = body encoding: 0 none, 1 snappy, 2 snappy incremental, 3 zlib
//! ```
//!
//! The header suffix is a varint length followed by that many bytes. Length 0
//! means "no user header". Otherwise the first suffix byte is a flags byte
//! (bit 0 set = user header present) and the rest is the user-header
//! document, encoded with its own identity/dedup tables and its own offset
//! space.
//!
//! Body offsets carried by backreference tags (REFP, ALIAS, COPY, OBJECTV)
//! are 1-based and relative to the first body byte, so they survive the
//! in-place compression rewrite of the body. REFP and ALIAS targets have the
//! track bit (0x80) patched onto their tag byte; COPY and OBJECTV targets are
//! simply re-read by a decoder and carry no track bit.
//!
//! Compressed bodies are framed as `varint(uncompressed_len)`
//! `varint(compressed_len)` followed by the compressed payload; incremental
//! snappy repeats that frame for every input chunk.

/// Magic marker for protocol version 2 documents.
pub const MAGIC_V2: [u8; 4] = *b"=srl";

/// Magic marker for protocol version 3+ documents.
///
/// The high-bit variant of `s` makes a UTF-8 round-trip corruption of the
/// packet detectable from the first four bytes.
pub const MAGIC_V3: [u8; 4] = [0x3D, 0xF3, 0x72, 0x6C];

/// Lowest supported protocol version.
pub const PROTOCOL_VERSION_MIN: u8 = 2;
/// Highest supported protocol version.
pub const PROTOCOL_VERSION_MAX: u8 = 4;
/// Protocol version emitted when the caller does not choose one.
pub const PROTOCOL_VERSION_DEFAULT: u8 = 3;

/// Returns the magic marker for a protocol version.
pub fn magic_for_version(version: u8) -> [u8; 4] {
    if version >= 3 { MAGIC_V3 } else { MAGIC_V2 }
}

// --- VERSION BYTE PACKING ---

/// Body encoding identifiers stored in the high nibble of the version byte.
pub mod encoding {
    /// Uncompressed body.
    pub const NONE: u8 = 0;
    /// Whole-body snappy, one frame.
    pub const SNAPPY: u8 = 1;
    /// Chunked snappy, one frame per bounded input chunk.
    pub const SNAPPY_INCREMENTAL: u8 = 2;
    /// Whole-body zlib at the configured level.
    pub const ZLIB: u8 = 3;
}

/// Packs protocol version and body encoding into the descriptor byte.
pub fn pack_version_byte(protocol_version: u8, encoding_id: u8) -> u8 {
    (encoding_id << 4) | (protocol_version & 0x0F)
}

// --- TAG TABLE ---
//
// One byte per value, with the payload following inline. Tags 0x00..=0x7F
// leave the high bit free for TRACK_FLAG.

/// High bit of a tag byte: this offset is the target of a REFP or ALIAS.
pub const TRACK_FLAG: u8 = 0x80;

/// Small positive integer `n` in `0..=15` encodes as the tag byte `POS_0 + n`.
pub const POS_0: u8 = 0x00;
/// Small negative integer `n` in `-16..=-1` encodes as `0x20 + n`.
pub const NEG_16: u8 = 0x10;

/// Unsigned LEB128 varint follows.
pub const VARINT: u8 = 0x20;
/// Zigzag-encoded varint follows (negative integers below -16).
pub const ZIGZAG: u8 = 0x21;
/// IEEE-754 single float, 4 bytes little endian.
pub const FLOAT: u8 = 0x22;
/// IEEE-754 double float, 8 bytes little endian.
pub const DOUBLE: u8 = 0x23;
/// An ordinary undefined value.
pub const UNDEF: u8 = 0x25;
/// Byte string: varint length + raw bytes.
pub const BINARY: u8 = 0x26;
/// Text string: varint length + UTF-8 bytes.
pub const STR_UTF8: u8 = 0x27;
/// Strong reference to the next item.
pub const REFN: u8 = 0x28;
/// Strong backreference: varint body offset of a previously emitted item.
pub const REFP: u8 = 0x29;
/// Map: varint pair count, then key/value items.
pub const HASH: u8 = 0x2A;
/// Array: varint element count, then element items.
pub const ARRAY: u8 = 0x2B;
/// Blessed value: class-name string item, then the underlying item.
pub const OBJECT: u8 = 0x2C;
/// Blessed value with backreferenced class name: varint offset, then item.
pub const OBJECTV: u8 = 0x2D;
/// Alias backreference: varint body offset; decoded result shares storage.
pub const ALIAS: u8 = 0x2E;
/// String copy backreference: varint body offset of identical content.
pub const COPY: u8 = 0x2F;
/// Weak-reference wrapper around the next item.
pub const WEAKEN: u8 = 0x30;
/// Frozen blessed value: class-name string item, then the hook's payload.
pub const OBJECT_FREEZE: u8 = 0x32;
/// Frozen blessed value with backreferenced class name.
pub const OBJECTV_FREEZE: u8 = 0x33;
/// The canonical undefined value. `WEAKEN CANONICAL_UNDEF` is the dedicated
/// dangling-weak-reference marker, distinct from a user-supplied `UNDEF`.
pub const CANONICAL_UNDEF: u8 = 0x39;
/// Boolean false.
pub const FALSE: u8 = 0x3A;
/// Boolean true.
pub const TRUE: u8 = 0x3B;
/// No-op padding byte.
pub const PAD: u8 = 0x3F;

/// Array of `n < 16` elements behind an unshared reference: `ARRAYREF_0 + n`,
/// then the elements. Suppressed by `canonical_refs`.
pub const ARRAYREF_0: u8 = 0x40;
/// Map of `n < 16` pairs behind an unshared reference: `HASHREF_0 + n`.
pub const HASHREF_0: u8 = 0x50;
/// Byte string of `n < 32` bytes: `SHORT_BINARY_0 + n`, then the bytes.
pub const SHORT_BINARY_0: u8 = 0x60;

/// Longest byte string that fits a SHORT_BINARY tag.
pub const SHORT_BINARY_MAX_LEN: usize = 31;
/// Largest element count that fits an ARRAYREF/HASHREF tag.
pub const SMALL_CONTAINER_MAX_LEN: usize = 15;

/// Strings at or below this length are never deduplicated; a COPY tag plus
/// offset varint is at least as large as the inline form.
pub const DEDUP_MIN_STRING_LEN: usize = 4;

// --- INTEGER HELPERS ---

/// Zigzag-maps a signed integer onto an unsigned one for varint encoding.
pub fn zigzag(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Inverse of [`zigzag`].
pub fn unzigzag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}
