//! The encoder core: framing writer, value walker, compression driver.
//!
//! One [`Encoder`] owns one run's mutable state (buffers, identity tables,
//! depth counter, dirty flag) plus an immutable [`EncoderConfig`]. A single
//! `encode` call runs to completion synchronously; instances are fully
//! independent, so concurrent callers clone a prototype and keep per-call
//! state isolated.
//!
//! The walk is a plain depth-first recursion. Aggregates consult the
//! identity tables before descending and register their emission offset
//! *before* walking children, so a cycle discovered mid-traversal
//! backreferences the in-progress item. Failure leaves partially written
//! bytes in the buffer (the caller discards them); depth bookkeeping unwinds
//! to zero on every exit path.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use twox_hash::XxHash64;

use crate::buffer::OutputBuffer;
use crate::compress::compressor_for;
use crate::config::{DedupeStrings, EncoderConfig, OnUnsupported};
use crate::error::{EncoderError, Result};
use crate::protocol as p;
use crate::tables::{PtrTable, StringTable};
use crate::value::{identity_of, is_shared, FreezeResult, MapKey, Value, ValueRc, ValueWeak};

/// Byte position of the version/encoding descriptor within a document.
const VERSION_BYTE_POS: u64 = 4;

/// Why a string is being emitted; decides its dedup treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringRole {
    /// Map key: copy-dedup under `shared_hashkeys`, never aliased.
    Key,
    /// Class name: copy-dedup under `shared_hashkeys`, never aliased.
    ClassName,
    /// Anything else: follows `dedupe_strings`.
    General,
}

/// A binary serialization encoder for one value graph at a time.
///
/// See the crate docs for the wire format and an end-to-end example.
pub struct Encoder {
    config: EncoderConfig,
    buf: OutputBuffer,
    scratch: OutputBuffer,
    recursion_depth: usize,
    /// Strong aggregate identity -> body offset of the full emission.
    ref_seen: PtrTable,
    /// Targets whose first emission was under a WEAKEN wrapper and which no
    /// strong reference has since covered; non-empty at the end of a walk
    /// means the decoded target dangles, which is warned about.
    weak_seen: PtrTable,
    /// String handle identity -> body offset; pointer-equality shortcut
    /// consulted before content hashing.
    str_ident_seen: PtrTable,
    /// String content -> body offset, for COPY/ALIAS dedup.
    str_dedup: StringTable,
    /// Freeze results cached per object identity; `None` caches the
    /// use-structural sentinel.
    frozen: HashMap<usize, Option<ValueRc>, BuildHasherDefault<XxHash64>>,
    /// First body byte position; backreference offsets are relative to it.
    body_base: u64,
    /// Set while an encode is in progress or its output is still owned by a
    /// non-reusable instance.
    dirty: bool,
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("config", &self.config)
            .field("buffered", &self.buf.len())
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl Encoder {
    /// Creates an encoder from an explicit option set.
    pub fn new(config: EncoderConfig) -> Self {
        let capacity = config.initial_buffer_capacity;
        Self {
            config,
            buf: OutputBuffer::with_capacity(capacity),
            scratch: OutputBuffer::default(),
            recursion_depth: 0,
            ref_seen: PtrTable::default(),
            weak_seen: PtrTable::default(),
            str_ident_seen: PtrTable::default(),
            str_dedup: StringTable::default(),
            frozen: HashMap::default(),
            body_base: 0,
            dirty: false,
        }
    }

    /// Creates an encoder with identical configuration and fresh state.
    ///
    /// The prototype pattern: concurrent callers share one configuration
    /// cheaply while every instance owns its buffers and tables.
    pub fn from_prototype(&self) -> Self {
        Self::new(self.config.clone())
    }

    /// The immutable option set this encoder runs with.
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Resets all run state to empty, keeping configuration and backing
    /// allocations. Required between encodes on a non-reusable instance.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.reset_run_state();
    }

    fn reset_run_state(&mut self) {
        self.scratch.clear();
        self.recursion_depth = 0;
        self.ref_seen.clear();
        self.weak_seen.clear();
        self.str_ident_seen.clear();
        self.str_dedup.clear();
        self.frozen.clear();
        self.body_base = 0;
        self.dirty = false;
    }

    /// Encodes one top-level value (plus an optional user header) into a
    /// complete framed document, returning the bytes.
    ///
    /// The returned slice borrows the internal buffer; it stays valid until
    /// the next call on this instance. With `reuse_instance` the state
    /// resets itself afterwards; otherwise a second `encode` without
    /// [`clear`](Self::clear) is an error.
    pub fn encode(
        &mut self,
        value: &ValueRc,
        user_header: Option<&ValueRc>,
    ) -> Result<&[u8]> {
        if self.dirty {
            return Err(EncoderError::Internal(
                "encoder instance is dirty; call clear() or enable reuse_instance".into(),
            ));
        }
        self.dirty = true;
        self.buf.clear();

        let result = self.encode_document(value, user_header);

        if self.config.reuse_instance {
            // Auto-reset; the output buffer itself is cleared lazily at the
            // start of the next encode so the returned slice stays valid.
            let keep = std::mem::take(&mut self.buf);
            self.reset_run_state();
            self.buf = keep;
        }

        result.map(|()| self.buf.as_slice())
    }

    /// Like [`encode`](Self::encode), returning an owned byte vector.
    pub fn encode_to_vec(
        &mut self,
        value: &ValueRc,
        user_header: Option<&ValueRc>,
    ) -> Result<Vec<u8>> {
        self.encode(value, user_header).map(<[u8]>::to_vec)
    }

    // --- FRAMING ---

    fn encode_document(
        &mut self,
        value: &ValueRc,
        user_header: Option<&ValueRc>,
    ) -> Result<()> {
        let version = self.config.protocol_version;
        self.buf.push_bytes(&p::magic_for_version(version))?;
        // Speculatively "no compression"; patched after post-processing.
        self.buf
            .push_byte(p::pack_version_byte(version, p::encoding::NONE))?;

        match user_header {
            None => self.buf.push_varint(0)?,
            Some(header) => {
                // A fresh sub-encode: independent tables, own offset space.
                let header_doc = self.encode_header_document(header)?;
                self.buf.push_varint(1 + header_doc.len() as u64)?;
                self.buf.push_byte(0x01)?;
                self.buf.push_bytes(header_doc.as_slice())?;
            }
        }

        let body_start = self.buf.position();
        self.body_base = body_start;
        self.dump_value(value)?;

        if !self.weak_seen.is_empty() {
            // Such a target decodes with only weak owners and is freed as
            // soon as decoding finishes.
            log::warn!(
                "{} weak reference target(s) have no strong reference in the document",
                self.weak_seen.len()
            );
        }

        self.compress_body(body_start)
    }

    fn encode_header_document(&self, value: &ValueRc) -> Result<OutputBuffer> {
        let mut sub = self.from_prototype();
        sub.dirty = true;
        sub.body_base = 0;
        sub.dump_value(value)?;
        Ok(sub.buf)
    }

    fn compress_body(&mut self, body_start: u64) -> Result<()> {
        let Some(backend) = compressor_for(&self.config)? else {
            return Ok(());
        };
        let body_len = self.buf.len() - body_start as usize;
        if body_len < self.config.compress_threshold {
            return Ok(());
        }

        self.scratch.clear();
        let (head, body) = self.buf.as_slice().split_at(body_start as usize);
        self.scratch.push_bytes(head)?;
        backend.compress_body(body, &mut self.scratch)?;
        self.buf.swap_with(&mut self.scratch);

        let id = backend.encoding_id();
        self.buf.patch_byte(VERSION_BYTE_POS, |b| b | (id << 4))
    }

    // --- OFFSET HELPERS ---

    /// Current position in 1-based body-relative coordinates.
    fn stored_position(&self) -> u64 {
        self.buf.position() - self.body_base + 1
    }

    /// Sets the track flag on the tag byte at a stored offset, marking it as
    /// a REFP/ALIAS target.
    fn set_track_flag(&mut self, stored: u64) -> Result<()> {
        self.buf
            .patch_byte(self.body_base + stored - 1, |b| b | p::TRACK_FLAG)
    }

    // --- DEPTH GUARD ---

    fn enter(&mut self) -> Result<()> {
        self.recursion_depth += 1;
        if self.recursion_depth > self.config.max_recursion_depth {
            self.recursion_depth -= 1;
            return Err(EncoderError::RecursionLimitExceeded(
                self.config.max_recursion_depth,
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        // Every enter() is paired on success and failure paths alike, so the
        // counter is back at zero when encode() returns.
        self.recursion_depth -= 1;
    }

    // --- VALUE WALKER ---

    fn dump_value(&mut self, v: &ValueRc) -> Result<()> {
        let borrowed = v.borrow();
        match &*borrowed {
            Value::Undefined => self.buf.push_byte(p::UNDEF),
            Value::Bool(true) => self.buf.push_byte(p::TRUE),
            Value::Bool(false) => self.buf.push_byte(p::FALSE),
            Value::Integer(n) => self.dump_integer(*n),
            Value::UInteger(n) => self.dump_uinteger(*n),
            Value::Float(f) => {
                self.buf.push_byte(p::FLOAT)?;
                self.buf.push_bytes(&f.to_le_bytes())
            }
            Value::Double(d) => {
                self.buf.push_byte(p::DOUBLE)?;
                self.buf.push_bytes(&d.to_le_bytes())
            }
            Value::Bytes(b) => self.dump_string(Some(v), b, false, StringRole::General),
            Value::Text(s) => self.dump_string(Some(v), s.as_bytes(), true, StringRole::General),
            Value::Array(items) => self.dump_array(v, items),
            Value::Map(pairs) => self.dump_map(v, pairs),
            Value::Ref(target) => self.dump_ref(target),
            Value::Weak(weak) => self.dump_weak(weak),
            Value::Blessed { class, inner } => self.dump_blessed(v, class, inner),
            Value::Alias(inner) => self.dump_alias(inner),
            Value::Opaque { kind, coerced } => self.dump_opaque(kind, coerced.as_deref()),
        }
    }

    // --- SCALARS ---

    fn dump_integer(&mut self, n: i64) -> Result<()> {
        if (0..=15).contains(&n) {
            self.buf.push_byte(p::POS_0 + n as u8)
        } else if (-16..0).contains(&n) {
            self.buf.push_byte((0x20 + n) as u8)
        } else if n > 0 {
            self.buf.push_byte(p::VARINT)?;
            self.buf.push_varint(n as u64)
        } else {
            self.buf.push_byte(p::ZIGZAG)?;
            self.buf.push_varint(p::zigzag(n))
        }
    }

    fn dump_uinteger(&mut self, n: u64) -> Result<()> {
        if n <= 15 {
            self.buf.push_byte(p::POS_0 + n as u8)
        } else {
            self.buf.push_byte(p::VARINT)?;
            self.buf.push_varint(n)
        }
    }

    // --- STRINGS ---

    fn dump_string(
        &mut self,
        handle: Option<&ValueRc>,
        bytes: &[u8],
        utf8: bool,
        role: StringRole,
    ) -> Result<()> {
        let dedup_enabled = match role {
            StringRole::Key | StringRole::ClassName => {
                self.config.shared_hashkeys || self.config.dedupe_strings != DedupeStrings::Off
            }
            StringRole::General => self.config.dedupe_strings != DedupeStrings::Off,
        };
        let alias_mode =
            role == StringRole::General && self.config.dedupe_strings == DedupeStrings::Alias;

        if dedup_enabled && bytes.len() >= p::DEDUP_MIN_STRING_LEN {
            // Pointer-equality shortcut before content hashing.
            let prior = handle
                .and_then(|h| self.str_ident_seen.lookup(identity_of(h)))
                .or_else(|| self.str_dedup.lookup(bytes, utf8));
            if let Some(offset) = prior {
                return if alias_mode {
                    self.buf.push_byte(p::ALIAS)?;
                    self.buf.push_varint(offset)?;
                    self.set_track_flag(offset)
                } else {
                    self.buf.push_byte(p::COPY)?;
                    self.buf.push_varint(offset)
                };
            }
            let offset = self.stored_position();
            self.str_dedup.record(bytes, utf8, offset);
            if let Some(h) = handle {
                self.str_ident_seen.mark_seen(identity_of(h), offset);
            }
        }

        self.emit_string(bytes, utf8)
    }

    fn emit_string(&mut self, bytes: &[u8], utf8: bool) -> Result<()> {
        if utf8 {
            self.buf.push_byte(p::STR_UTF8)?;
            self.buf.push_varint(bytes.len() as u64)?;
        } else if bytes.len() <= p::SHORT_BINARY_MAX_LEN {
            self.buf.push_byte(p::SHORT_BINARY_0 + bytes.len() as u8)?;
        } else {
            self.buf.push_byte(p::BINARY)?;
            self.buf.push_varint(bytes.len() as u64)?;
        }
        self.buf.push_bytes(bytes)
    }

    // --- AGGREGATES ---

    fn dump_array(&mut self, v: &ValueRc, items: &[ValueRc]) -> Result<()> {
        let id = identity_of(v);
        if let Some(offset) = self.ref_seen.lookup(id) {
            // Value position: the decoded element must *be* the prior item,
            // not a reference to it.
            self.weak_seen.remove(id);
            return self.emit_alias(offset);
        }
        self.enter()?;
        let result = (|| {
            if is_shared(v) {
                let offset = self.stored_position();
                self.ref_seen.mark_seen(id, offset);
            }
            self.buf.push_byte(p::ARRAY)?;
            self.buf.push_varint(items.len() as u64)?;
            for item in items {
                self.dump_value(item)?;
            }
            Ok(())
        })();
        self.leave();
        result
    }

    fn dump_map(&mut self, v: &ValueRc, pairs: &[(MapKey, ValueRc)]) -> Result<()> {
        let id = identity_of(v);
        if let Some(offset) = self.ref_seen.lookup(id) {
            self.weak_seen.remove(id);
            return self.emit_alias(offset);
        }
        self.enter()?;
        let result = (|| {
            if is_shared(v) {
                let offset = self.stored_position();
                self.ref_seen.mark_seen(id, offset);
            }
            self.buf.push_byte(p::HASH)?;
            self.buf.push_varint(pairs.len() as u64)?;
            self.dump_map_pairs(pairs)
        })();
        self.leave();
        result
    }

    fn dump_map_pairs(&mut self, pairs: &[(MapKey, ValueRc)]) -> Result<()> {
        if self.config.sort_map_keys {
            let mut order: Vec<&(MapKey, ValueRc)> = pairs.iter().collect();
            order.sort_by(|a, b| a.0.bytes.cmp(&b.0.bytes));
            for (key, value) in order {
                self.dump_string(None, &key.bytes, key.utf8, StringRole::Key)?;
                self.dump_value(value)?;
            }
        } else {
            for (key, value) in pairs {
                self.dump_string(None, &key.bytes, key.utf8, StringRole::Key)?;
                self.dump_value(value)?;
            }
        }
        Ok(())
    }

    /// Strong backreference: decodes as a reference *to* the prior item.
    /// Only correct behind a `Ref`/`Weak` wrapper.
    fn emit_refp(&mut self, offset: u64) -> Result<()> {
        self.buf.push_byte(p::REFP)?;
        self.buf.push_varint(offset)?;
        self.set_track_flag(offset)
    }

    /// Alias backreference: the decoded result *is* the prior item. Used for
    /// repeated identities in value position.
    fn emit_alias(&mut self, offset: u64) -> Result<()> {
        self.buf.push_byte(p::ALIAS)?;
        self.buf.push_varint(offset)?;
        self.set_track_flag(offset)
    }

    // --- REFERENCES ---

    fn dump_ref(&mut self, target: &ValueRc) -> Result<()> {
        self.enter()?;
        let result = self.dump_ref_body(target, false);
        self.leave();
        result
    }

    fn dump_ref_body(&mut self, target: &ValueRc, weak: bool) -> Result<()> {
        let id = identity_of(target);
        if let Some(offset) = self.ref_seen.lookup(id) {
            if !weak {
                // The target now has a strong reference in the document.
                self.weak_seen.remove(id);
            }
            return self.emit_refp(offset);
        }

        // Small unshared containers collapse ref + container + count into
        // one tag. Shared targets must stay in the canonical, trackable
        // form so later occurrences can backreference them.
        if !self.config.canonical_refs && !is_shared(target) {
            let borrowed = target.borrow();
            match &*borrowed {
                Value::Array(items) if items.len() <= p::SMALL_CONTAINER_MAX_LEN => {
                    self.buf
                        .push_byte(p::ARRAYREF_0 + items.len() as u8)?;
                    for item in items {
                        self.dump_value(item)?;
                    }
                    return Ok(());
                }
                Value::Map(pairs) if pairs.len() <= p::SMALL_CONTAINER_MAX_LEN => {
                    self.buf.push_byte(p::HASHREF_0 + pairs.len() as u8)?;
                    return self.dump_map_pairs(pairs);
                }
                _ => {}
            }
        }

        self.buf.push_byte(p::REFN)?;
        // Aggregate arms register their own offset before descending, which
        // is what makes in-progress cycles terminate. Everything else is
        // registered here so a later ref to the same shared target hits.
        let registers_itself = matches!(
            &*target.borrow(),
            Value::Array(_) | Value::Map(_) | Value::Blessed { .. }
        );
        if !registers_itself && is_shared(target) {
            self.ref_seen.mark_seen(id, self.stored_position());
        }
        if weak {
            // First emission of this target is weakly owned; a later strong
            // reference clears the entry.
            self.weak_seen.mark_seen(id, self.stored_position());
        }
        self.dump_value(target)
    }

    fn dump_weak(&mut self, weak: &ValueWeak) -> Result<()> {
        self.enter()?;
        let result = (|| {
            self.buf.push_byte(p::WEAKEN)?;
            match weak.upgrade() {
                // Dedicated dangling marker, distinct from a user UNDEF.
                None => self.buf.push_byte(p::CANONICAL_UNDEF),
                // The WEAKEN wrapper itself is never a backreference target;
                // only the referent participates in sharing, through the
                // usual tables.
                Some(target) => self.dump_ref_body(&target, true),
            }
        })();
        self.leave();
        result
    }

    fn dump_alias(&mut self, inner: &ValueRc) -> Result<()> {
        let id = identity_of(inner);
        if let Some(offset) = self.ref_seen.lookup(id) {
            self.weak_seen.remove(id);
            return self.emit_alias(offset);
        }
        self.enter()?;
        let result = (|| {
            // Aggregate arms register their own offset; everything else is
            // registered here so any later Alias of the same handle hits.
            let registers_itself = matches!(
                &*inner.borrow(),
                Value::Array(_) | Value::Map(_) | Value::Blessed { .. }
            );
            if !registers_itself {
                let offset = self.stored_position();
                self.ref_seen.mark_seen(id, offset);
            }
            self.dump_value(inner)
        })();
        self.leave();
        result
    }

    // --- BLESSED VALUES ---

    fn dump_blessed(&mut self, v: &ValueRc, class: &str, inner: &ValueRc) -> Result<()> {
        if self.config.croak_on_bless {
            return Err(EncoderError::UnsupportedBlessedValue(class.to_owned()));
        }
        if self.config.no_bless {
            self.enter()?;
            let result = self.dump_value(inner);
            self.leave();
            return result;
        }

        let id = identity_of(v);
        if let Some(offset) = self.ref_seen.lookup(id) {
            self.weak_seen.remove(id);
            return self.emit_alias(offset);
        }
        self.enter()?;
        let result = (|| {
            if is_shared(v) {
                let offset = self.stored_position();
                self.ref_seen.mark_seen(id, offset);
            }
            match self.freeze_payload(id, class, inner)? {
                Some(substitute) => {
                    self.emit_class_tag(class, p::OBJECT_FREEZE, p::OBJECTV_FREEZE)?;
                    self.dump_value(&substitute)
                }
                None => {
                    self.emit_class_tag(class, p::OBJECT, p::OBJECTV)?;
                    self.dump_value(inner)
                }
            }
        })();
        self.leave();
        result
    }

    /// Emits OBJECT/OBJECT_FREEZE with an inline class name, or the OBJECTV
    /// variant backreferencing a previously emitted class name.
    fn emit_class_tag(&mut self, class: &str, full_tag: u8, backref_tag: u8) -> Result<()> {
        let interned = self.config.shared_hashkeys
            && class.len() >= p::DEDUP_MIN_STRING_LEN;
        if interned {
            if let Some(offset) = self.str_dedup.lookup(class.as_bytes(), true) {
                self.buf.push_byte(backref_tag)?;
                return self.buf.push_varint(offset);
            }
        }
        self.buf.push_byte(full_tag)?;
        self.dump_string(None, class.as_bytes(), true, StringRole::ClassName)
    }

    /// Resolves the freeze transform for an object, caching per identity so
    /// a hook runs at most once per object per encode.
    fn freeze_payload(
        &mut self,
        id: usize,
        class: &str,
        inner: &ValueRc,
    ) -> Result<Option<ValueRc>> {
        if !self.config.enable_freeze_hooks {
            return Ok(None);
        }
        if let Some(cached) = self.frozen.get(&id) {
            return Ok(cached.clone());
        }
        let Some(hook) = self.config.freeze_hooks.get(class).cloned() else {
            return Ok(None);
        };
        let resolved = match hook.freeze(class, inner)? {
            FreezeResult::UseStructural => None,
            FreezeResult::Substitute(substitute) => {
                if let Value::Blessed { class: sub_class, .. } = &*substitute.borrow() {
                    if sub_class == class {
                        return Err(EncoderError::MalformedFreezeResult(format!(
                            "freeze hook for '{class}' returned a value blessed into the same class"
                        )));
                    }
                }
                Some(substitute)
            }
        };
        self.frozen.insert(id, resolved.clone());
        Ok(resolved)
    }

    // --- UNSUPPORTED VALUES ---

    fn dump_opaque(&mut self, kind: &str, coerced: Option<&str>) -> Result<()> {
        match self.config.on_unsupported {
            OnUnsupported::Croak => Err(EncoderError::UnsupportedType(kind.to_owned())),
            OnUnsupported::Undef => {
                self.warn_unsupported(kind, coerced, "undef");
                self.buf.push_byte(p::UNDEF)
            }
            OnUnsupported::Stringify => {
                self.warn_unsupported(kind, coerced, "its string form");
                let text = coerced.unwrap_or(kind);
                self.dump_string(None, text.as_bytes(), true, StringRole::General)
            }
        }
    }

    fn warn_unsupported(&self, kind: &str, coerced: Option<&str>, substitute: &str) {
        if !self.config.warn_unsupported {
            return;
        }
        if coerced.is_some() && self.config.warn_unsupported_ignore_overload {
            return;
        }
        log::warn!("substituting {substitute} for unsupported value kind '{kind}'");
    }
}
