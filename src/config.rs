//! Encoder configuration: immutable per run, clonable as a prototype.
//!
//! One knob per option flag of the original encoder, expressed as typed
//! fields instead of a bit mask. A configuration is validated once at
//! `build()` and never changes for the lifetime of the encoder; cloning it
//! into a sibling encoder (the "prototype" pattern) is cheap because the
//! only non-scalar members are the hook registry entries behind `Arc`.

use std::collections::HashMap;

use crate::buffer;
use crate::error::{EncoderError, Result};
use crate::protocol;
use crate::value::FreezeHookRc;

/// Policy for values the walker cannot represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnUnsupported {
    /// Fail the encode with `UnsupportedType`.
    #[default]
    Croak,
    /// Substitute the undefined value.
    Undef,
    /// Substitute the value's string coercion (or its kind name when the
    /// host provides no coercion).
    Stringify,
}

/// Body compression mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression.
    #[default]
    Off,
    /// Whole-body snappy in one frame.
    Snappy,
    /// Snappy in bounded self-framed chunks, decodable as a stream.
    SnappyIncremental,
    /// Whole-body zlib at the configured level.
    Zlib,
}

/// String deduplication mode for general (non-key, non-classname) strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupeStrings {
    /// No general string dedup; hash keys and class names may still be
    /// deduplicated under `shared_hashkeys`.
    #[default]
    Off,
    /// Repeated string content emits a COPY backreference.
    Copy,
    /// Like `Copy`, but non-key, non-classname repeats emit ALIAS so the
    /// decoded strings literally share storage. Supersedes `Copy`.
    Alias,
}

/// Immutable option set for one encoder.
///
/// Construct through [`EncoderConfig::builder`]. Field meanings follow the
/// module docs; defaults match the original encoder (shared hash keys on,
/// compression off with a 1024-byte threshold, zlib level 6, recursion
/// limit 10_000).
#[derive(Clone)]
pub struct EncoderConfig {
    /// Protocol version to emit (2..=4).
    pub protocol_version: u8,
    /// Intern repeated hash keys and class names via COPY backreferences.
    pub shared_hashkeys: bool,
    /// Policy for unrepresentable values.
    pub on_unsupported: OnUnsupported,
    /// Warn (via `log`) when substituting an unsupported value. Only
    /// meaningful under the `Undef`/`Stringify` policies.
    pub warn_unsupported: bool,
    /// Suppress that warning when the value supports string coercion.
    pub warn_unsupported_ignore_overload: bool,
    /// Body compression mode.
    pub compress: Compression,
    /// Zlib compression level, 1..=9.
    pub compress_level: u32,
    /// Bodies smaller than this stay uncompressed regardless of mode.
    pub compress_threshold: usize,
    /// General string deduplication mode.
    pub dedupe_strings: DedupeStrings,
    /// Emit map keys in byte-lexicographic order instead of native order.
    pub sort_map_keys: bool,
    /// Strip class tags and serialize blessed payloads directly.
    pub no_bless: bool,
    /// Fail on any blessed value.
    pub croak_on_bless: bool,
    /// Never emit the ARRAYREF/HASHREF small-container forms.
    pub canonical_refs: bool,
    /// Depth guard limit for the traversal.
    pub max_recursion_depth: usize,
    /// Consult registered freeze hooks for blessed values.
    pub enable_freeze_hooks: bool,
    /// Auto-reset after each encode so the instance can be reused without an
    /// explicit `clear()`.
    pub reuse_instance: bool,
    /// Initial output buffer capacity; a pure tuning knob.
    pub initial_buffer_capacity: usize,
    /// Freeze transforms by class name.
    pub freeze_hooks: HashMap<String, FreezeHookRc>,
}

impl std::fmt::Debug for EncoderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderConfig")
            .field("protocol_version", &self.protocol_version)
            .field("shared_hashkeys", &self.shared_hashkeys)
            .field("on_unsupported", &self.on_unsupported)
            .field("compress", &self.compress)
            .field("compress_level", &self.compress_level)
            .field("compress_threshold", &self.compress_threshold)
            .field("dedupe_strings", &self.dedupe_strings)
            .field("sort_map_keys", &self.sort_map_keys)
            .field("no_bless", &self.no_bless)
            .field("croak_on_bless", &self.croak_on_bless)
            .field("canonical_refs", &self.canonical_refs)
            .field("max_recursion_depth", &self.max_recursion_depth)
            .field("enable_freeze_hooks", &self.enable_freeze_hooks)
            .field("reuse_instance", &self.reuse_instance)
            .field("freeze_hooks", &self.freeze_hooks.keys())
            .finish_non_exhaustive()
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            protocol_version: protocol::PROTOCOL_VERSION_DEFAULT,
            shared_hashkeys: true,
            on_unsupported: OnUnsupported::Croak,
            warn_unsupported: false,
            warn_unsupported_ignore_overload: false,
            compress: Compression::Off,
            compress_level: 6,
            compress_threshold: 1024,
            dedupe_strings: DedupeStrings::Off,
            sort_map_keys: false,
            no_bless: false,
            croak_on_bless: false,
            canonical_refs: false,
            max_recursion_depth: 10_000,
            enable_freeze_hooks: false,
            reuse_instance: false,
            initial_buffer_capacity: buffer::INITIAL_CAPACITY,
            freeze_hooks: HashMap::new(),
        }
    }
}

impl EncoderConfig {
    /// Starts a builder with default options.
    pub fn builder() -> EncoderConfigBuilder {
        EncoderConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`EncoderConfig`] with validation at `build()`.
#[derive(Debug)]
pub struct EncoderConfigBuilder {
    config: EncoderConfig,
}

impl EncoderConfigBuilder {
    /// Protocol version to emit (2..=4).
    pub fn protocol_version(mut self, version: u8) -> Self {
        self.config.protocol_version = version;
        self
    }

    /// Intern repeated hash keys and class names.
    pub fn shared_hashkeys(mut self, on: bool) -> Self {
        self.config.shared_hashkeys = on;
        self
    }

    /// Policy for unrepresentable values.
    pub fn on_unsupported(mut self, policy: OnUnsupported) -> Self {
        self.config.on_unsupported = policy;
        self
    }

    /// Warn when substituting an unsupported value.
    pub fn warn_unsupported(mut self, on: bool) -> Self {
        self.config.warn_unsupported = on;
        self
    }

    /// Suppress the unsupported-value warning for string-coercible values.
    pub fn warn_unsupported_ignore_overload(mut self, on: bool) -> Self {
        self.config.warn_unsupported_ignore_overload = on;
        self
    }

    /// Body compression mode.
    pub fn compress(mut self, mode: Compression) -> Self {
        self.config.compress = mode;
        self
    }

    /// Zlib compression level, 1..=9.
    pub fn compress_level(mut self, level: u32) -> Self {
        self.config.compress_level = level;
        self
    }

    /// Minimum body size for compression to engage.
    pub fn compress_threshold(mut self, threshold: usize) -> Self {
        self.config.compress_threshold = threshold;
        self
    }

    /// General string deduplication mode.
    pub fn dedupe_strings(mut self, mode: DedupeStrings) -> Self {
        self.config.dedupe_strings = mode;
        self
    }

    /// Deterministic byte-lexicographic map key order.
    pub fn sort_map_keys(mut self, on: bool) -> Self {
        self.config.sort_map_keys = on;
        self
    }

    /// Strip class tags from blessed values.
    pub fn no_bless(mut self, on: bool) -> Self {
        self.config.no_bless = on;
        self
    }

    /// Fail on any blessed value.
    pub fn croak_on_bless(mut self, on: bool) -> Self {
        self.config.croak_on_bless = on;
        self
    }

    /// Never special-case small container references.
    pub fn canonical_refs(mut self, on: bool) -> Self {
        self.config.canonical_refs = on;
        self
    }

    /// Depth guard limit.
    pub fn max_recursion_depth(mut self, depth: usize) -> Self {
        self.config.max_recursion_depth = depth;
        self
    }

    /// Consult freeze hooks for blessed values.
    pub fn enable_freeze_hooks(mut self, on: bool) -> Self {
        self.config.enable_freeze_hooks = on;
        self
    }

    /// Auto-reset after each encode for instance reuse.
    pub fn reuse_instance(mut self, on: bool) -> Self {
        self.config.reuse_instance = on;
        self
    }

    /// Initial output buffer capacity.
    pub fn initial_buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.initial_buffer_capacity = capacity;
        self
    }

    /// Registers a freeze transform for a class name.
    pub fn freeze_hook(mut self, class: impl Into<String>, hook: FreezeHookRc) -> Self {
        self.config.freeze_hooks.insert(class.into(), hook);
        self
    }

    /// Validates and produces the configuration.
    pub fn build(self) -> Result<EncoderConfig> {
        let cfg = self.config;
        if !(protocol::PROTOCOL_VERSION_MIN..=protocol::PROTOCOL_VERSION_MAX)
            .contains(&cfg.protocol_version)
        {
            return Err(EncoderError::Internal(format!(
                "unsupported protocol version {} (supported: {}..={})",
                cfg.protocol_version,
                protocol::PROTOCOL_VERSION_MIN,
                protocol::PROTOCOL_VERSION_MAX
            )));
        }
        if !(1..=9).contains(&cfg.compress_level) {
            return Err(EncoderError::Internal(format!(
                "compression level {} out of range 1..=9",
                cfg.compress_level
            )));
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_encoder() {
        let cfg = EncoderConfig::default();
        assert_eq!(cfg.protocol_version, 3);
        assert!(cfg.shared_hashkeys);
        assert_eq!(cfg.compress, Compression::Off);
        assert_eq!(cfg.compress_threshold, 1024);
        assert_eq!(cfg.compress_level, 6);
        assert_eq!(cfg.max_recursion_depth, 10_000);
    }

    #[test]
    fn builder_rejects_bad_protocol_version() {
        assert!(EncoderConfig::builder().protocol_version(1).build().is_err());
        assert!(EncoderConfig::builder().protocol_version(5).build().is_err());
        assert!(EncoderConfig::builder().protocol_version(4).build().is_ok());
    }

    #[test]
    fn builder_rejects_bad_compression_level() {
        assert!(EncoderConfig::builder().compress_level(0).build().is_err());
        assert!(EncoderConfig::builder().compress_level(10).build().is_err());
        assert!(EncoderConfig::builder().compress_level(9).build().is_ok());
    }
}
