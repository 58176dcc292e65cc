//! The dynamically-typed value model consumed by the encoder core.
//!
//! Aggregates live behind [`ValueRc`] (`Rc<RefCell<Value>>`): the `Rc`
//! pointer doubles as the stable identity key the sharing/cycle tables need
//! for the lifetime of one encode call, and the `RefCell` lets callers build
//! cyclic graphs after construction. The encoder only ever borrows values
//! immutably; it never owns or mutates caller data.
//!
//! Host runtimes adapt their own object model by building `Value` graphs.
//! Handles the encoder cannot represent structurally become
//! [`Value::Opaque`], which carries the handle's kind name and, when the
//! handle supports string coercion, its coerced form; the configured
//! unsupported-value policy decides what happens to it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::error::Result;

/// Shared handle to a value; the unit of identity for sharing and cycles.
pub type ValueRc = Rc<RefCell<Value>>;

/// Non-owning handle to a value that may be dropped independently.
pub type ValueWeak = Weak<RefCell<Value>>;

/// A dynamically-typed value.
#[derive(Debug, Clone)]
pub enum Value {
    /// The undefined value.
    Undefined,
    /// Boolean.
    Bool(bool),
    /// Signed integer up to platform word width.
    Integer(i64),
    /// Unsigned integer; covers the range above `i64::MAX`.
    UInteger(u64),
    /// Single-precision float.
    Float(f32),
    /// Double-precision float.
    Double(f64),
    /// Raw byte string.
    Bytes(Vec<u8>),
    /// UTF-8 text string.
    Text(String),
    /// Ordered sequence.
    Array(Vec<ValueRc>),
    /// Key/value pairs in native order; keys are byte strings.
    Map(Vec<(MapKey, ValueRc)>),
    /// Strong reference to another value.
    Ref(ValueRc),
    /// Weak reference; the target may already be gone.
    Weak(ValueWeak),
    /// A class-name tag wrapping an underlying value.
    Blessed {
        /// Class name; eligible for string deduplication.
        class: String,
        /// The wrapped payload.
        inner: ValueRc,
    },
    /// Explicit marker that the inner value is intentionally shared; repeat
    /// occurrences of the same identity encode as alias backreferences.
    Alias(ValueRc),
    /// A host-runtime handle with no structural representation.
    Opaque {
        /// Human-readable kind, used in errors and warnings.
        kind: String,
        /// String coercion of the handle, when the host supports one.
        coerced: Option<String>,
    },
}

impl Value {
    /// Wraps the value in a fresh shared handle.
    pub fn into_rc(self) -> ValueRc {
        Rc::new(RefCell::new(self))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::UInteger(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

/// The stable identity of a shared handle for one encode call.
///
/// Compared by pointer, never by content; two handles are the same identity
/// exactly when they are the same allocation.
pub fn identity_of(value: &ValueRc) -> usize {
    Rc::as_ptr(value) as usize
}

/// True if the handle is observably shared: more than one strong owner, or
/// any weak reference pointing at it. Unshared aggregates skip the identity
/// table, since no backreference to them can ever be issued.
pub fn is_shared(value: &ValueRc) -> bool {
    Rc::strong_count(value) > 1 || Rc::weak_count(value) > 0
}

// --- MAP KEYS ---

/// A map key: raw bytes plus a UTF-8 flag.
///
/// Keys are always strings on the wire. Byte-lexicographic ordering over
/// `bytes` is the total order used when key sorting is enabled.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MapKey {
    /// Raw key bytes.
    pub bytes: Vec<u8>,
    /// Whether `bytes` is UTF-8 text (emits STR_UTF8 instead of BINARY).
    pub utf8: bool,
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        Self {
            bytes: s.as_bytes().to_vec(),
            utf8: true,
        }
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> Self {
        Self {
            utf8: true,
            bytes: s.into_bytes(),
        }
    }
}

impl From<Vec<u8>> for MapKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes, utf8: false }
    }
}

// --- FREEZE HOOKS ---

/// Result of a freeze transform.
#[derive(Debug, Clone)]
pub enum FreezeResult {
    /// Substitute this value for the blessed payload on the wire.
    Substitute(ValueRc),
    /// Sentinel: skip the transform and use the encoder's own structural
    /// encoding of the original payload.
    UseStructural,
}

/// A host-defined transform letting a class control its own wire shape.
///
/// Registered per class name on the encoder configuration. Invoked at most
/// once per object identity per encode call; repeated occurrences of the
/// same object reuse the cached result.
pub trait FreezeHook: Send + Sync {
    /// Produces the substitute payload for a blessed value.
    ///
    /// Returning a value blessed into the same class is rejected as
    /// [`MalformedFreezeResult`](crate::EncoderError::MalformedFreezeResult);
    /// the walker does not attempt silent recursion.
    fn freeze(&self, class: &str, value: &ValueRc) -> Result<FreezeResult>;
}

/// Shared, thread-safe handle to a freeze hook, cheap to clone into
/// prototype configurations.
pub type FreezeHookRc = Arc<dyn FreezeHook>;

impl<F> FreezeHook for F
where
    F: Fn(&str, &ValueRc) -> Result<FreezeResult> + Send + Sync,
{
    fn freeze(&self, class: &str, value: &ValueRc) -> Result<FreezeResult> {
        self(class, value)
    }
}
