//! # sereal-encoder
//!
//! A binary serialization encoder for dynamically-typed value graphs:
//! scalars, strings, arrays, maps, strong/weak references, and "blessed"
//! (class-tagged) objects, written as a compact, versioned, optionally
//! compressed byte stream in the Sereal wire format.
//!
//! ## Overview
//!
//! The encoder walks an arbitrary value graph depth-first and emits one tag
//! per value. Three mechanisms keep the output compact and the traversal
//! finite:
//!
//! *   **Identity tracking:** aggregates (arrays, maps, references, blessed
//!     values) are tracked by memory identity; a second encounter emits a
//!     backreference to the earlier emission instead of re-walking the
//!     subtree. This is what makes shared and cyclic graphs terminate and
//!     round-trip with their sharing structure intact.
//! *   **String deduplication:** repeated string content can emit a COPY (or
//!     ALIAS) backreference instead of the bytes. Hash keys and class names
//!     are interned by default; general strings opt in per configuration.
//! *   **Depth guarding:** the input graph is caller-controlled, so a
//!     configurable recursion limit bounds stack use and fails cleanly on
//!     pathological nesting.
//!
//! After the body is complete it may be rewritten in place by a
//! threshold-gated compression pass (snappy, chunked snappy, or zlib), with
//! the header descriptor patched to match.
//!
//! ## Example
//!
//! ```rust
//! use sereal_encoder::{Encoder, EncoderConfig, Value};
//!
//! let config = EncoderConfig::builder()
//!     .sort_map_keys(true)
//!     .build()?;
//! let mut encoder = Encoder::new(config);
//!
//! let value = Value::Array(vec![
//!     Value::Integer(42).into_rc(),
//!     Value::from("hello").into_rc(),
//! ])
//! .into_rc();
//!
//! let bytes = encoder.encode(&value, None)?;
//! assert_eq!(&bytes[1..4], b"\xF3rl");
//! # Ok::<(), sereal_encoder::EncoderError>(())
//! ```
//!
//! ## Sharing and cycles
//!
//! Aggregates live behind [`ValueRc`] (`Rc<RefCell<Value>>`). The `Rc`
//! pointer is the identity key for sharing detection, and the `RefCell`
//! lets callers close cycles after construction:
//!
//! ```rust
//! use sereal_encoder::{Encoder, EncoderConfig, Value};
//!
//! let array = Value::Array(vec![]).into_rc();
//! // The array's first element is a reference back to the array itself.
//! if let Value::Array(items) = &mut *array.borrow_mut() {
//!     items.push(Value::Ref(array.clone()).into_rc());
//! }
//!
//! let mut encoder = Encoder::new(EncoderConfig::default());
//! let bytes = encoder.encode(&Value::Ref(array.clone()).into_rc(), None)?;
//! assert!(!bytes.is_empty()); // finite output for a cyclic graph
//! # Ok::<(), sereal_encoder::EncoderError>(())
//! ```
//!
//! ## Safety and error handling
//!
//! * **No panics:** no `unwrap()` or `panic!()` in the library (enforced by
//!   clippy lints); all failures surface as [`EncoderError`].
//! * **No unsafe:** the crate is `#![deny(unsafe_code)]`.
//! * **Fatal-only errors:** every error aborts the current encode; the
//!   caller discards the output and may `clear()` and retry.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod buffer;
pub mod compress;
pub mod config;
pub mod encoder;
pub mod error;
pub mod protocol;
pub mod tables;
pub mod value;

// --- RE-EXPORTS ---

pub use config::{Compression, DedupeStrings, EncoderConfig, OnUnsupported};
pub use encoder::Encoder;
pub use error::{EncoderError, Result};
pub use value::{
    FreezeHook, FreezeHookRc, FreezeResult, MapKey, Value, ValueRc, ValueWeak,
};
