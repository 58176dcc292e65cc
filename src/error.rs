//! Centralized error handling for the encoder.
//!
//! All failure conditions are propagated through the [`Result`] type; the
//! library never panics on bad input (enforced by the crate-level clippy
//! lints). Errors are `Clone` so a caller embedding several encoders can
//! store or forward them cheaply.
//!
//! Every error is fatal to the current encode call. Nothing is retried
//! internally; retry policy belongs to the caller, which must discard the
//! partially written output. Warnings (lenient unsupported-value policy) are
//! emitted through the `log` facade and never surface here.

use std::fmt;

/// A specialized `Result` type for encoder operations.
pub type Result<T> = std::result::Result<T, EncoderError>;

/// The master error enum covering all failure domains of the encoder.
///
/// ## Variants
///
/// - **RecursionLimitExceeded:** the depth guard tripped while walking a
///   caller-controlled value graph.
/// - **UnsupportedType:** a value kind the walker cannot represent, under the
///   strict `Croak` policy.
/// - **UnsupportedBlessedValue:** a blessed value under `croak_on_bless`.
/// - **MalformedFreezeResult:** a freeze hook returned something the walker
///   refuses to serialize (e.g. a value blessed back into the same class).
/// - **Compression:** a compression backend failed or is not compiled in.
/// - **OutOfMemory:** buffer or table growth failed to allocate.
/// - **Internal:** API misuse or an invariant violation (e.g. calling
///   `encode` on a dirty, non-reusable instance).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderError {
    /// The value graph nests deeper than `max_recursion_depth`.
    ///
    /// The input graph is caller-controlled; this guard keeps adversarial or
    /// accidentally deep nesting from exhausting the call stack. The limit
    /// that was hit is carried for diagnostics.
    RecursionLimitExceeded(usize),

    /// A value of a kind the encoder cannot represent, encountered under the
    /// `Croak` policy. The string names the offending kind.
    UnsupportedType(String),

    /// A blessed value was encountered while `croak_on_bless` is set.
    /// The string is the class name.
    UnsupportedBlessedValue(String),

    /// A freeze hook produced a result the walker cannot serialize.
    MalformedFreezeResult(String),

    /// A compression backend failed during post-processing, or the configured
    /// backend is not compiled into this build. The uncompressed body is
    /// never silently substituted; the whole encode fails.
    Compression(String),

    /// Allocation failure while growing the output buffer or a table.
    /// Fatal to this encode call, not retried.
    OutOfMemory,

    /// API misuse or internal invariant violation. Should not occur when the
    /// encoder is driven per its documented lifecycle.
    Internal(String),
}

impl fmt::Display for EncoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecursionLimitExceeded(limit) => {
                write!(f, "recursion limit ({limit}) exceeded while encoding")
            }
            Self::UnsupportedType(kind) => {
                write!(f, "cannot encode unsupported value kind: {kind}")
            }
            Self::UnsupportedBlessedValue(class) => {
                write!(f, "refusing to encode blessed value of class '{class}'")
            }
            Self::MalformedFreezeResult(msg) => {
                write!(f, "freeze hook returned an unserializable value: {msg}")
            }
            Self::Compression(msg) => write!(f, "compression error: {msg}"),
            Self::OutOfMemory => write!(f, "allocation failure while growing encoder storage"),
            Self::Internal(msg) => write!(f, "internal encoder error: {msg}"),
        }
    }
}

impl std::error::Error for EncoderError {}

impl From<std::collections::TryReserveError> for EncoderError {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::OutOfMemory
    }
}
