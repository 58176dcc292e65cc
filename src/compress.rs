//! Threshold-gated body compression post-processing.
//!
//! After the walker finishes, the completed body is optionally rewritten
//! in place: the header bytes are copied into the scratch buffer, the body
//! is compressed after them, and the buffers are swapped in O(1). The
//! header's encoding nibble is then patched by the encoder.
//!
//! Every compressed frame is self-describing:
//!
//! ```text
//! varint(uncompressed_len) varint(compressed_len) [compressed bytes]
//! ```
//!
//! Incremental snappy repeats that frame per bounded input chunk, so a
//! streaming decoder can decompress chunk by chunk without the whole body
//! resident. Backend failure fails the encode; the uncompressed body is
//! never silently substituted.

use crate::buffer::OutputBuffer;
use crate::config::{Compression, EncoderConfig};
use crate::error::{EncoderError, Result};
use crate::protocol::encoding;

/// Input chunk bound for incremental snappy.
pub const SNAPPY_INCR_CHUNK: usize = 64 * 1024;

/// One compression backend.
///
/// Implementations append their framed output to `out`; the caller owns
/// threshold gating, buffer swapping, and descriptor patching.
pub trait BodyCompressor {
    /// Encoding identifier stored in the version byte's high nibble.
    fn encoding_id(&self) -> u8;

    /// Compresses `body` and appends the framed result to `out`.
    fn compress_body(&self, body: &[u8], out: &mut OutputBuffer) -> Result<()>;
}

/// Picks the backend for a configuration, or `None` when compression is off.
///
/// A mode whose backend is not compiled into this build is a
/// [`EncoderError::Compression`] error, not a silent fallback.
pub fn compressor_for(config: &EncoderConfig) -> Result<Option<Box<dyn BodyCompressor>>> {
    match config.compress {
        Compression::Off => Ok(None),
        #[cfg(feature = "snappy")]
        Compression::Snappy => Ok(Some(Box::new(SnappyCompressor { incremental: false }))),
        #[cfg(feature = "snappy")]
        Compression::SnappyIncremental => Ok(Some(Box::new(SnappyCompressor { incremental: true }))),
        #[cfg(feature = "zlib")]
        Compression::Zlib => Ok(Some(Box::new(ZlibCompressor {
            level: config.compress_level,
        }))),
        #[cfg(not(all(feature = "snappy", feature = "zlib")))]
        #[allow(unreachable_patterns)]
        other => Err(EncoderError::Compression(format!(
            "compression mode {other:?} not compiled into this build"
        ))),
    }
}

// --- SNAPPY ---

/// Snappy raw-block backend, whole-body or chunked.
#[cfg(feature = "snappy")]
#[derive(Debug, Clone, Copy)]
pub struct SnappyCompressor {
    /// Chunked, self-framed output for streaming decoders.
    pub incremental: bool,
}

#[cfg(feature = "snappy")]
impl BodyCompressor for SnappyCompressor {
    fn encoding_id(&self) -> u8 {
        if self.incremental {
            encoding::SNAPPY_INCREMENTAL
        } else {
            encoding::SNAPPY
        }
    }

    fn compress_body(&self, body: &[u8], out: &mut OutputBuffer) -> Result<()> {
        let mut enc = snap::raw::Encoder::new();
        if self.incremental {
            for chunk in body.chunks(SNAPPY_INCR_CHUNK) {
                let compressed = enc
                    .compress_vec(chunk)
                    .map_err(|e| EncoderError::Compression(e.to_string()))?;
                out.push_varint(chunk.len() as u64)?;
                out.push_varint(compressed.len() as u64)?;
                out.push_bytes(&compressed)?;
            }
        } else {
            let compressed = enc
                .compress_vec(body)
                .map_err(|e| EncoderError::Compression(e.to_string()))?;
            out.push_varint(body.len() as u64)?;
            out.push_varint(compressed.len() as u64)?;
            out.push_bytes(&compressed)?;
        }
        Ok(())
    }
}

// --- ZLIB ---

/// Zlib backend at a configured level (1..=9, higher = smaller/slower).
#[cfg(feature = "zlib")]
#[derive(Debug, Clone, Copy)]
pub struct ZlibCompressor {
    /// Compression level.
    pub level: u32,
}

#[cfg(feature = "zlib")]
impl BodyCompressor for ZlibCompressor {
    fn encoding_id(&self) -> u8 {
        encoding::ZLIB
    }

    fn compress_body(&self, body: &[u8], out: &mut OutputBuffer) -> Result<()> {
        use std::io::Write;

        let mut writer = flate2::write::ZlibEncoder::new(
            Vec::new(),
            flate2::Compression::new(self.level),
        );
        writer
            .write_all(body)
            .map_err(|e| EncoderError::Compression(e.to_string()))?;
        let compressed = writer
            .finish()
            .map_err(|e| EncoderError::Compression(e.to_string()))?;
        out.push_varint(body.len() as u64)?;
        out.push_varint(compressed.len() as u64)?;
        out.push_bytes(&compressed)?;
        Ok(())
    }
}
