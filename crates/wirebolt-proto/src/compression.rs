//! Pluggable compression for frame bodies.
//!
//! Two algorithms are negotiated by name during the `STARTUP` handshake:
//! `snappy` and `lz4`. The LZ4 on-wire format prefixes the compressed
//! block with a 4-byte **big-endian** uncompressed length, which is the
//! opposite of the little-endian framing `lz4_flex`'s own block helpers
//! assume when used stand-alone — this adapter does the fix-up by hand,
//! calling `lz4_flex`'s raw (unframed) block functions directly instead
//! of its own frame format.

use std::sync::Arc;

use crate::error::CodecError;

/// A compress/decompress pair for one named algorithm, as negotiated
/// during `STARTUP`.
pub trait Compressor: Send + Sync {
    /// The name this algorithm is advertised under in `STARTUP`'s
    /// `COMPRESSION` option and `SUPPORTED`'s option list.
    fn name(&self) -> &'static str;

    /// Compresses a frame body for the wire.
    fn compress(&self, input: &[u8]) -> Vec<u8>;

    /// Decompresses a frame body read from the wire.
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Snappy block-format compression. No length prefix: Snappy's block
/// format is self-delimiting.
#[cfg(feature = "compression-snappy")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SnappyCompressor;

#[cfg(feature = "compression-snappy")]
impl Compressor for SnappyCompressor {
    fn name(&self) -> &'static str {
        "snappy"
    }

    fn compress(&self, input: &[u8]) -> Vec<u8> {
        snap::raw::Encoder::new().compress_vec(input).unwrap_or_default()
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        snap::raw::Decoder::new().decompress_vec(input).map_err(|e| CodecError::BadColumnData {
            type_name: "snappy frame body",
            reason: e.to_string(),
        })
    }
}

/// LZ4 block-format compression with the protocol's mandated big-endian
/// uncompressed-length prefix.
#[cfg(feature = "compression-lz4")]
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4Compressor;

#[cfg(feature = "compression-lz4")]
impl Compressor for Lz4Compressor {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress(&self, input: &[u8]) -> Vec<u8> {
        let compressed = lz4_flex::block::compress(input);
        let mut out = Vec::with_capacity(4 + compressed.len());
        out.extend_from_slice(&(input.len() as u32).to_be_bytes());
        out.extend_from_slice(&compressed);
        out
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        if input.len() < 4 {
            return Err(CodecError::BadColumnData {
                type_name: "lz4 frame body",
                reason: "missing 4-byte length prefix".to_owned(),
            });
        }
        let uncompressed_len =
            u32::from_be_bytes([input[0], input[1], input[2], input[3]]) as usize;
        lz4_flex::block::decompress(&input[4..], uncompressed_len).map_err(|e| {
            CodecError::BadColumnData { type_name: "lz4 frame body", reason: e.to_string() }
        })
    }
}

/// Resolves an algorithm name, as named in `STARTUP`'s `COMPRESSION`
/// option, to a compiled-in adapter.
pub fn resolve(name: &str) -> Result<Arc<dyn Compressor>, CodecError> {
    match name {
        #[cfg(feature = "compression-snappy")]
        "snappy" => Ok(Arc::new(SnappyCompressor)),
        #[cfg(feature = "compression-lz4")]
        "lz4" => Ok(Arc::new(Lz4Compressor)),
        other => Err(CodecError::UnknownCompression(other.to_owned())),
    }
}


#[cfg(all(test, feature = "compression-lz4"))]
mod lz4_tests {
    use super::*;

    #[test]
    fn round_trips_through_big_endian_prefix() {
        let adapter = Lz4Compressor;
        let plaintext = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let compressed = adapter.compress(&plaintext);

        // The wire format mandates a big-endian prefix; confirm that's
        // actually what was written, not the little-endian framing most
        // stand-alone LZ4 tools default to.
        let declared_len = u32::from_be_bytes(compressed[..4].try_into().expect("4 bytes"));
        assert_eq!(declared_len as usize, plaintext.len());

        let decompressed = adapter.decompress(&compressed).expect("decompresses");
        assert_eq!(decompressed, plaintext);
    }

    #[test]
    fn little_endian_prefix_is_rejected_as_garbage_length() {
        let adapter = Lz4Compressor;
        let plaintext = b"some data that compresses fine".repeat(3);
        let compressed = adapter.compress(&plaintext);

        // Flip the prefix to little-endian, simulating a peer that got
        // the endianness wrong; the declared length will not match the
        // compressed block's real uncompressed size, and decompression
        // must fail rather than silently produce truncated/garbage data.
        let mut mangled = compressed.clone();
        mangled[..4].copy_from_slice(&(plaintext.len() as u32).to_le_bytes());
        if mangled[..4] == compressed[..4] {
            // Symmetric length (vanishingly unlikely for this fixture);
            // nothing to assert.
            return;
        }
        assert!(adapter.decompress(&mangled).is_err());
    }
}
