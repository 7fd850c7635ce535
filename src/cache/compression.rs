//! Compression Codec
//!
//! LZ4 block compression applied to serialized values above a size threshold.

use crate::error::{CacheError, Result};

// == Compression Codec ==
/// Compresses serialized values that exceed `threshold` bytes.
#[derive(Debug, Clone)]
pub struct CompressionCodec {
    enabled: bool,
    threshold: usize,
}

impl CompressionCodec {
    pub fn new(enabled: bool, threshold: usize) -> Self {
        Self { enabled, threshold }
    }

    /// Whether a payload of `len` bytes should be compressed.
    pub fn should_compress(&self, len: usize) -> bool {
        self.enabled && len > self.threshold
    }

    // == Compress ==
    /// Compresses `data` into a size-prefixed lz4 block.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(data, None, true)
            .map_err(|e| CacheError::Compression(format!("lz4 compression failed: {}", e)))
    }

    // == Decompress ==
    /// Reverses [`compress`](Self::compress).
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::decompress(data, None)
            .map_err(|e| CacheError::Compression(format!("lz4 decompression failed: {}", e)))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold() {
        let codec = CompressionCodec::new(true, 1024);
        assert!(!codec.should_compress(1024));
        assert!(codec.should_compress(1025));

        let disabled = CompressionCodec::new(false, 0);
        assert!(!disabled.should_compress(1 << 20));
    }

    #[test]
    fn test_compress_shrinks_repetitive_data() {
        let codec = CompressionCodec::new(true, 0);
        let data = "abcdefgh".repeat(512).into_bytes();

        let compressed = codec.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(codec.decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_decompress_garbage_fails() {
        let codec = CompressionCodec::new(true, 0);
        // Size prefix claims 4 GiB of output
        let result = codec.decompress(&[0xff, 0xff, 0xff, 0xff, 0x01, 0x02]);
        assert!(matches!(result, Err(CacheError::Compression(_))));
    }
}
