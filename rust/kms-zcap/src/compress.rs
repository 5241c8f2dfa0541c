//! Compact transport encoding for capabilities.
//!
//! A capability travels in an HTTP header as brotli-compressed JSON, which is
//! then base64url encoded without padding. [`compress`] and [`decompress`]
//! work on the raw compressed bytes; [`encode`] and [`decode`] add the header
//! encoding on top.

use crate::{
    capability::Capability,
    error::{CompressionError, DecompressionError},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use brotli::{CompressorWriter, Decompressor};
use serde::Deserialize;
use std::io::{Cursor, Read, Write};

const BUFFER_SIZE: usize = 4096;

/// Tuning for capability compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    /// Brotli quality, 0 to 11.
    pub quality: u32,
    /// Brotli window size as a power of two, 10 to 24.
    pub window: u32,
    /// Upper bound on the size of a decompressed capability.
    pub max_decompressed_len: usize,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            quality: 9,
            window: 20,
            max_decompressed_len: 64 * 1024,
        }
    }
}

impl CompressionSettings {
    /// Serialize and compress `capability`.
    pub fn compress(&self, capability: &Capability) -> Result<Vec<u8>, CompressionError> {
        let json = serde_json::to_vec(capability)?;
        let mut compressed = Cursor::new(Vec::new());

        {
            let mut writer =
                CompressorWriter::new(&mut compressed, BUFFER_SIZE, self.quality, self.window);
            writer.write_all(&json)?;
            writer.flush()?;
        }

        Ok(compressed.into_inner())
    }

    /// Decompress and parse a capability produced by [`Self::compress`].
    pub fn decompress(&self, bytes: &[u8]) -> Result<Capability, DecompressionError> {
        if bytes.is_empty() {
            return Err(DecompressionError::Empty);
        }

        let mut decompressed = Vec::new();
        Decompressor::new(bytes, BUFFER_SIZE)
            .take((self.max_decompressed_len as u64).saturating_add(1))
            .read_to_end(&mut decompressed)?;

        if decompressed.len() > self.max_decompressed_len {
            return Err(DecompressionError::TooLarge {
                limit: self.max_decompressed_len,
            });
        }

        Ok(serde_json::from_slice(&decompressed)?)
    }

    /// Compress `capability` and encode it for an HTTP header.
    pub fn encode(&self, capability: &Capability) -> Result<String, CompressionError> {
        Ok(URL_SAFE_NO_PAD.encode(self.compress(capability)?))
    }

    /// Decode a header value produced by [`Self::encode`].
    pub fn decode(&self, value: &str) -> Result<Capability, DecompressionError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(DecompressionError::Empty);
        }
        self.decompress(&URL_SAFE_NO_PAD.decode(value)?)
    }
}

/// Compress `capability` with the default settings.
pub fn compress(capability: &Capability) -> Result<Vec<u8>, CompressionError> {
    CompressionSettings::default().compress(capability)
}

/// Decompress a capability with the default settings.
pub fn decompress(bytes: &[u8]) -> Result<Capability, DecompressionError> {
    CompressionSettings::default().decompress(bytes)
}

/// Compress and base64url encode `capability` with the default settings.
pub fn encode(capability: &Capability) -> Result<String, CompressionError> {
    CompressionSettings::default().encode(capability)
}

/// Decode a base64url header value with the default settings.
pub fn decode(value: &str) -> Result<Capability, DecompressionError> {
    CompressionSettings::default().decode(value)
}
