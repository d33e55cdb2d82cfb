//! Chunk compression for timestep records
//!
//! Provides LZ4 and Zstd compression for the per-timestep chunk payloads.
//!
//! **Policy**:
//! - Compression threshold: only compress payloads >= `threshold` bytes
//! - Fallback: store uncompressed if the ratio is not below `min_ratio`
//! - The method actually used is recorded in each chunk header, so a file
//!   can mix compressed and raw chunks

use crate::error::{Result, TrajectoryError};
use serde::{Deserialize, Serialize};

/// Compression method for chunk payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CompressionMethod {
    /// No compression
    None = 0,
    /// LZ4 compression (fast, moderate ratio)
    Lz4 = 1,
    /// Zstd compression (slower, better ratio)
    Zstd = 2,
}

impl CompressionMethod {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionMethod::None),
            1 => Some(CompressionMethod::Lz4),
            2 => Some(CompressionMethod::Zstd),
            _ => None,
        }
    }
}

/// Compression configuration
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Compression method to use
    pub method: CompressionMethod,

    /// Minimum payload size to compress (bytes)
    pub threshold: usize,

    /// Minimum compression ratio (compressed_size / original_size)
    /// If ratio is worse than this, store uncompressed
    pub min_ratio: f32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        CompressionConfig {
            method: CompressionMethod::Lz4,
            threshold: 512,
            min_ratio: 0.9,
        }
    }
}

impl CompressionConfig {
    /// Create config with no compression
    pub fn none() -> Self {
        CompressionConfig {
            method: CompressionMethod::None,
            threshold: usize::MAX,
            min_ratio: 0.0,
        }
    }

    /// Create config with LZ4 compression
    pub fn lz4() -> Self {
        CompressionConfig {
            method: CompressionMethod::Lz4,
            ..Default::default()
        }
    }

    /// Create config with Zstd compression
    pub fn zstd() -> Self {
        CompressionConfig {
            method: CompressionMethod::Zstd,
            threshold: 1024, // Zstd overhead is higher
            min_ratio: 0.85,
        }
    }

    /// Config for a method with its default tuning
    pub fn for_method(method: CompressionMethod) -> Self {
        match method {
            CompressionMethod::None => Self::none(),
            CompressionMethod::Lz4 => Self::lz4(),
            CompressionMethod::Zstd => Self::zstd(),
        }
    }
}

/// Compress data using the specified method
pub fn compress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Lz4 => Ok(lz4_flex::compress(data)),
        CompressionMethod::Zstd => Ok(zstd::bulk::compress(data, 3)?),
    }
}

/// Decompress data using the specified method
///
/// `raw_len` is the uncompressed length recorded in the chunk header.
pub fn decompress(data: &[u8], method: CompressionMethod, raw_len: usize) -> Result<Vec<u8>> {
    let decompressed = match method {
        CompressionMethod::None => data.to_vec(),
        CompressionMethod::Lz4 => lz4_flex::decompress(data, raw_len).map_err(|e| {
            TrajectoryError::Corrupt(format!("LZ4 decompression failed: {}", e))
        })?,
        CompressionMethod::Zstd => zstd::bulk::decompress(data, raw_len).map_err(|e| {
            TrajectoryError::Corrupt(format!("Zstd decompression failed: {}", e))
        })?,
    };

    if decompressed.len() != raw_len {
        return Err(TrajectoryError::Corrupt(format!(
            "decompressed {} bytes, header says {}",
            decompressed.len(),
            raw_len
        )));
    }

    Ok(decompressed)
}

/// Compress data if beneficial, returns (data, method_used)
pub fn compress_if_beneficial(
    data: &[u8],
    config: &CompressionConfig,
) -> Result<(Vec<u8>, CompressionMethod)> {
    if data.len() < config.threshold || config.method == CompressionMethod::None {
        return Ok((data.to_vec(), CompressionMethod::None));
    }

    let compressed = compress(data, config.method)?;

    let ratio = compressed.len() as f32 / data.len() as f32;
    if ratio < config.min_ratio {
        Ok((compressed, config.method))
    } else {
        Ok((data.to_vec(), CompressionMethod::None))
    }
}
