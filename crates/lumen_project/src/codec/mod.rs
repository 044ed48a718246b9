//! Compression for project files.
//!
//! - [`stream`]: bounded-memory zlib adapters for the project body
//! - [`lz4`]: block compression for large pixel payloads inside records

pub mod lz4;
pub mod stream;

use serde::{Deserialize, Serialize};
pub use stream::{StreamReader, StreamWriter};

/// Highest accepted compression level (uber compression).
pub const MAX_COMPRESSION_LEVEL: u8 = 10;

/// Compression level of the project body, 0 (store) to 10 (slowest).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct CompressionLevel(u8);

impl CompressionLevel {
  pub const STORE: Self = Self(0);
  pub const FAST: Self = Self(1);
  pub const DEFAULT: Self = Self(6);
  pub const BEST: Self = Self(MAX_COMPRESSION_LEVEL);

  /// Creates a level, clamping values above 10.
  pub fn new(level: u8) -> Self {
    Self(level.min(MAX_COMPRESSION_LEVEL))
  }

  pub fn get(self) -> u8 {
    self.0
  }
}

impl Default for CompressionLevel {
  fn default() -> Self {
    Self::DEFAULT
  }
}

impl From<u8> for CompressionLevel {
  fn from(level: u8) -> Self {
    Self::new(level)
  }
}

impl From<CompressionLevel> for u8 {
  fn from(level: CompressionLevel) -> Self {
    level.0
  }
}

/// Buffer sizes used by the streaming adapters.
///
/// Zero sizes are clamped to one byte; the codec output does not depend on
/// these values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecBuffers {
  /// Uncompressed bytes staged before each compressor call.
  pub staging: usize,
  /// Compressor/decompressor output buffer.
  pub output: usize,
  /// Compressed bytes read from the source per decompressor call.
  pub input: usize,
}

impl CodecBuffers {
  pub const fn uniform(size: usize) -> Self {
    Self {
      staging: size,
      output: size,
      input: size,
    }
  }

  pub(crate) fn clamped(self) -> Self {
    Self {
      staging: self.staging.max(1),
      output: self.output.max(1),
      input: self.input.max(1),
    }
  }
}

impl Default for CodecBuffers {
  fn default() -> Self {
    Self::uniform(64 * 1024)
  }
}

/// Byte counters collected by the streaming adapters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CodecStats {
  /// Uncompressed bytes.
  pub total: u64,
  /// Compressed bytes.
  pub total_compressed: u64,
}

impl CodecStats {
  /// Compressed size as a fraction of the uncompressed size.
  pub fn ratio(&self) -> f64 {
    if self.total == 0 {
      return 1.0;
    }
    self.total_compressed as f64 / self.total as f64
  }
}
