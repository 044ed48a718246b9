//! Bounded scratch memory for decompressed project bodies.
//!
//! A single [`ScratchBuffer`] is allocated at startup and handed back and
//! forth between the main thread and the worker. It grows on demand up to a
//! fixed limit and keeps its allocation across [`ScratchBuffer::reset`].

use crate::error::{PersistError, PersistResult};

/// Default scratch limit (256 MiB).
pub const DEFAULT_SCRATCH_LIMIT: usize = 256 * 1024 * 1024;

/// Growable byte buffer with a hard upper bound.
#[derive(Debug)]
pub struct ScratchBuffer {
  data: Vec<u8>,
  limit: usize,
  high_water: usize,
}

impl Default for ScratchBuffer {
  fn default() -> Self {
    Self::new(DEFAULT_SCRATCH_LIMIT)
  }
}

impl ScratchBuffer {
  /// Creates an empty buffer that may grow to `limit` bytes.
  pub fn new(limit: usize) -> Self {
    Self {
      data: Vec::new(),
      limit,
      high_water: 0,
    }
  }

  /// Appends bytes, failing once the limit would be exceeded.
  pub fn extend_from_slice(&mut self, bytes: &[u8]) -> PersistResult<()> {
    let needed = self.data.len() + bytes.len();
    if needed > self.limit {
      return Err(PersistError::ScratchExhausted {
        needed,
        capacity: self.limit,
      });
    }
    self.data.extend_from_slice(bytes);
    self.high_water = self.high_water.max(self.data.len());
    Ok(())
  }

  pub fn as_slice(&self) -> &[u8] {
    &self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// Maximum number of bytes this buffer may hold.
  pub fn limit(&self) -> usize {
    self.limit
  }

  /// Largest fill level seen since creation.
  pub fn high_water(&self) -> usize {
    self.high_water
  }

  /// Discards the contents but keeps the allocation for the next run.
  pub fn reset(&mut self) {
    self.data.clear();
  }
}
