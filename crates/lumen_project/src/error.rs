//! Error taxonomy for project persistence.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::format::chunk::Magic;

/// Errors produced while saving or loading a project.
///
/// File-level errors (`FileIo`, `InvalidMagic`, `InvalidVersion`) are
/// recoverable by the caller; the live scene is never touched when one is
/// returned. `CorruptChunk` abandons the load in progress.
#[derive(Debug, Error)]
pub enum PersistError {
  #[error("cannot access '{}': {source}", path.display())]
  FileIo {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  #[error("not a project file (magic {found:02X?})")]
  InvalidMagic { found: [u8; 4] },

  #[error("unsupported project version {}.{} (expected {}.{})", found.0, found.1, expected.0, expected.1)]
  InvalidVersion {
    found: (u16, u16),
    expected: (u16, u16),
  },

  #[error("compression stream error: {0}")]
  Codec(String),

  #[error("corrupt chunk at byte {offset}: expected {expected}, found {found}")]
  CorruptChunk {
    expected: Magic,
    found: Magic,
    offset: usize,
  },

  #[error("blob of {len} bytes does not fit a record (max {max})")]
  BlobTooLarge { len: usize, max: usize },

  #[error("scratch memory exhausted: needed {needed} bytes, capacity is {capacity}")]
  ScratchExhausted { needed: usize, capacity: usize },

  #[error("{list} list is full (capacity {capacity})")]
  CapacityExceeded { list: &'static str, capacity: usize },

  #[error("host copy of '{name}' is not resident")]
  MissingPayload { name: String },

  #[error("background task panicked: {0}")]
  TaskPanicked(String),
}

impl PersistError {
  /// Wraps an I/O error with the path it occurred on.
  pub fn file_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
    Self::FileIo {
      path: path.into(),
      source,
    }
  }

  /// Returns true for errors caused by a damaged or foreign file rather than
  /// by the environment.
  pub fn is_format_error(&self) -> bool {
    matches!(
      self,
      Self::InvalidMagic { .. }
        | Self::InvalidVersion { .. }
        | Self::CorruptChunk { .. }
        | Self::Codec(_)
    )
  }
}

pub type PersistResult<T> = Result<T, PersistError>;
