//! Chunked binary project format.
//!
//! A project file is a short uncompressed header followed by a single zlib
//! stream of chunk records:
//!
//! ```text
//! 'c' 's' 0x06 0x09   file magic
//! u16 u16             version major, minor
//! --- zlib ---
//! { begin magic, payload, end magic }*
//! 0x09 0x06 'c' 's'   project end
//! ```
//!
//! - [`chunk`]: magic values and little-endian payload primitives
//! - [`records`]: per-resource payload layouts
//! - [`encode`]: writes a [`ProjectSnapshot`](encode::ProjectSnapshot)
//! - [`decode`]: reads a file into a [`DecodedProject`](decode::DecodedProject)
//! - [`import`]: registers a decoded project into the registry
//! - [`inspect`]: summarizes a file without building resources

pub mod chunk;
pub mod decode;
pub mod encode;
pub mod import;
pub mod inspect;
pub mod records;

use std::io::{Read, Write};
use std::path::Path;

pub use chunk::{ChunkKind, Magic};
pub use decode::{DecodedProject, decode_project, load_project};
pub use encode::{EncodeStats, ProjectSnapshot, encode_project, save_project};
pub use import::{ImportReport, import_project};
pub use inspect::{ChunkSummary, ProjectSummary, inspect_project};

use crate::error::{PersistError, PersistResult};

/// Magic bytes at the start of every project file.
pub const FILE_MAGIC: Magic = Magic([b'c', b's', 0x06, 0x09]);

/// Terminates the chunk stream.
pub const PROJECT_END: Magic = Magic([0x09, 0x06, b'c', b's']);

/// Format version written by this build.
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;

/// Header size in bytes (magic + two u16 version fields).
pub const HEADER_SIZE: usize = 8;

/// Receives synchronous notifications from [`save_project`] and
/// [`load_project`].
///
/// Callbacks run on whichever thread performs the I/O.
pub trait PersistObserver {
  /// The file was opened (or created).
  fn on_file_opened(&mut self, _path: &Path) {}

  /// Decode: magic and version validated. Encode: destination created.
  fn on_opened(&mut self, _path: &Path) {}

  /// The operation failed; called once, right before the error is returned.
  fn on_failure(&mut self, _error: &PersistError) {}
}

/// Observer that ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl PersistObserver for NoopObserver {}

/// Writes the uncompressed file header.
pub fn write_header<W: Write>(writer: &mut W) -> PersistResult<()> {
  writer.write_all(&FILE_MAGIC.0)?;
  writer.write_all(&VERSION_MAJOR.to_le_bytes())?;
  writer.write_all(&VERSION_MINOR.to_le_bytes())?;
  Ok(())
}

/// Reads and validates the file header.
///
/// The version is only read once the magic matched; a mismatching version is
/// rejected without reading any further. Input shorter than the magic is
/// [`PersistError::InvalidMagic`].
pub fn read_header<R: Read>(reader: &mut R) -> PersistResult<(u16, u16)> {
  let mut magic = Vec::with_capacity(FILE_MAGIC.0.len());
  reader
    .by_ref()
    .take(FILE_MAGIC.0.len() as u64)
    .read_to_end(&mut magic)?;
  if magic != FILE_MAGIC.0 {
    return Err(PersistError::InvalidMagic {
      found: Magic::from_prefix(&magic).0,
    });
  }

  let mut version = [0u8; 4];
  reader.read_exact(&mut version)?;
  let major = u16::from_le_bytes([version[0], version[1]]);
  let minor = u16::from_le_bytes([version[2], version[3]]);
  if (major, minor) != (VERSION_MAJOR, VERSION_MINOR) {
    return Err(PersistError::InvalidVersion {
      found: (major, minor),
      expected: (VERSION_MAJOR, VERSION_MINOR),
    });
  }

  Ok((major, minor))
}

/// [`read_header`] on an opened file; read failures carry `path`.
pub(crate) fn read_file_header<R: Read>(reader: &mut R, path: &Path) -> PersistResult<(u16, u16)> {
  read_header(reader).map_err(|e| match e {
    PersistError::Io(source) => PersistError::file_io(path, source),
    other => other,
  })
}
