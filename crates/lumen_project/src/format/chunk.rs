//! Chunk magics and little-endian payload primitives.

use std::fmt;

use glam::Vec3;

use crate::error::{PersistError, PersistResult};

/// Four-byte tag delimiting chunks and the file itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Magic(pub [u8; 4]);

impl Magic {
  /// Builds a magic from the first four bytes of `bytes`, zero-padded.
  pub fn from_prefix(bytes: &[u8]) -> Self {
    let mut out = [0u8; 4];
    let n = bytes.len().min(4);
    out[..n].copy_from_slice(&bytes[..n]);
    Self(out)
  }
}

impl fmt::Display for Magic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("'")?;
    for &b in &self.0 {
      if b.is_ascii_alphanumeric() {
        write!(f, "{}", b as char)?;
      } else {
        write!(f, "\\x{b:02X}")?;
      }
    }
    f.write_str("'")
  }
}

impl fmt::Debug for Magic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Magic({self})")
  }
}

/// Chunk record kinds, in the order the encoder writes them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkKind {
  Material,
  Texture,
  MeshInstance,
  Mesh,
  Environment,
  Settings,
}

impl ChunkKind {
  pub const ALL: [Self; 6] = [
    Self::Material,
    Self::Texture,
    Self::MeshInstance,
    Self::Mesh,
    Self::Environment,
    Self::Settings,
  ];

  /// Position in [`Self::ALL`].
  pub fn index(self) -> usize {
    self as usize
  }

  fn tag(self) -> [u8; 3] {
    match self {
      Self::Material => *b"MAT",
      Self::Texture => *b"TEX",
      Self::MeshInstance => *b"MIN",
      Self::Mesh => *b"MSH",
      Self::Environment => *b"ENV",
      Self::Settings => *b"SET",
    }
  }

  /// Magic opening a chunk of this kind (tag followed by 0).
  pub fn begin(self) -> Magic {
    let [a, b, c] = self.tag();
    Magic([a, b, c, 0])
  }

  /// Magic closing a chunk of this kind (tag followed by 1).
  pub fn end(self) -> Magic {
    let [a, b, c] = self.tag();
    Magic([a, b, c, 1])
  }

  /// Looks up the kind whose begin magic is `magic`.
  pub fn from_begin(magic: Magic) -> Option<Self> {
    Self::ALL.into_iter().find(|kind| kind.begin() == magic)
  }

  pub fn label(self) -> &'static str {
    match self {
      Self::Material => "material",
      Self::Texture => "texture",
      Self::MeshInstance => "mesh instance",
      Self::Mesh => "mesh",
      Self::Environment => "environment",
      Self::Settings => "settings",
    }
  }
}

/// File-local id meaning "no reference".
pub const NO_ID: u32 = u32::MAX;

/// Largest blob a `u32` length prefix can describe.
pub const MAX_BLOB_LEN: usize = u32::MAX as usize;

/// Accumulates one chunk payload.
///
/// A blob too long for its length prefix is remembered and reported by
/// [`Self::finish`]; nothing is truncated.
pub struct PayloadWriter {
  buf: Vec<u8>,
  max_blob: usize,
  oversized: Option<usize>,
}

impl Default for PayloadWriter {
  fn default() -> Self {
    Self {
      buf: Vec::new(),
      max_blob: MAX_BLOB_LEN,
      oversized: None,
    }
  }
}

impl PayloadWriter {
  pub fn new() -> Self {
    Self::default()
  }

  #[cfg(test)]
  fn with_max_blob(max_blob: usize) -> Self {
    Self {
      max_blob,
      ..Self::default()
    }
  }

  pub fn u8(&mut self, v: u8) {
    self.buf.push(v);
  }

  pub fn u16(&mut self, v: u16) {
    self.buf.extend_from_slice(&v.to_le_bytes());
  }

  pub fn u32(&mut self, v: u32) {
    self.buf.extend_from_slice(&v.to_le_bytes());
  }

  pub fn f32(&mut self, v: f32) {
    self.buf.extend_from_slice(&v.to_le_bytes());
  }

  pub fn bool(&mut self, v: bool) {
    self.u8(u8::from(v));
  }

  pub fn f32s(&mut self, values: &[f32]) {
    for &v in values {
      self.f32(v);
    }
  }

  pub fn vec3(&mut self, v: Vec3) {
    self.f32s(&v.to_array());
  }

  /// Optional file-local id, [`NO_ID`] when absent.
  pub fn id(&mut self, id: Option<u32>) {
    self.u32(id.unwrap_or(NO_ID));
  }

  /// Length-prefixed byte blob.
  pub fn bytes(&mut self, bytes: &[u8]) {
    match u32::try_from(bytes.len()) {
      Ok(len) if bytes.len() <= self.max_blob => {
        self.u32(len);
        self.buf.extend_from_slice(bytes);
      }
      _ => {
        self.oversized.get_or_insert(bytes.len());
      }
    }
  }

  /// Length-prefixed UTF-8 string.
  pub fn str(&mut self, s: &str) {
    self.bytes(s.as_bytes());
  }

  pub fn len(&self) -> usize {
    self.buf.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buf.is_empty()
  }

  /// The finished payload, or [`PersistError::BlobTooLarge`] if a blob
  /// did not fit its length prefix.
  pub fn finish(self) -> PersistResult<Vec<u8>> {
    match self.oversized {
      Some(len) => Err(PersistError::BlobTooLarge {
        len,
        max: self.max_blob,
      }),
      None => Ok(self.buf),
    }
  }
}

/// Cursor over the decompressed chunk stream.
///
/// Every read past the end of the data is reported as a
/// [`PersistError::CorruptChunk`] against the end magic of the chunk being
/// read.
pub struct PayloadReader<'a> {
  data: &'a [u8],
  pos: usize,
  expected: Magic,
  blob_limit: usize,
}

impl<'a> PayloadReader<'a> {
  pub fn new(data: &'a [u8]) -> Self {
    Self {
      data,
      pos: 0,
      expected: crate::format::PROJECT_END,
      blob_limit: MAX_BLOB_LEN,
    }
  }

  /// Caps the decoded size of nested blobs (see [`Self::blob_limit`]).
  pub fn with_blob_limit(mut self, limit: usize) -> Self {
    self.blob_limit = limit;
    self
  }

  /// Largest decoded blob a record may expand to. Decoding uses the scratch
  /// limit so nested payloads stay within the same memory bound as the body.
  pub fn blob_limit(&self) -> usize {
    self.blob_limit
  }

  /// Byte offset into the decompressed stream.
  pub fn position(&self) -> usize {
    self.pos
  }

  pub fn remaining(&self) -> usize {
    self.data.len() - self.pos
  }

  /// Sets the magic reported when a payload read runs out of data.
  pub fn expect_end(&mut self, magic: Magic) {
    self.expected = magic;
  }

  /// Corruption error at the current position.
  pub fn corrupt(&self) -> PersistError {
    PersistError::CorruptChunk {
      expected: self.expected,
      found: Magic::from_prefix(&self.data[self.pos..]),
      offset: self.pos,
    }
  }

  fn take(&mut self, n: usize) -> PersistResult<&'a [u8]> {
    if self.remaining() < n {
      return Err(self.corrupt());
    }
    let slice = &self.data[self.pos..self.pos + n];
    self.pos += n;
    Ok(slice)
  }

  fn array<const N: usize>(&mut self) -> PersistResult<[u8; N]> {
    let mut out = [0u8; N];
    out.copy_from_slice(self.take(N)?);
    Ok(out)
  }

  pub fn magic(&mut self) -> PersistResult<Magic> {
    self.array().map(Magic)
  }

  /// Reads a magic and fails unless it equals `expected`.
  pub fn expect_magic(&mut self, expected: Magic) -> PersistResult<()> {
    let offset = self.pos;
    let found = self.magic()?;
    if found != expected {
      return Err(PersistError::CorruptChunk {
        expected,
        found,
        offset,
      });
    }
    Ok(())
  }

  pub fn u8(&mut self) -> PersistResult<u8> {
    Ok(self.array::<1>()?[0])
  }

  pub fn u16(&mut self) -> PersistResult<u16> {
    self.array().map(u16::from_le_bytes)
  }

  pub fn u32(&mut self) -> PersistResult<u32> {
    self.array().map(u32::from_le_bytes)
  }

  pub fn f32(&mut self) -> PersistResult<f32> {
    self.array().map(f32::from_le_bytes)
  }

  pub fn bool(&mut self) -> PersistResult<bool> {
    Ok(self.u8()? != 0)
  }

  pub fn f32s<const N: usize>(&mut self) -> PersistResult<[f32; N]> {
    let mut out = [0f32; N];
    for v in &mut out {
      *v = self.f32()?;
    }
    Ok(out)
  }

  pub fn vec3(&mut self) -> PersistResult<Vec3> {
    self.f32s::<3>().map(Vec3::from_array)
  }

  pub fn id(&mut self) -> PersistResult<Option<u32>> {
    let id = self.u32()?;
    Ok((id != NO_ID).then_some(id))
  }

  pub fn bytes(&mut self) -> PersistResult<&'a [u8]> {
    let len = self.u32()? as usize;
    self.take(len)
  }

  /// Reads a string; invalid UTF-8 is replaced rather than rejected.
  pub fn string(&mut self) -> PersistResult<String> {
    Ok(String::from_utf8_lossy(self.bytes()?).into_owned())
  }
}
