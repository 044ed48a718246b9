//! Chunk listing of a project file, for diagnostics.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::chunk::{ChunkKind, PayloadReader};
use super::decode::decompress_body;
use super::records;
use super::{HEADER_SIZE, PROJECT_END, read_file_header};
use crate::codec::{CodecStats, StreamReader};
use crate::error::{PersistError, PersistResult};
use crate::scratch::ScratchBuffer;

/// One chunk of the stream.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkSummary {
  pub kind: ChunkKind,
  /// Offset of the begin magic in the decompressed stream.
  pub offset: usize,
  pub payload_len: usize,
  /// Resource name, for chunks that carry one.
  pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProjectSummary {
  pub version: (u16, u16),
  pub file_len: u64,
  pub codec: CodecStats,
  pub chunks: Vec<ChunkSummary>,
}

impl ProjectSummary {
  pub fn count(&self, kind: ChunkKind) -> usize {
    self.chunks.iter().filter(|c| c.kind == kind).count()
  }

  pub fn payload_bytes(&self, kind: ChunkKind) -> usize {
    self
      .chunks
      .iter()
      .filter(|c| c.kind == kind)
      .map(|c| c.payload_len)
      .sum()
  }
}

impl fmt::Display for ProjectSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(
      f,
      "version {}.{}, {} bytes on disk, {} bytes decompressed ({:.1}%)",
      self.version.0,
      self.version.1,
      self.file_len,
      self.codec.total,
      self.codec.ratio() * 100.0
    )?;
    for kind in ChunkKind::ALL {
      writeln!(
        f,
        "  {:<14} {:>5} chunks {:>12} bytes",
        kind.label(),
        self.count(kind),
        self.payload_bytes(kind)
      )?;
    }
    for chunk in &self.chunks {
      writeln!(
        f,
        "  @{:<10} {:<14} {:>10} bytes  {}",
        chunk.offset,
        chunk.kind.label(),
        chunk.payload_len,
        chunk.name.as_deref().unwrap_or("")
      )?;
    }
    Ok(())
  }
}

/// Reads the record of `kind` and returns its name, if it has one.
fn record_name(kind: ChunkKind, r: &mut PayloadReader<'_>) -> PersistResult<Option<String>> {
  Ok(match kind {
    ChunkKind::Material => Some(records::read_material(r)?.material.name),
    ChunkKind::Texture => Some(records::read_texture(r)?.texture.name),
    ChunkKind::MeshInstance => {
      records::read_mesh_instance(r)?;
      None
    }
    ChunkKind::Mesh => Some(records::read_mesh(r)?.mesh.name),
    ChunkKind::Environment => Some(records::read_environment(r)?.name),
    ChunkKind::Settings => {
      records::read_settings(r)?;
      None
    }
  })
}

/// Lists the chunks of the project file at `path`.
pub fn inspect_project(
  path: &Path,
  scratch: &mut ScratchBuffer,
  reader: &StreamReader,
) -> PersistResult<ProjectSummary> {
  let file = File::open(path).map_err(|e| PersistError::file_io(path, e))?;
  let file_len = file
    .metadata()
    .map_err(|e| PersistError::file_io(path, e))?
    .len();
  let mut source = BufReader::new(file);
  let version = read_file_header(&mut source, path)?;
  let codec = decompress_body(
    &mut source,
    file_len.saturating_sub(HEADER_SIZE as u64),
    scratch,
    reader,
  )?;

  let mut chunks = Vec::new();
  let mut r = PayloadReader::new(scratch.as_slice()).with_blob_limit(scratch.limit());
  loop {
    let offset = r.position();
    let magic = r.magic()?;
    if magic == PROJECT_END {
      break;
    }
    let kind = ChunkKind::from_begin(magic).ok_or(PersistError::CorruptChunk {
      expected: PROJECT_END,
      found: magic,
      offset,
    })?;
    r.expect_end(kind.end());
    let start = r.position();
    let name = record_name(kind, &mut r)?;
    let payload_len = r.position() - start;
    r.expect_magic(kind.end())?;
    r.expect_end(PROJECT_END);
    chunks.push(ChunkSummary {
      kind,
      offset,
      payload_len,
      name,
    });
  }

  Ok(ProjectSummary {
    version,
    file_len,
    codec,
    chunks,
  })
}
