//! Project decoder (first pass).
//!
//! Decoding produces a [`DecodedProject`]: plain records whose references are
//! still file-local ids. It touches neither the registry nor any resource
//! list, so it can run on the worker thread; [`super::import`] resolves the
//! ids on the main thread.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use super::chunk::{ChunkKind, PayloadReader};
use super::records::{self, MaterialRecord, MeshInstanceRecord, MeshRecord, TextureRecord};
use super::{HEADER_SIZE, PROJECT_END, PersistObserver, read_file_header, read_header};
use crate::codec::{CodecStats, StreamReader};
use crate::error::{PersistError, PersistResult};
use crate::model::{Environment, Settings};
use crate::scratch::ScratchBuffer;

/// Records of one project file, in file order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedProject {
  pub materials: Vec<MaterialRecord>,
  pub textures: Vec<TextureRecord>,
  pub mesh_instances: Vec<MeshInstanceRecord>,
  pub meshes: Vec<MeshRecord>,
  pub environments: Vec<Environment>,
  /// Absent when the file has no SET chunk.
  pub settings: Option<Settings>,
  pub codec: CodecStats,
}

/// Walks a decompressed chunk stream up to [`PROJECT_END`].
///
/// Chunks may appear in any order. A begin magic that names no known chunk,
/// a mismatching end magic or a truncated payload is a
/// [`PersistError::CorruptChunk`], as is a nested blob that would decode to
/// more than `blob_limit` bytes.
#[cfg_attr(feature = "tracy", tracing::instrument(skip_all))]
pub fn parse_chunks(data: &[u8], blob_limit: usize) -> PersistResult<DecodedProject> {
  let mut project = DecodedProject::default();
  let mut r = PayloadReader::new(data).with_blob_limit(blob_limit);

  loop {
    let offset = r.position();
    let magic = r.magic()?;
    if magic == PROJECT_END {
      break;
    }
    let Some(kind) = ChunkKind::from_begin(magic) else {
      return Err(PersistError::CorruptChunk {
        expected: PROJECT_END,
        found: magic,
        offset,
      });
    };

    r.expect_end(kind.end());
    match kind {
      ChunkKind::Material => project.materials.push(records::read_material(&mut r)?),
      ChunkKind::Texture => project.textures.push(records::read_texture(&mut r)?),
      ChunkKind::MeshInstance => project
        .mesh_instances
        .push(records::read_mesh_instance(&mut r)?),
      ChunkKind::Mesh => project.meshes.push(records::read_mesh(&mut r)?),
      ChunkKind::Environment => project.environments.push(records::read_environment(&mut r)?),
      ChunkKind::Settings => {
        if project.settings.is_some() {
          log::warn!("duplicate settings chunk at byte {offset}, keeping the last one");
        }
        project.settings = Some(records::read_settings(&mut r)?);
      }
    }
    r.expect_magic(kind.end())?;
    r.expect_end(PROJECT_END);
  }

  if r.remaining() > 0 {
    log::warn!("ignoring {} bytes after project end", r.remaining());
  }

  Ok(project)
}

/// Inflates `body_len` compressed bytes from `source` into `scratch`.
pub fn decompress_body<R: Read>(
  source: &mut R,
  body_len: u64,
  scratch: &mut ScratchBuffer,
  reader: &StreamReader,
) -> PersistResult<CodecStats> {
  scratch.reset();
  let stats = reader.read_into(source, body_len, scratch)?;
  log::debug!(
    "decompressed {} -> {} bytes (scratch high water {})",
    stats.total_compressed,
    stats.total,
    scratch.high_water()
  );
  Ok(stats)
}

/// Decodes a complete project file held in memory.
pub fn decode_project(
  bytes: &[u8],
  scratch: &mut ScratchBuffer,
  reader: &StreamReader,
) -> PersistResult<DecodedProject> {
  let mut source = Cursor::new(bytes);
  read_header(&mut source)?;
  let body_len = bytes.len().saturating_sub(HEADER_SIZE) as u64;
  let codec = decompress_body(&mut source, body_len, scratch, reader)?;
  let mut project = parse_chunks(scratch.as_slice(), scratch.limit())?;
  project.codec = codec;
  Ok(project)
}

/// Reads and decodes the project file at `path`.
///
/// The header is validated before anything else is read; on a magic or
/// version mismatch nothing past the header is touched. `observer.on_opened`
/// fires once the header was accepted. Every failure is passed to
/// `observer.on_failure` before it is returned.
#[cfg_attr(feature = "tracy", tracing::instrument(skip_all))]
pub fn load_project(
  path: &Path,
  scratch: &mut ScratchBuffer,
  reader: &StreamReader,
  observer: &mut dyn PersistObserver,
) -> PersistResult<DecodedProject> {
  let result = (|| -> PersistResult<DecodedProject> {
    let file = File::open(path).map_err(|e| PersistError::file_io(path, e))?;
    observer.on_file_opened(path);
    let file_len = file
      .metadata()
      .map_err(|e| PersistError::file_io(path, e))?
      .len();

    let mut source = BufReader::new(file);
    read_file_header(&mut source, path)?;
    observer.on_opened(path);

    let body_len = file_len.saturating_sub(HEADER_SIZE as u64);
    let codec = decompress_body(&mut source, body_len, scratch, reader)?;
    let mut project = parse_chunks(scratch.as_slice(), scratch.limit())?;
    project.codec = codec;
    Ok(project)
  })();

  match &result {
    Ok(project) => log::info!(
      "loaded {}: {} materials, {} textures, {} instances, {} meshes, {} environments",
      path.display(),
      project.materials.len(),
      project.textures.len(),
      project.mesh_instances.len(),
      project.meshes.len(),
      project.environments.len(),
    ),
    Err(e) => {
      log::error!("loading {} failed: {e}", path.display());
      observer.on_failure(e);
    }
  }
  result
}
