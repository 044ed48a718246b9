//! Project encoder.
//!
//! Chunk order: every material, then each texture the materials use (once),
//! every mesh instance, then each mesh the instances use (once), every
//! environment, the settings and finally [`PROJECT_END`].

use std::collections::HashMap;
use std::fs::File;
use std::hash::Hash;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use super::chunk::{ChunkKind, PayloadWriter};
use super::records;
use super::{PROJECT_END, PersistObserver, write_header};
use crate::codec::{CodecBuffers, CodecStats, CompressionLevel, StreamWriter};
use crate::error::{PersistError, PersistResult};
use crate::lists::ResourceLists;
use crate::model::{Environment, Material, Mesh, MeshInstance, Settings, TEXTURE_SLOTS, Texture};
use crate::registry::{MaterialHandle, MeshHandle, Registry, TextureHandle};

/// Everything a save needs, detached from the registry.
///
/// Payloads are shared `Arc`s, so capturing is cheap and the snapshot can be
/// moved to the worker thread.
#[derive(Clone, Debug, Default)]
pub struct ProjectSnapshot {
  pub materials: Vec<(MaterialHandle, Arc<Material>)>,
  pub textures: HashMap<TextureHandle, Arc<Texture>>,
  pub mesh_instances: Vec<MeshInstance>,
  pub meshes: HashMap<MeshHandle, Arc<Mesh>>,
  pub environments: Vec<Arc<Environment>>,
  pub settings: Settings,
}

fn resident<T>(payload: Option<Arc<T>>, name: Option<&str>) -> PersistResult<Arc<T>> {
  payload.ok_or_else(|| PersistError::MissingPayload {
    name: name.unwrap_or("<released>").to_owned(),
  })
}

impl ProjectSnapshot {
  /// Collects the payloads of everything in `lists`.
  ///
  /// Fails with [`PersistError::MissingPayload`] when a host copy was freed.
  pub fn capture(
    lists: &ResourceLists,
    registry: &Registry,
    settings: &Settings,
  ) -> PersistResult<Self> {
    let mut snapshot = Self {
      settings: settings.clone(),
      ..Self::default()
    };

    for &handle in &lists.materials {
      let material = resident(
        registry.materials.payload(handle),
        registry.materials.name(handle),
      )?;
      for texture in material.texture_handles() {
        if !snapshot.textures.contains_key(&texture) {
          let payload = resident(
            registry.textures.payload(texture),
            registry.textures.name(texture),
          )?;
          snapshot.textures.insert(texture, payload);
        }
      }
      snapshot.materials.push((handle, material));
    }

    for instance in &lists.mesh_instances {
      if !snapshot.meshes.contains_key(&instance.mesh) {
        let payload = resident(
          registry.meshes.payload(instance.mesh),
          registry.meshes.name(instance.mesh),
        )?;
        snapshot.meshes.insert(instance.mesh, payload);
      }
      snapshot.mesh_instances.push(instance.clone());
    }

    for &handle in &lists.environments {
      snapshot.environments.push(resident(
        registry.environments.payload(handle),
        registry.environments.name(handle),
      )?);
    }

    Ok(snapshot)
  }
}

/// Per-kind chunk counts and payload sizes of one encode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EncodeStats {
  pub chunks: [usize; 6],
  pub payload_bytes: [u64; 6],
  pub codec: CodecStats,
}

impl EncodeStats {
  pub fn count(&self, kind: ChunkKind) -> usize {
    self.chunks[kind.index()]
  }

  pub fn payload_bytes(&self, kind: ChunkKind) -> u64 {
    self.payload_bytes[kind.index()]
  }
}

/// Assigns dense ids in order of first appearance.
struct DenseIds<K> {
  ids: HashMap<K, u32>,
  order: Vec<K>,
}

impl<K: Copy + Eq + Hash> DenseIds<K> {
  fn new() -> Self {
    Self {
      ids: HashMap::new(),
      order: Vec::new(),
    }
  }

  fn intern(&mut self, key: K) -> u32 {
    if let Some(&id) = self.ids.get(&key) {
      return id;
    }
    let id = self.order.len() as u32;
    self.order.push(key);
    self.ids.insert(key, id);
    id
  }
}

struct ChunkSink<'a, W: Write> {
  stream: &'a mut StreamWriter<W>,
  stats: EncodeStats,
}

impl<W: Write> ChunkSink<'_, W> {
  fn write(&mut self, kind: ChunkKind, payload: PayloadWriter) -> PersistResult<()> {
    let payload = payload.finish()?;
    let len = payload.len();
    self.stream.write_bytes(&kind.begin().0)?;
    self.stream.write_bytes(&payload)?;
    self.stream.write_bytes(&kind.end().0)?;

    self.stats.chunks[kind.index()] += 1;
    self.stats.payload_bytes[kind.index()] += len as u64;
    log::debug!("{} chunk: {len} bytes", kind.label());
    Ok(())
  }
}

/// Writes the header and the compressed chunk stream into `sink`.
#[cfg_attr(feature = "tracy", tracing::instrument(skip_all))]
pub fn encode_project<W: Write>(
  mut sink: W,
  snapshot: &ProjectSnapshot,
  level: CompressionLevel,
  buffers: CodecBuffers,
) -> PersistResult<(W, EncodeStats)> {
  write_header(&mut sink)?;
  let mut stream = StreamWriter::new(sink, level, buffers);
  let mut out = ChunkSink {
    stream: &mut stream,
    stats: EncodeStats::default(),
  };

  let material_ids: HashMap<MaterialHandle, u32> = snapshot
    .materials
    .iter()
    .enumerate()
    .map(|(i, (handle, _))| (*handle, i as u32))
    .collect();

  let mut texture_ids = DenseIds::new();
  for (_, material) in &snapshot.materials {
    let mut ids = [None; TEXTURE_SLOTS];
    for (id, slot) in ids.iter_mut().zip(&material.textures) {
      *id = slot
        .filter(|h| snapshot.textures.contains_key(h))
        .map(|h| texture_ids.intern(h));
    }
    let mut w = PayloadWriter::new();
    records::write_material(&mut w, material, &ids);
    out.write(ChunkKind::Material, w)?;
  }

  for (id, handle) in texture_ids.order.iter().enumerate() {
    if let Some(texture) = snapshot.textures.get(handle) {
      let mut w = PayloadWriter::new();
      records::write_texture(&mut w, id as u32, texture);
      out.write(ChunkKind::Texture, w)?;
    }
  }

  let mut mesh_ids = DenseIds::new();
  for instance in &snapshot.mesh_instances {
    let mesh_id = snapshot
      .meshes
      .contains_key(&instance.mesh)
      .then(|| mesh_ids.intern(instance.mesh));
    let materials: Vec<Option<u32>> = instance
      .materials
      .iter()
      .map(|m| m.and_then(|h| material_ids.get(&h).copied()))
      .collect();
    let mut w = PayloadWriter::new();
    records::write_mesh_instance(&mut w, mesh_id, &materials, &instance.transform);
    out.write(ChunkKind::MeshInstance, w)?;
  }

  for (id, handle) in mesh_ids.order.iter().enumerate() {
    if let Some(mesh) = snapshot.meshes.get(handle) {
      let mut w = PayloadWriter::new();
      records::write_mesh(&mut w, id as u32, mesh);
      out.write(ChunkKind::Mesh, w)?;
    }
  }

  for environment in &snapshot.environments {
    let mut w = PayloadWriter::new();
    records::write_environment(&mut w, environment);
    out.write(ChunkKind::Environment, w)?;
  }

  let mut w = PayloadWriter::new();
  records::write_settings(&mut w, &snapshot.settings);
  out.write(ChunkKind::Settings, w)?;

  let mut stats = out.stats;
  stream.write_bytes(&PROJECT_END.0)?;
  let (sink, codec) = stream.finish()?;
  stats.codec = codec;

  log::info!(
    "encoded project: {} materials, {} textures, {} instances, {} meshes, {} environments, \
     {} -> {} bytes",
    stats.count(ChunkKind::Material),
    stats.count(ChunkKind::Texture),
    stats.count(ChunkKind::MeshInstance),
    stats.count(ChunkKind::Mesh),
    stats.count(ChunkKind::Environment),
    codec.total,
    codec.total_compressed,
  );

  Ok((sink, stats))
}

/// Writes `snapshot` to `path`.
///
/// Failure to create the file is reported as [`PersistError::FileIo`]; every
/// failure is passed to `observer.on_failure` before it is returned.
pub fn save_project(
  path: &Path,
  snapshot: &ProjectSnapshot,
  level: CompressionLevel,
  buffers: CodecBuffers,
  observer: &mut dyn PersistObserver,
) -> PersistResult<EncodeStats> {
  let result = (|| -> PersistResult<EncodeStats> {
    let file = File::create(path).map_err(|e| PersistError::file_io(path, e))?;
    observer.on_file_opened(path);
    observer.on_opened(path);

    let (writer, stats) = encode_project(BufWriter::new(file), snapshot, level, buffers)?;
    writer
      .into_inner()
      .map_err(|e| PersistError::file_io(path, e.into_error()))?
      .sync_all()
      .map_err(|e| PersistError::file_io(path, e))?;
    Ok(stats)
  })();

  if let Err(e) = &result {
    log::error!("saving {} failed: {e}", path.display());
    observer.on_failure(e);
  }
  result
}
