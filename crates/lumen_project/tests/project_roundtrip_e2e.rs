//! E2E tests for the project file format.
//!
//! Tests:
//! - Save/load cycle preserves every resource and the settings
//! - Textures shared by materials are stored once
//! - Header gates (magic, version) stop before the body is read
//! - Corrupted and truncated bodies are rejected with typed errors
//! - Inspection lists the chunk stream

mod common;

use std::io::Cursor;
use std::path::{Path, PathBuf};

use common::{SceneShape, populate, upload_all};
use lumen_project::format::{
  ChunkKind, FILE_MAGIC, HEADER_SIZE, Magic, NoopObserver, VERSION_MAJOR, VERSION_MINOR,
  inspect_project,
};
use lumen_project::model::{Background, Tonemap};
use lumen_project::{
  CodecBuffers, CompressionLevel, DecodedProject, EncodeStats, HeadlessGpu, InstanceTransform,
  Material, MeshInstance,
  PersistError, PersistObserver, ProjectSnapshot, Registry, ResourceLists, ScratchBuffer, Settings,
  StreamReader, StreamWriter, TextureSlot, decode_project, encode_project,
  import_project, load_project, save_project,
};
use tempfile::TempDir;

/// Records which observer callbacks fired.
#[derive(Default)]
struct Recorder {
  file_opened: bool,
  opened: bool,
  failures: Vec<String>,
}

impl PersistObserver for Recorder {
  fn on_file_opened(&mut self, _path: &Path) {
    self.file_opened = true;
  }

  fn on_opened(&mut self, _path: &Path) {
    self.opened = true;
  }

  fn on_failure(&mut self, error: &PersistError) {
    self.failures.push(error.to_string());
  }
}

struct FormatHarness {
  registry: Registry,
  lists: ResourceLists,
  settings: Settings,
  temp_dir: TempDir,
}

impl FormatHarness {
  fn new(shape: SceneShape) -> Self {
    let mut registry = Registry::new();
    let mut lists = ResourceLists::new();
    populate(&mut registry, &mut lists, shape);
    Self {
      registry,
      lists,
      settings: Settings {
        background: Background::Radiance,
        background_lod: 2.0,
        exposure: 1.25,
        tonemap: Tonemap::Reinhard,
        fxaa: false,
        camera_yaw: 0.75,
        camera_pitch: -0.3,
        environment_rotation: 1.5,
        selected_environment: 1,
        selected_mesh_instance: 1,
        ..Settings::default()
      },
      temp_dir: TempDir::new().unwrap(),
    }
  }

  fn path(&self, name: &str) -> PathBuf {
    self.temp_dir.path().join(name)
  }

  fn snapshot(&self) -> ProjectSnapshot {
    ProjectSnapshot::capture(&self.lists, &self.registry, &self.settings).unwrap()
  }

  fn save(&self, name: &str, level: CompressionLevel) -> (PathBuf, EncodeStats) {
    let path = self.path(name);
    let stats = save_project(
      &path,
      &self.snapshot(),
      level,
      CodecBuffers::default(),
      &mut NoopObserver,
    )
    .unwrap();
    (path, stats)
  }
}

fn load(path: &Path, observer: &mut dyn PersistObserver) -> Result<DecodedProject, PersistError> {
  load_project(
    path,
    &mut ScratchBuffer::default(),
    &StreamReader::default(),
    observer,
  )
}

/// Decompressed chunk stream of an in-memory project file.
fn body_of(file: &[u8]) -> Vec<u8> {
  let mut scratch = ScratchBuffer::default();
  StreamReader::default()
    .read_into(
      &mut Cursor::new(&file[HEADER_SIZE..]),
      (file.len() - HEADER_SIZE) as u64,
      &mut scratch,
    )
    .unwrap();
  scratch.as_slice().to_vec()
}

/// A project file with the given (uncompressed) chunk stream.
fn file_with_body(body: &[u8]) -> Vec<u8> {
  let mut out = FILE_MAGIC.0.to_vec();
  out.extend_from_slice(&VERSION_MAJOR.to_le_bytes());
  out.extend_from_slice(&VERSION_MINOR.to_le_bytes());
  let mut writer = StreamWriter::new(out, CompressionLevel::FAST, CodecBuffers::default());
  writer.write_bytes(body).unwrap();
  writer.finish().unwrap().0
}

#[test]
fn save_load_cycle_preserves_scene() {
  let harness = FormatHarness::new(SceneShape::SMALL);
  let (path, stats) = harness.save("scene.lumen", CompressionLevel::DEFAULT);

  assert_eq!(stats.count(ChunkKind::Material), 2);
  assert_eq!(stats.count(ChunkKind::Texture), 2, "only textures used by materials");
  assert_eq!(stats.count(ChunkKind::MeshInstance), 2);
  assert_eq!(stats.count(ChunkKind::Mesh), 2);
  assert_eq!(stats.count(ChunkKind::Environment), 2);
  assert_eq!(stats.count(ChunkKind::Settings), 1);

  let mut observer = Recorder::default();
  let project = load(&path, &mut observer).unwrap();
  assert!(observer.file_opened && observer.opened);
  assert!(observer.failures.is_empty());

  let mut registry = Registry::new();
  let mut lists = ResourceLists::new();
  let report = import_project(project, &mut registry, &mut lists).unwrap();
  assert_eq!(report.unresolved_references, 0);
  assert_eq!(report.dropped_instances, 0);
  assert_eq!(report.settings.as_ref(), Some(&harness.settings));

  assert_eq!(lists.materials.len(), 2);
  assert_eq!(lists.mesh_instances.len(), 2);
  assert_eq!(lists.environments.len(), 2);

  for (original, loaded) in harness.lists.materials.iter().zip(&lists.materials) {
    let original = harness.registry.materials.get(*original).unwrap();
    let loaded = registry.materials.get(*loaded).unwrap();
    assert_eq!(loaded.name, original.name);
    assert_eq!(loaded.roughness, original.roughness);
    let original_albedo = original.texture(TextureSlot::Albedo).unwrap();
    let loaded_albedo = loaded.texture(TextureSlot::Albedo).unwrap();
    assert_eq!(
      registry.textures.get(loaded_albedo),
      harness.registry.textures.get(original_albedo)
    );
  }

  for (original, loaded) in harness.lists.mesh_instances.iter().zip(&lists.mesh_instances) {
    assert_eq!(loaded.transform, original.transform);
    assert_eq!(
      registry.meshes.get(loaded.mesh),
      harness.registry.meshes.get(original.mesh)
    );
    assert_eq!(loaded.materials.len(), original.materials.len());
    for (a, b) in original.materials.iter().zip(&loaded.materials) {
      assert_eq!(
        harness.registry.materials.name(a.unwrap()),
        registry.materials.name(b.unwrap())
      );
    }
  }

  for (original, loaded) in harness.lists.environments.iter().zip(&lists.environments) {
    assert_eq!(
      registry.environments.get(*loaded),
      harness.registry.environments.get(*original)
    );
  }

  lists.release_all(&mut registry);
  assert!(registry.is_empty());
}

#[test]
fn two_materials_sharing_one_texture_store_it_once() {
  let dir = TempDir::new().unwrap();
  let mut registry = Registry::new();
  let mut lists = ResourceLists::new();
  let texture = registry.insert_texture(common::texture("Albedo", 7));
  lists.push_texture(texture).unwrap();
  for name in ["wall", "floor"] {
    let mut material = Material {
      name: name.into(),
      ..Material::default()
    };
    material.set_texture(TextureSlot::Albedo, Some(texture));
    let handle = registry.insert_material(material);
    lists.push_material(handle).unwrap();
  }
  let mesh = registry.insert_mesh(common::quad("panel"));
  let instance = MeshInstance {
    mesh,
    materials: vec![Some(lists.materials[0]), Some(lists.materials[1])],
    transform: InstanceTransform::default(),
  };
  registry.acquire_instance(&instance);
  registry.release_mesh(mesh);
  lists.push_mesh_instance(instance).unwrap();
  let environment = registry.insert_environment(common::environment("studio", 3));
  lists.push_environment(environment).unwrap();

  let path = dir.path().join("shared.lumen");
  let snapshot = ProjectSnapshot::capture(&lists, &registry, &Settings::default()).unwrap();
  let stats = save_project(
    &path,
    &snapshot,
    CompressionLevel::new(6),
    CodecBuffers::default(),
    &mut NoopObserver,
  )
  .unwrap();
  assert_eq!(stats.count(ChunkKind::Texture), 1);
  assert_eq!(stats.count(ChunkKind::Material), 2);
  assert_eq!(stats.count(ChunkKind::MeshInstance), 1);
  assert_eq!(stats.count(ChunkKind::Mesh), 1);
  assert_eq!(stats.count(ChunkKind::Environment), 1);

  let project = load(&path, &mut NoopObserver).unwrap();
  let mut loaded_registry = Registry::new();
  let mut loaded = ResourceLists::new();
  import_project(project, &mut loaded_registry, &mut loaded).unwrap();
  assert_eq!(loaded.textures.len(), 1);
  assert_eq!(loaded.materials.len(), 2);
  assert_eq!(loaded.mesh_instances.len(), 1);
  assert_eq!(loaded.environments.len(), 1);

  let shared = loaded.textures[0];
  assert_eq!(loaded_registry.textures.name(shared), Some("Albedo"));
  for &material in &loaded.materials {
    let material = loaded_registry.materials.get(material).unwrap();
    assert_eq!(material.texture(TextureSlot::Albedo), Some(shared));
  }
  // List entry plus the albedo slot of each material.
  assert_eq!(loaded_registry.textures.ref_count(shared), 3);
  let expected: Vec<_> = loaded.materials.iter().copied().map(Some).collect();
  assert_eq!(loaded.mesh_instances[0].materials, expected);

  loaded.release_all(&mut loaded_registry);
  assert!(loaded_registry.is_empty());
  lists.release_all(&mut registry);
  assert!(registry.is_empty());
}

#[test]
fn newer_version_is_rejected_after_magic() {
  let harness = FormatHarness::new(SceneShape::SMALL);
  let (path, _) = harness.save("scene.lumen", CompressionLevel::FAST);

  let mut bytes = std::fs::read(&path).unwrap();
  bytes[6..8].copy_from_slice(&(VERSION_MINOR + 1).to_le_bytes());
  std::fs::write(&path, &bytes).unwrap();

  let mut observer = Recorder::default();
  let err = load(&path, &mut observer).unwrap_err();
  assert!(matches!(
    err,
    PersistError::InvalidVersion {
      found: (VERSION_MAJOR, minor),
      ..
    } if minor == VERSION_MINOR + 1
  ));
  assert!(observer.file_opened);
  assert!(!observer.opened, "loading must stop at the header");
  assert_eq!(observer.failures.len(), 1);
}

#[test]
fn foreign_file_is_rejected_by_magic() {
  let harness = FormatHarness::new(SceneShape::SMALL);
  let path = harness.path("image.png");
  std::fs::write(&path, b"\x89PNG\r\n\x1a\n rest of a png").unwrap();

  let mut observer = Recorder::default();
  let err = load(&path, &mut observer).unwrap_err();
  assert!(matches!(err, PersistError::InvalidMagic { found } if &found == b"\x89PNG"));
  assert!(!observer.opened);
  assert!(err.is_format_error());
}

#[test]
fn missing_file_is_file_io() {
  let harness = FormatHarness::new(SceneShape::SMALL);
  let mut observer = Recorder::default();
  let err = load(&harness.path("nothing.lumen"), &mut observer).unwrap_err();
  assert!(matches!(err, PersistError::FileIo { .. }));
  assert!(!observer.file_opened);
  assert_eq!(observer.failures.len(), 1);
}

#[test]
fn corrupted_end_magic_is_corrupt_chunk() {
  let harness = FormatHarness::new(SceneShape::SMALL);
  let (file, _) = encode_project(
    Vec::new(),
    &harness.snapshot(),
    CompressionLevel::FAST,
    CodecBuffers::default(),
  )
  .unwrap();

  let mut body = body_of(&file);
  let end = ChunkKind::Material.end().0;
  let at = body
    .windows(4)
    .position(|w| w == end)
    .expect("material end magic");
  body[at + 3] = 0x7F;

  let err = decode_project(
    &file_with_body(&body),
    &mut ScratchBuffer::default(),
    &StreamReader::default(),
  )
  .unwrap_err();
  match err {
    PersistError::CorruptChunk {
      expected,
      found,
      offset,
    } => {
      assert_eq!(expected, ChunkKind::Material.end());
      assert_eq!(found, Magic([b'M', b'A', b'T', 0x7F]));
      assert_eq!(offset, at);
    }
    other => panic!("expected CorruptChunk, got {other:?}"),
  }
}

#[test]
fn truncated_body_is_codec_error() {
  let harness = FormatHarness::new(SceneShape::SMALL);
  let (path, _) = harness.save("scene.lumen", CompressionLevel::DEFAULT);
  let bytes = std::fs::read(&path).unwrap();
  std::fs::write(&path, &bytes[..bytes.len() - bytes.len() / 3]).unwrap();

  let err = load(&path, &mut NoopObserver).unwrap_err();
  assert!(matches!(err, PersistError::Codec(_)), "{err:?}");
}

#[test]
fn scratch_capacity_bounds_the_load() {
  let harness = FormatHarness::new(SceneShape::SMALL);
  let (path, _) = harness.save("scene.lumen", CompressionLevel::DEFAULT);

  let mut scratch = ScratchBuffer::new(256);
  let err = load_project(&path, &mut scratch, &StreamReader::default(), &mut NoopObserver)
    .unwrap_err();
  assert!(matches!(
    err,
    PersistError::ScratchExhausted { capacity: 256, .. }
  ));
}

#[test]
fn compression_level_only_changes_the_body() {
  let harness = FormatHarness::new(SceneShape::SMALL);
  let (stored, _) = harness.save("stored.lumen", CompressionLevel::STORE);
  let (best, _) = harness.save("best.lumen", CompressionLevel::BEST);

  let stored = std::fs::read(stored).unwrap();
  let best = std::fs::read(best).unwrap();
  assert_eq!(stored[..HEADER_SIZE], best[..HEADER_SIZE]);
  assert!(best.len() < stored.len());
  assert_eq!(body_of(&stored), body_of(&best));
}

#[test]
fn inspect_lists_every_chunk() {
  let harness = FormatHarness::new(SceneShape::SMALL);
  let (path, stats) = harness.save("scene.lumen", CompressionLevel::DEFAULT);

  let summary = inspect_project(
    &path,
    &mut ScratchBuffer::default(),
    &StreamReader::default(),
  )
  .unwrap();
  assert_eq!(summary.version, (VERSION_MAJOR, VERSION_MINOR));
  assert_eq!(summary.file_len, std::fs::metadata(&path).unwrap().len());
  for kind in ChunkKind::ALL {
    assert_eq!(summary.count(kind), stats.count(kind), "{kind:?}");
    assert_eq!(
      summary.payload_bytes(kind) as u64,
      stats.payload_bytes(kind),
      "{kind:?}"
    );
  }
  assert_eq!(summary.chunks[0].kind, ChunkKind::Material);
  assert_eq!(summary.chunks[0].name.as_deref(), Some("material-0"));
  let text = summary.to_string();
  assert!(text.contains("version 1.0"));
}

#[test]
fn freed_host_copy_cannot_be_saved() {
  let mut harness = FormatHarness::new(SceneShape::SMALL);
  let mut gpu = HeadlessGpu::new();
  upload_all(&mut harness.registry, &harness.lists, &mut gpu);

  let texture = harness.lists.textures[0];
  assert!(harness.registry.textures.free_host_copy(texture));

  let err = ProjectSnapshot::capture(&harness.lists, &harness.registry, &harness.settings)
    .unwrap_err();
  assert!(matches!(err, PersistError::MissingPayload { ref name } if name == "texture-0"));
}
