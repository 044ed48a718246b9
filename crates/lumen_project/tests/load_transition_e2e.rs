//! E2E tests for the frame-driven load transition.
//!
//! Tests:
//! - Save through the orchestrator, load into a studio showing another scene
//! - One GPU upload per frame, then the swap
//! - Displayed resources survive until the swap, old ones are destroyed after
//! - Failed loads leave the live scene untouched
//! - Requests are rejected while a job or a transition is running

mod common;

use std::path::PathBuf;

use common::{SceneShape, StudioHarness};
use lumen_project::format::{ChunkKind, FILE_MAGIC, VERSION_MAJOR, VERSION_MINOR};
use lumen_project::{
  AppState, CodecBuffers, CompressionLevel, MessageKind, ProjectSnapshot, RequestRejected,
  Settings, StreamWriter, StudioConfig, TaskKind,
};
use tempfile::TempDir;

const TINY: SceneShape = SceneShape {
  textures: 1,
  materials: 1,
  meshes: 1,
  environments: 1,
};

/// Saves a SMALL scene with distinctive settings and returns its path.
fn saved_project(dir: &TempDir) -> (PathBuf, Settings) {
  let mut studio = StudioHarness::new();
  studio.populate(SceneShape::SMALL);
  let settings = Settings {
    camera_yaw: 0.75,
    exposure: 2.0,
    selected_environment: 1,
    selected_mesh_instance: 1,
    ..Settings::default()
  };
  *studio.orchestrator.settings_mut() = settings.clone();

  let path = dir.path().join("small.lumen");
  studio
    .orchestrator
    .request_save(
      &mut studio.session,
      &mut studio.registry,
      &path,
      CompressionLevel::BEST,
    )
    .unwrap();
  studio.run_until_idle();
  assert!(!studio.orchestrator.messages().has_errors());
  assert!(path.exists());
  (path, settings)
}

#[derive(Debug)]
struct Frame {
  state: AppState,
  uploads: u64,
}

#[test]
fn load_uploads_one_resource_per_frame_then_swaps() {
  let dir = TempDir::new().unwrap();
  let (path, settings) = saved_project(&dir);

  let mut config = StudioConfig::immediate();
  config.ui.transition_ms = 20;
  let mut studio = StudioHarness::with_config(config);
  studio.populate(TINY);
  let old_environment = studio.orchestrator.live().environments[0];
  let old_environment_gpu = studio.registry.environments.gpu(old_environment).unwrap();
  let uploads_before = studio.gpu.counters().uploads();
  assert_eq!(uploads_before, 3);

  studio
    .orchestrator
    .request_load(&mut studio.session, &path)
    .unwrap();

  let mut frames = Vec::new();
  let mut held_checked = false;
  for _ in 0..5_000 {
    let before = studio.gpu.counters().uploads();
    studio.tick();
    frames.push(Frame {
      state: studio.session.state.current(),
      uploads: studio.gpu.counters().uploads() - before,
    });

    if studio.session.state.on_state(AppState::SendResourcesToGpu) && !held_checked {
      // The displayed environment is held and still on the GPU.
      assert_eq!(studio.orchestrator.held_environment(), Some(old_environment));
      assert!(studio.gpu.is_resident(old_environment_gpu));
      assert!(studio.orchestrator.live().is_empty());
      held_checked = true;
    }
    if studio.orchestrator.is_idle(&studio.session) {
      break;
    }
    std::thread::sleep(std::time::Duration::from_millis(1));
  }
  assert!(held_checked, "never saw SendResourcesToGpu: {frames:?}");
  assert!(studio.orchestrator.is_idle(&studio.session));

  // 2 textures + 2 meshes + 2 environments, one per frame, back to back.
  assert!(frames.iter().all(|f| f.uploads <= 1));
  let upload_frames: Vec<usize> = frames
    .iter()
    .enumerate()
    .filter(|(_, f)| f.uploads == 1)
    .map(|(i, _)| i)
    .collect();
  assert_eq!(upload_frames.len(), 6);
  assert_eq!(upload_frames[5] - upload_frames[0], 5);
  let last_upload = &frames[upload_frames[5]];
  assert_eq!(last_upload.state, AppState::ProjectLoadTransition);
  assert!(
    frames[upload_frames[0]..upload_frames[5]]
      .iter()
      .all(|f| f.state == AppState::SendResourcesToGpu)
  );
  assert_eq!(frames.last().unwrap().state, AppState::MainState);

  // The old scene is gone, including its GPU allocations.
  let live = studio.orchestrator.live();
  assert_eq!(live.textures.len(), 2);
  assert_eq!(live.materials.len(), 2);
  assert_eq!(live.mesh_instances.len(), 2);
  assert_eq!(live.environments.len(), 2);
  assert!(!studio.gpu.is_resident(old_environment_gpu));
  assert_eq!(studio.gpu.counters().destroyed, 3);
  assert_eq!(studio.gpu.resident(), 6);
  assert_eq!(studio.registry.textures.len(), 2);
  assert_eq!(studio.registry.environments.len(), 2);
  assert_eq!(studio.orchestrator.held_environment(), None);

  assert_eq!(studio.orchestrator.settings(), &settings);
  let last = studio.orchestrator.messages().last().unwrap();
  assert_eq!(last.kind, MessageKind::Info);

  studio.orchestrator.release_all(&mut studio.registry);
  assert!(studio.registry.is_empty());
}

#[test]
fn loaded_scene_can_be_saved_again() {
  let dir = TempDir::new().unwrap();
  let (path, _) = saved_project(&dir);

  let mut config = StudioConfig::immediate();
  config.persistence.free_host_copies = false;
  let mut studio = StudioHarness::with_config(config);
  studio
    .orchestrator
    .request_load(&mut studio.session, &path)
    .unwrap();
  studio.run_until_idle();

  let snapshot = ProjectSnapshot::capture(
    studio.orchestrator.live(),
    &studio.registry,
    studio.orchestrator.settings(),
  )
  .unwrap();
  assert_eq!(snapshot.materials.len(), 2);
  assert_eq!(snapshot.textures.len(), 2);

  let copy = dir.path().join("copy.lumen");
  studio
    .orchestrator
    .request_save_default(&mut studio.session, &mut studio.registry, &copy)
    .unwrap();
  studio.run_until_idle();
  assert!(!studio.orchestrator.messages().has_errors());
  assert!(copy.exists());
}

#[test]
fn version_mismatch_leaves_live_scene_untouched() {
  let dir = TempDir::new().unwrap();
  let path = dir.path().join("future.lumen");
  let mut bytes = FILE_MAGIC.0.to_vec();
  bytes.extend_from_slice(&(VERSION_MAJOR + 1).to_le_bytes());
  bytes.extend_from_slice(&VERSION_MINOR.to_le_bytes());
  std::fs::write(&path, &bytes).unwrap();

  let mut studio = StudioHarness::new();
  studio.populate(SceneShape::SMALL);
  let textures = studio.orchestrator.live().textures.clone();
  let counters = studio.gpu.counters();

  studio
    .orchestrator
    .request_load(&mut studio.session, &path)
    .unwrap();
  studio.run_until_idle();

  assert_eq!(studio.orchestrator.live().textures, textures);
  assert_eq!(studio.gpu.counters(), counters);
  for &texture in &textures {
    // Rejected at the header: host copies were never freed.
    assert!(studio.registry.textures.get(texture).is_some());
  }
  let last = studio.orchestrator.messages().last().unwrap();
  assert_eq!(last.kind, MessageKind::Error);
  assert!(last.text.contains("unsupported project version"), "{}", last.text);
}

#[test]
fn corrupt_body_leaves_live_scene_untouched() {
  let dir = TempDir::new().unwrap();
  let path = dir.path().join("corrupt.lumen");
  let mut body = ChunkKind::Settings.begin().0.to_vec();
  body.extend_from_slice(&[0xFF; 3]);
  let mut header = FILE_MAGIC.0.to_vec();
  header.extend_from_slice(&VERSION_MAJOR.to_le_bytes());
  header.extend_from_slice(&VERSION_MINOR.to_le_bytes());
  let mut writer = StreamWriter::new(header, CompressionLevel::FAST, CodecBuffers::default());
  writer.write_bytes(&body).unwrap();
  std::fs::write(&path, writer.finish().unwrap().0).unwrap();

  let mut studio = StudioHarness::new();
  studio.populate(SceneShape::SMALL);
  let live_before = (
    studio.orchestrator.live().materials.clone(),
    studio.orchestrator.live().mesh_instances.clone(),
  );
  let registry_textures = studio.registry.textures.len();

  studio
    .orchestrator
    .request_load(&mut studio.session, &path)
    .unwrap();
  studio.run_until_idle();

  assert_eq!(studio.orchestrator.live().materials, live_before.0);
  assert_eq!(studio.orchestrator.live().mesh_instances, live_before.1);
  assert_eq!(studio.registry.textures.len(), registry_textures);
  assert!(studio.session.state.on_state(AppState::MainState));
  assert_eq!(studio.gpu.counters().destroyed, 0);
  let last = studio.orchestrator.messages().last().unwrap();
  assert!(last.text.contains("corrupt chunk"), "{}", last.text);
}

#[test]
fn requests_are_single_flight() {
  let dir = TempDir::new().unwrap();
  let (path, _) = saved_project(&dir);

  let mut studio = StudioHarness::new();
  studio.populate(TINY);
  studio
    .orchestrator
    .request_load(&mut studio.session, &path)
    .unwrap();

  assert!(matches!(
    studio.orchestrator.request_load(&mut studio.session, &path),
    Err(RequestRejected::Busy(TaskKind::Load))
  ));
  assert!(matches!(
    studio.orchestrator.request_save_default(
      &mut studio.session,
      &mut studio.registry,
      dir.path().join("other.lumen")
    ),
    Err(RequestRejected::Busy(TaskKind::Load))
  ));

  let mut rejected_during_upload = false;
  for _ in 0..5_000 {
    studio.tick();
    if studio.session.state.on_state(AppState::SendResourcesToGpu) {
      assert!(matches!(
        studio.orchestrator.request_load(&mut studio.session, &path),
        Err(RequestRejected::TransitionInProgress)
      ));
      rejected_during_upload = true;
    }
    if studio.orchestrator.is_idle(&studio.session) {
      break;
    }
    std::thread::sleep(std::time::Duration::from_millis(1));
  }
  assert!(rejected_during_upload);
  assert!(studio.orchestrator.is_idle(&studio.session));

  // Idle again: a new request goes through.
  studio
    .orchestrator
    .request_load(&mut studio.session, &path)
    .unwrap();
  studio.run_until_idle();
  assert_eq!(studio.orchestrator.live().materials.len(), 2);
}

#[test]
fn requests_wait_for_startup() {
  let mut config = StudioConfig::immediate();
  config.startup.splash_frames = 2;
  let mut studio = lumen_project::Orchestrator::new(config);
  let mut session = lumen_project::Session::new();
  let mut registry = lumen_project::Registry::new();
  let mut gpu = lumen_project::HeadlessGpu::new();

  studio.tick(&mut session, &mut registry, &mut gpu);
  assert!(session.state.on_state(AppState::SplashScreen));
  assert!(matches!(
    studio.request_load(&mut session, "scene.lumen"),
    Err(RequestRejected::NotReady(AppState::SplashScreen))
  ));

  studio.tick(&mut session, &mut registry, &mut gpu);
  studio.tick(&mut session, &mut registry, &mut gpu);
  assert!(session.state.on_state(AppState::MainState));
  assert!(studio.is_idle(&session));
}
