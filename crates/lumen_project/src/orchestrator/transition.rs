//! Amortized GPU upload and the swap of the incoming project.

use std::collections::VecDeque;

use super::Orchestrator;
use crate::coordinator::{AppState, Events};
use crate::gpu::GpuBackend;
use crate::lists::ResourceLists;
use crate::registry::{EnvironmentHandle, MeshHandle, Registry, TextureHandle};
use crate::session::Session;

/// Resources of the incoming project still waiting for their upload.
///
/// Drained one entry per frame: textures first, then meshes, then
/// environments.
#[derive(Debug, Default)]
pub struct UploadQueue {
  textures: VecDeque<TextureHandle>,
  meshes: VecDeque<MeshHandle>,
  environments: VecDeque<EnvironmentHandle>,
}

impl UploadQueue {
  pub fn from_lists(lists: &ResourceLists) -> Self {
    Self {
      textures: lists.textures.iter().copied().collect(),
      meshes: lists.meshes().into_iter().collect(),
      environments: lists.environments.iter().copied().collect(),
    }
  }

  pub fn len(&self) -> usize {
    self.textures.len() + self.meshes.len() + self.environments.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clear(&mut self) {
    self.textures.clear();
    self.meshes.clear();
    self.environments.clear();
  }

  /// Uploads the next queued resource. Returns false when nothing was left.
  pub fn upload_next(&mut self, registry: &mut Registry, gpu: &mut dyn GpuBackend) -> bool {
    if let Some(texture) = self.textures.pop_front() {
      registry.upload_texture(texture, gpu);
    } else if let Some(mesh) = self.meshes.pop_front() {
      registry.upload_mesh(mesh, gpu);
    } else if let Some(environment) = self.environments.pop_front() {
      registry.upload_environment(environment, gpu);
    } else {
      return false;
    }
    true
  }
}

impl Orchestrator {
  /// Holds what is on screen, releases the rest of the live scene and queues
  /// the incoming resources for upload.
  pub(super) fn begin_uploads(&mut self, session: &mut Session, registry: &mut Registry) {
    self.release_held(registry);

    let environment = self
      .live
      .environments
      .get(usize::from(self.settings.selected_environment))
      .copied();
    if let Some(environment) = environment
      && registry.environments.acquire(environment)
    {
      self.held.environment = Some(environment);
    }
    if let Some(instance) = self
      .live
      .mesh_instances
      .get(usize::from(self.settings.selected_mesh_instance))
      .cloned()
    {
      registry.acquire_instance(&instance);
      self.held.instance = Some(instance);
    }

    self.live.release_all(registry);
    self.uploads = UploadQueue::from_lists(&self.incoming);
    log::info!("uploading {} resources", self.uploads.len());
    session.state.enter(AppState::SendResourcesToGpu);
  }

  /// Uploads one resource. Triggers the swap once the queue is empty.
  pub(super) fn upload_step(
    &mut self,
    session: &mut Session,
    registry: &mut Registry,
    gpu: &mut dyn GpuBackend,
  ) {
    self.uploads.upload_next(registry, gpu);
    if self.uploads.is_empty() && !session.events.check(Events::BEGIN_LOAD_TRANSITION) {
      session.events.trigger(Events::BEGIN_LOAD_TRANSITION);
    }
  }

  pub(super) fn release_held(&mut self, registry: &mut Registry) {
    if let Some(environment) = self.held.environment.take() {
      registry.release_environment(environment);
    }
    if let Some(instance) = self.held.instance.take() {
      registry.release_instance(&instance);
    }
  }

  /// Moves the incoming project into the live scene.
  pub(super) fn swap_in(&mut self, session: &mut Session, registry: &mut Registry) {
    self.release_held(registry);
    self.live.release_all(registry);
    self.live = std::mem::take(&mut self.incoming);

    if let Some(loaded) = self.pending_settings.take() {
      self.settings.apply_loaded(&loaded);
    }
    self.clamp_selection();
    let repaired = self.repair_instance_materials(registry);
    if repaired > 0 {
      log::warn!("assigned the first material to {repaired} empty mesh instance slots");
    }

    if let Some(scratch) = self.scratch.as_mut() {
      scratch.reset();
    }

    session.state.enter(AppState::ProjectLoadTransition);
    self.transition_started = Some(web_time::Instant::now());
    if let Err(e) = session
      .events
      .trigger_after(self.config.transition_duration(), Events::LOAD_TRANSITION_COMPLETE)
    {
      log::warn!("{e}, completing the transition now");
      session.events.trigger(Events::LOAD_TRANSITION_COMPLETE);
    }
    self.messages.info("project loaded");
  }

  fn clamp_selection(&mut self) {
    let clamp = |index: u16, len: usize| -> u16 {
      let last = len.saturating_sub(1).min(usize::from(u16::MAX));
      index.min(last as u16)
    };
    self.settings.selected_environment =
      clamp(self.settings.selected_environment, self.live.environments.len());
    self.settings.selected_mesh_instance =
      clamp(self.settings.selected_mesh_instance, self.live.mesh_instances.len());
  }

  /// Points every empty material slot of a live mesh instance at the first
  /// live material. Returns the number of slots filled.
  fn repair_instance_materials(&mut self, registry: &mut Registry) -> usize {
    let Some(&first) = self.live.materials.first() else {
      return 0;
    };
    let mut repaired = 0;
    for instance in &mut self.live.mesh_instances {
      for slot in instance.materials.iter_mut().filter(|slot| slot.is_none()) {
        if registry.materials.acquire(first) {
          *slot = Some(first);
          repaired += 1;
        }
      }
    }
    repaired
  }
}
