//! Rendering backend boundary.
//!
//! The pipeline only needs to upload payloads and destroy what it uploaded.
//! [`HeadlessGpu`] implements the trait without a device, tracking resident
//! allocations so the frame loop and tests can observe uploads and deferred
//! destruction.

use std::collections::HashSet;

use crate::model::{Environment, Mesh, Texture};

/// Opaque id of a GPU allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GpuId(pub u64);

/// Uploads resources and destroys them again.
///
/// Called from the main thread only.
pub trait GpuBackend {
  fn upload_texture(&mut self, texture: &Texture) -> GpuId;
  fn upload_mesh(&mut self, mesh: &Mesh) -> GpuId;
  fn upload_environment(&mut self, environment: &Environment) -> GpuId;
  fn destroy(&mut self, id: GpuId);
}

/// Upload counters of a [`HeadlessGpu`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GpuCounters {
  pub textures: u64,
  pub meshes: u64,
  pub environments: u64,
  pub destroyed: u64,
  /// Bytes of pixel and vertex data uploaded.
  pub bytes: u64,
}

impl GpuCounters {
  pub fn uploads(&self) -> u64 {
    self.textures + self.meshes + self.environments
  }
}

/// Backend without a device.
#[derive(Debug, Default)]
pub struct HeadlessGpu {
  next_id: u64,
  resident: HashSet<GpuId>,
  counters: GpuCounters,
}

impl HeadlessGpu {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn counters(&self) -> GpuCounters {
    self.counters
  }

  /// Number of allocations currently alive.
  pub fn resident(&self) -> usize {
    self.resident.len()
  }

  pub fn is_resident(&self, id: GpuId) -> bool {
    self.resident.contains(&id)
  }

  fn allocate(&mut self, bytes: usize) -> GpuId {
    self.next_id += 1;
    let id = GpuId(self.next_id);
    self.resident.insert(id);
    self.counters.bytes += bytes as u64;
    id
  }
}

impl GpuBackend for HeadlessGpu {
  fn upload_texture(&mut self, texture: &Texture) -> GpuId {
    self.counters.textures += 1;
    self.allocate(texture.image.byte_len())
  }

  fn upload_mesh(&mut self, mesh: &Mesh) -> GpuId {
    self.counters.meshes += 1;
    let bytes = std::mem::size_of_val(mesh.vertices.as_slice())
      + std::mem::size_of_val(mesh.indices.as_slice());
    self.allocate(bytes)
  }

  fn upload_environment(&mut self, environment: &Environment) -> GpuId {
    self.counters.environments += 1;
    let bytes = environment.skybox.byte_len()
      + environment.radiance.byte_len()
      + environment.irradiance.byte_len();
    self.allocate(bytes)
  }

  fn destroy(&mut self, id: GpuId) {
    if self.resident.remove(&id) {
      self.counters.destroyed += 1;
    } else {
      log::warn!("destroy of unknown GPU allocation {id:?}");
    }
  }
}
