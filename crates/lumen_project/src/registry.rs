//! Reference-counted resource registry.
//!
//! Every resource lives in a slot pool keyed by a typed handle. Inserting a
//! resource hands the caller one reference; resource lists, materials and
//! mesh instances each own references to what they point at. When the last
//! reference is released the entry is removed, and its GPU allocation (if
//! any) is retired rather than destroyed: retired allocations are destroyed
//! by [`Registry::flush_retired`] at frame end, once nothing in flight can
//! still use them.
//!
//! Payloads are held as `Arc`s so a save snapshot can share them with the
//! worker thread without copying. The host copy of a GPU-resident resource
//! can be dropped to reclaim memory; afterwards it cannot be saved.

use std::sync::Arc;

use slotmap::{Key, SlotMap, new_key_type};

use crate::gpu::{GpuBackend, GpuId};
use crate::model::{Environment, Material, Mesh, MeshInstance, Texture};

new_key_type! { pub struct TextureHandle; }
new_key_type! { pub struct MaterialHandle; }
new_key_type! { pub struct MeshHandle; }
new_key_type! { pub struct EnvironmentHandle; }

/// A named resource payload.
pub trait Resource {
  fn name(&self) -> &str;
}

impl Resource for Texture {
  fn name(&self) -> &str {
    &self.name
  }
}

impl Resource for Material {
  fn name(&self) -> &str {
    &self.name
  }
}

impl Resource for Mesh {
  fn name(&self) -> &str {
    &self.name
  }
}

impl Resource for Environment {
  fn name(&self) -> &str {
    &self.name
  }
}

struct Entry<T> {
  name: String,
  payload: Option<Arc<T>>,
  refs: u32,
  gpu: Option<GpuId>,
}

/// Slot pool of one resource type.
pub struct Pool<K: Key, T> {
  entries: SlotMap<K, Entry<T>>,
}

impl<K: Key, T: Resource> Pool<K, T> {
  fn new() -> Self {
    Self {
      entries: SlotMap::with_key(),
    }
  }

  fn insert(&mut self, payload: T) -> K {
    self.entries.insert(Entry {
      name: payload.name().to_owned(),
      payload: Some(Arc::new(payload)),
      refs: 1,
      gpu: None,
    })
  }

  /// Adds a reference. Returns false for a stale handle.
  pub fn acquire(&mut self, key: K) -> bool {
    match self.entries.get_mut(key) {
      Some(entry) => {
        entry.refs += 1;
        true
      }
      None => false,
    }
  }

  /// Drops a reference, returning the removed entry once the count hits 0.
  fn release(&mut self, key: K) -> Option<Entry<T>> {
    let entry = self.entries.get_mut(key)?;
    entry.refs = entry.refs.saturating_sub(1);
    if entry.refs == 0 {
      self.entries.remove(key)
    } else {
      None
    }
  }

  pub fn contains(&self, key: K) -> bool {
    self.entries.contains_key(key)
  }

  /// Current reference count, 0 for a stale handle.
  pub fn ref_count(&self, key: K) -> u32 {
    self.entries.get(key).map_or(0, |e| e.refs)
  }

  pub fn name(&self, key: K) -> Option<&str> {
    self.entries.get(key).map(|e| e.name.as_str())
  }

  /// Host copy of the payload, if still resident.
  pub fn get(&self, key: K) -> Option<&T> {
    self.entries.get(key)?.payload.as_deref()
  }

  /// Shared host copy of the payload, if still resident.
  pub fn payload(&self, key: K) -> Option<Arc<T>> {
    self.entries.get(key)?.payload.clone()
  }

  pub fn gpu(&self, key: K) -> Option<GpuId> {
    self.entries.get(key)?.gpu
  }

  /// Drops the host copy of a GPU-resident resource.
  ///
  /// Returns false (and keeps the copy) when the resource is not on the GPU.
  pub fn free_host_copy(&mut self, key: K) -> bool {
    match self.entries.get_mut(key) {
      Some(entry) if entry.gpu.is_some() && entry.payload.is_some() => {
        entry.payload = None;
        true
      }
      _ => false,
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  fn upload(&mut self, key: K, upload: impl FnOnce(&T) -> GpuId) -> bool {
    let Some(entry) = self.entries.get_mut(key) else {
      return false;
    };
    if entry.gpu.is_some() {
      return false;
    }
    let Some(payload) = entry.payload.as_deref() else {
      log::warn!("cannot upload '{}': host copy was freed", entry.name);
      return false;
    };
    entry.gpu = Some(upload(payload));
    true
  }
}

/// All resource pools plus the retired GPU allocations.
pub struct Registry {
  pub textures: Pool<TextureHandle, Texture>,
  pub materials: Pool<MaterialHandle, Material>,
  pub meshes: Pool<MeshHandle, Mesh>,
  pub environments: Pool<EnvironmentHandle, Environment>,
  retired: Vec<GpuId>,
}

impl Default for Registry {
  fn default() -> Self {
    Self::new()
  }
}

impl Registry {
  pub fn new() -> Self {
    Self {
      textures: Pool::new(),
      materials: Pool::new(),
      meshes: Pool::new(),
      environments: Pool::new(),
      retired: Vec::new(),
    }
  }

  pub fn insert_texture(&mut self, texture: Texture) -> TextureHandle {
    self.textures.insert(texture)
  }

  /// Inserts a material, acquiring one reference to every texture it uses.
  /// Stale texture handles are cleared.
  pub fn insert_material(&mut self, mut material: Material) -> MaterialHandle {
    for slot in &mut material.textures {
      if let Some(texture) = *slot
        && !self.textures.acquire(texture)
      {
        log::warn!("material '{}' references a released texture", material.name);
        *slot = None;
      }
    }
    self.materials.insert(material)
  }

  pub fn insert_mesh(&mut self, mesh: Mesh) -> MeshHandle {
    self.meshes.insert(mesh)
  }

  pub fn insert_environment(&mut self, environment: Environment) -> EnvironmentHandle {
    self.environments.insert(environment)
  }

  fn retire(&mut self, gpu: Option<GpuId>) {
    if let Some(id) = gpu {
      self.retired.push(id);
    }
  }

  /// Releases one texture reference. Returns true if the texture was removed.
  pub fn release_texture(&mut self, handle: TextureHandle) -> bool {
    match self.textures.release(handle) {
      Some(entry) => {
        self.retire(entry.gpu);
        true
      }
      None => false,
    }
  }

  /// Releases one material reference; a removed material releases its
  /// textures.
  pub fn release_material(&mut self, handle: MaterialHandle) -> bool {
    let Some(entry) = self.materials.release(handle) else {
      return false;
    };
    // The payload is still resident: materials have no GPU copy to free it.
    if let Some(material) = entry.payload {
      for texture in material.texture_handles() {
        self.release_texture(texture);
      }
    }
    true
  }

  pub fn release_mesh(&mut self, handle: MeshHandle) -> bool {
    match self.meshes.release(handle) {
      Some(entry) => {
        self.retire(entry.gpu);
        true
      }
      None => false,
    }
  }

  pub fn release_environment(&mut self, handle: EnvironmentHandle) -> bool {
    match self.environments.release(handle) {
      Some(entry) => {
        self.retire(entry.gpu);
        true
      }
      None => false,
    }
  }

  /// Acquires the mesh and every assigned material of an instance.
  pub fn acquire_instance(&mut self, instance: &MeshInstance) {
    self.meshes.acquire(instance.mesh);
    for material in instance.materials.iter().flatten() {
      self.materials.acquire(*material);
    }
  }

  /// Releases what [`Self::acquire_instance`] acquired.
  pub fn release_instance(&mut self, instance: &MeshInstance) {
    self.release_mesh(instance.mesh);
    for material in instance.materials.iter().flatten() {
      self.release_material(*material);
    }
  }

  /// Uploads a texture unless it is already resident.
  pub fn upload_texture(&mut self, handle: TextureHandle, gpu: &mut dyn GpuBackend) -> bool {
    self.textures.upload(handle, |t| gpu.upload_texture(t))
  }

  pub fn upload_mesh(&mut self, handle: MeshHandle, gpu: &mut dyn GpuBackend) -> bool {
    self.meshes.upload(handle, |m| gpu.upload_mesh(m))
  }

  pub fn upload_environment(
    &mut self,
    handle: EnvironmentHandle,
    gpu: &mut dyn GpuBackend,
  ) -> bool {
    self.environments.upload(handle, |e| gpu.upload_environment(e))
  }

  /// GPU allocations waiting for [`Self::flush_retired`].
  pub fn retired_len(&self) -> usize {
    self.retired.len()
  }

  /// Destroys every retired GPU allocation. Call at frame end.
  pub fn flush_retired(&mut self, gpu: &mut dyn GpuBackend) -> usize {
    let count = self.retired.len();
    for id in self.retired.drain(..) {
      gpu.destroy(id);
    }
    if count > 0 {
      log::debug!("destroyed {count} retired GPU allocations");
    }
    count
  }

  /// True when no resource of any type is alive.
  pub fn is_empty(&self) -> bool {
    self.textures.is_empty()
      && self.materials.is_empty()
      && self.meshes.is_empty()
      && self.environments.is_empty()
  }
}
