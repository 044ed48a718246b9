//! Fixed-capacity resource lists.
//!
//! The scene keeps one set of lists for what is displayed ("live") and, while
//! a project loads, a second independent set that is filled by the import
//! and swapped in at the transition. Every handle entry owns one registry
//! reference; a mesh instance owns one reference to its mesh and one to each
//! assigned material.

use crate::error::{PersistError, PersistResult};
use crate::model::MeshInstance;
use crate::registry::{EnvironmentHandle, MaterialHandle, MeshHandle, Registry, TextureHandle};

pub const MAX_TEXTURES: usize = 1024;
pub const MAX_MATERIALS: usize = 512;
pub const MAX_ENVIRONMENTS: usize = 64;
pub const MAX_MESH_INSTANCES: usize = 256;

fn push_bounded<T>(
  list: &mut Vec<T>,
  value: T,
  name: &'static str,
  capacity: usize,
) -> PersistResult<()> {
  if list.len() >= capacity {
    return Err(PersistError::CapacityExceeded {
      list: name,
      capacity,
    });
  }
  list.push(value);
  Ok(())
}

#[derive(Debug, Default)]
pub struct ResourceLists {
  pub textures: Vec<TextureHandle>,
  pub materials: Vec<MaterialHandle>,
  pub environments: Vec<EnvironmentHandle>,
  pub mesh_instances: Vec<MeshInstance>,
}

impl ResourceLists {
  pub fn new() -> Self {
    Self::default()
  }

  /// Takes ownership of one texture reference.
  pub fn push_texture(&mut self, handle: TextureHandle) -> PersistResult<()> {
    push_bounded(&mut self.textures, handle, "texture", MAX_TEXTURES)
  }

  pub fn push_material(&mut self, handle: MaterialHandle) -> PersistResult<()> {
    push_bounded(&mut self.materials, handle, "material", MAX_MATERIALS)
  }

  pub fn push_environment(&mut self, handle: EnvironmentHandle) -> PersistResult<()> {
    push_bounded(
      &mut self.environments,
      handle,
      "environment",
      MAX_ENVIRONMENTS,
    )
  }

  /// Takes ownership of the instance's mesh and material references.
  pub fn push_mesh_instance(&mut self, instance: MeshInstance) -> PersistResult<()> {
    push_bounded(
      &mut self.mesh_instances,
      instance,
      "mesh instance",
      MAX_MESH_INSTANCES,
    )
  }

  /// Unique meshes referenced by the mesh instances, in first-use order.
  pub fn meshes(&self) -> Vec<MeshHandle> {
    let mut meshes: Vec<MeshHandle> = Vec::new();
    for instance in &self.mesh_instances {
      if !meshes.contains(&instance.mesh) {
        meshes.push(instance.mesh);
      }
    }
    meshes
  }

  pub fn is_empty(&self) -> bool {
    self.textures.is_empty()
      && self.materials.is_empty()
      && self.environments.is_empty()
      && self.mesh_instances.is_empty()
  }

  /// Releases every owned reference and empties the lists.
  pub fn release_all(&mut self, registry: &mut Registry) {
    for instance in self.mesh_instances.drain(..) {
      registry.release_instance(&instance);
    }
    for material in self.materials.drain(..) {
      registry.release_material(material);
    }
    for texture in self.textures.drain(..) {
      registry.release_texture(texture);
    }
    for environment in self.environments.drain(..) {
      registry.release_environment(environment);
    }
  }

  /// Acquires a second reference to everything listed, returning a list set
  /// that owns them.
  pub fn acquire_copy(&self, registry: &mut Registry) -> ResourceLists {
    for &texture in &self.textures {
      registry.textures.acquire(texture);
    }
    for &material in &self.materials {
      registry.materials.acquire(material);
    }
    for &environment in &self.environments {
      registry.environments.acquire(environment);
    }
    for instance in &self.mesh_instances {
      registry.acquire_instance(instance);
    }
    ResourceLists {
      textures: self.textures.clone(),
      materials: self.materials.clone(),
      environments: self.environments.clone(),
      mesh_instances: self.mesh_instances.clone(),
    }
  }
}
