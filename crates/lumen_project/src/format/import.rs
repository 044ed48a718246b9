//! Second decode pass: registers a [`DecodedProject`] into the registry.
//!
//! Runs on the main thread. Each record is inserted, the dense id → handle
//! tables are built, every cross-reference is rewritten in one batch, and the
//! tables are dropped again. The target lists are a private set; the live
//! scene is not touched.

use std::collections::HashMap;

use super::decode::DecodedProject;
use crate::error::PersistResult;
use crate::lists::ResourceLists;
use crate::model::{MeshInstance, Settings, TEXTURE_SLOTS};
use crate::registry::{MaterialHandle, MeshHandle, Registry, TextureHandle};

/// What the import had to repair or drop.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportReport {
  pub settings: Option<Settings>,
  /// Material slots (of materials and mesh instances) whose id did not
  /// resolve and were cleared.
  pub unresolved_references: usize,
  /// Mesh instances dropped because their mesh did not resolve.
  pub dropped_instances: usize,
}

/// Registers `project` and appends it to `lists`.
///
/// On error (a list overflowing its capacity) everything inserted so far is
/// owned by `lists`; the caller releases it.
#[cfg_attr(feature = "tracy", tracing::instrument(skip_all))]
pub fn import_project(
  project: DecodedProject,
  registry: &mut Registry,
  lists: &mut ResourceLists,
) -> PersistResult<ImportReport> {
  let mut report = ImportReport {
    settings: project.settings,
    ..ImportReport::default()
  };

  let mut textures: HashMap<u32, TextureHandle> = HashMap::new();
  for record in project.textures {
    let handle = registry.insert_texture(record.texture);
    if let Err(e) = lists.push_texture(handle) {
      registry.release_texture(handle);
      return Err(e);
    }
    if textures.insert(record.id, handle).is_some() {
      log::warn!("texture id {} appears twice, using the later one", record.id);
    }
  }

  let mut materials: Vec<MaterialHandle> = Vec::with_capacity(project.materials.len());
  for record in project.materials {
    let mut material = record.material;
    for slot in 0..TEXTURE_SLOTS {
      material.textures[slot] = record.texture_ids[slot].and_then(|id| {
        let handle = textures.get(&id).copied();
        if handle.is_none() {
          report.unresolved_references += 1;
        }
        handle
      });
    }
    let handle = registry.insert_material(material);
    if let Err(e) = lists.push_material(handle) {
      registry.release_material(handle);
      return Err(e);
    }
    materials.push(handle);
  }

  // The table holds the insert reference of every mesh until the instances
  // have taken theirs.
  let mut meshes: HashMap<u32, MeshHandle> = HashMap::new();
  for record in project.meshes {
    let handle = registry.insert_mesh(record.mesh);
    if let Some(previous) = meshes.insert(record.id, handle) {
      registry.release_mesh(previous);
    }
  }

  let result = (|| -> PersistResult<()> {
    for record in project.mesh_instances {
      let Some(mesh) = record.mesh_id.and_then(|id| meshes.get(&id).copied()) else {
        log::warn!("dropping mesh instance: mesh {:?} not in file", record.mesh_id);
        report.dropped_instances += 1;
        continue;
      };
      let instance = MeshInstance {
        mesh,
        materials: record
          .material_ids
          .iter()
          .map(|id| {
            let handle = id.and_then(|id| materials.get(id as usize).copied());
            if id.is_some() && handle.is_none() {
              report.unresolved_references += 1;
            }
            handle
          })
          .collect(),
        transform: record.transform,
      };
      registry.acquire_instance(&instance);
      if let Err(e) = lists.push_mesh_instance(instance.clone()) {
        registry.release_instance(&instance);
        return Err(e);
      }
    }

    for environment in project.environments {
      let handle = registry.insert_environment(environment);
      if let Err(e) = lists.push_environment(handle) {
        registry.release_environment(handle);
        return Err(e);
      }
    }
    Ok(())
  })();

  for handle in meshes.into_values() {
    registry.release_mesh(handle);
  }
  result?;

  if report.unresolved_references > 0 || report.dropped_instances > 0 {
    log::warn!(
      "import repaired {} references and dropped {} mesh instances",
      report.unresolved_references,
      report.dropped_instances
    );
  }
  Ok(report)
}
