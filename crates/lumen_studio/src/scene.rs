//! Procedural demo scene used by `save`.

use std::f32::consts::TAU;

use glam::Vec3;
use lumen_project::model::{MeshGroup, Vertex};
use lumen_project::{
  Environment, ImageData, InstanceTransform, Material, Mesh, MeshInstance, PersistResult,
  PixelFormat, Registry, ResourceLists, Texture, TextureSlot,
};

/// Size of the demo scene.
#[derive(Clone, Copy, Debug)]
pub struct DemoScene {
  pub textures: usize,
  pub materials: usize,
  pub meshes: usize,
  pub environments: usize,
  /// Edge length of the generated textures in pixels.
  pub texture_size: u32,
}

impl Default for DemoScene {
  fn default() -> Self {
    Self {
      textures: 8,
      materials: 6,
      meshes: 4,
      environments: 2,
      texture_size: 256,
    }
  }
}

/// Checkerboard with a per-texture tint.
fn checker_texture(name: String, size: u32, tint: [u8; 3]) -> Texture {
  let mut data = Vec::with_capacity((size * size * 4) as usize);
  for y in 0..size {
    for x in 0..size {
      let on = ((x / 16) + (y / 16)) % 2 == 0;
      let shade = if on { 255u16 } else { 96 };
      for channel in tint {
        data.push((u16::from(channel) * shade / 255) as u8);
      }
      data.push(255);
    }
  }
  Texture {
    name,
    image: ImageData::new_2d(size, size, PixelFormat::Rgba8, data),
  }
}

/// Vertical sky gradient on every face, stored as RGBE.
fn sky_cube(size: u32, horizon: [u8; 3], zenith: [u8; 3]) -> ImageData {
  let mut data = Vec::with_capacity((6 * size * size * 4) as usize);
  for _face in 0..6 {
    for y in 0..size {
      let t = y as f32 / size.max(1) as f32;
      for _x in 0..size {
        for c in 0..3 {
          let v = f32::from(zenith[c]) * (1.0 - t) + f32::from(horizon[c]) * t;
          data.push(v as u8);
        }
        data.push(128);
      }
    }
  }
  ImageData::new_cube(size, PixelFormat::Rgbe, data)
}

/// A flat grid of `n` x `n` quads split into two material groups.
fn grid_mesh(name: String, n: u32) -> Mesh {
  let mut vertices = Vec::new();
  for y in 0..=n {
    for x in 0..=n {
      let (u, v) = (x as f32 / n as f32, y as f32 / n as f32);
      vertices.push(Vertex {
        position: [u - 0.5, 0.0, v - 0.5],
        normal: [0.0, 1.0, 0.0],
        uv: [u, v],
      });
    }
  }
  let mut indices = Vec::new();
  for y in 0..n {
    for x in 0..n {
      let i = y * (n + 1) + x;
      indices.extend_from_slice(&[i, i + n + 1, i + 1, i + 1, i + n + 1, i + n + 2]);
    }
  }
  let half = (indices.len() as u32 / 6 / 2) * 6;
  let groups = vec![
    MeshGroup {
      first_index: 0,
      index_count: half,
    },
    MeshGroup {
      first_index: half,
      index_count: indices.len() as u32 - half,
    },
  ];
  Mesh {
    name,
    vertices,
    indices,
    groups,
  }
}

impl DemoScene {
  /// Registers the scene and appends it to `lists`.
  pub fn build(&self, registry: &mut Registry, lists: &mut ResourceLists) -> PersistResult<()> {
    for i in 0..self.textures {
      let tint = [(i * 53 % 256) as u8, (i * 97 % 256) as u8, (i * 151 % 256) as u8];
      let texture = registry.insert_texture(checker_texture(
        format!("checker_{i:02}"),
        self.texture_size,
        tint,
      ));
      lists.push_texture(texture)?;
    }

    for i in 0..self.materials {
      let mut material = Material {
        name: format!("material_{i:02}"),
        roughness: (i as f32 + 1.0) / (self.materials as f32 + 1.0),
        metalness: if i % 2 == 0 { 0.0 } else { 1.0 },
        ..Material::default()
      };
      if !lists.textures.is_empty() {
        let count = lists.textures.len();
        material.set_texture(TextureSlot::Albedo, Some(lists.textures[i % count]));
        material.set_texture(TextureSlot::Surface, Some(lists.textures[(i + 1) % count]));
      }
      let material = registry.insert_material(material);
      lists.push_material(material)?;
    }

    for i in 0..self.meshes {
      let mesh = registry.insert_mesh(grid_mesh(format!("grid_{i:02}"), 8 + i as u32 * 4));
      let angle = i as f32 / self.meshes.max(1) as f32 * TAU;
      let material = |k: usize| {
        (!lists.materials.is_empty()).then(|| lists.materials[(i + k) % lists.materials.len()])
      };
      let instance = MeshInstance {
        mesh,
        materials: vec![material(0), material(1)],
        transform: InstanceTransform {
          position: Vec3::new(angle.cos() * 3.0, 0.0, angle.sin() * 3.0),
          rotation: Vec3::new(0.0, angle, 0.0),
          scale: 1.0,
        },
      };
      registry.acquire_instance(&instance);
      registry.release_mesh(mesh);
      lists.push_mesh_instance(instance)?;
    }

    for i in 0..self.environments {
      let shift = (i * 40) as u8;
      let environment = Environment {
        name: format!("sky_{i:02}"),
        skybox: sky_cube(64, [230, 200u8.wrapping_sub(shift), 170], [40, 90, 200]),
        radiance: sky_cube(32, [200, 180, 160], [50, 90, 180]),
        irradiance: sky_cube(8, [150, 140, 130], [70, 90, 130]),
        light_direction: Vec3::new(0.4, -1.0, 0.3 + i as f32 * 0.2).normalize(),
        ..Environment::default()
      };
      let environment = registry.insert_environment(environment);
      lists.push_environment(environment)?;
    }

    log::info!(
      "built demo scene: {} textures, {} materials, {} mesh instances, {} environments",
      lists.textures.len(),
      lists.materials.len(),
      lists.mesh_instances.len(),
      lists.environments.len()
    );
    Ok(())
  }
}
