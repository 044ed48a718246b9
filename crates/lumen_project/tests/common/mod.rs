//! Scene fixtures shared by the e2e tests.

#![allow(dead_code)]

use std::thread;
use std::time::Duration;

use glam::Vec3;
use lumen_project::model::{MeshGroup, Vertex};
use lumen_project::{
  Environment, HeadlessGpu, ImageData, InstanceTransform, Material, Mesh, MeshInstance,
  Orchestrator, PixelFormat, Registry, ResourceLists, Session, StudioConfig, Texture, TextureSlot,
};

/// How many resources of each kind a fixture scene gets.
#[derive(Clone, Copy, Debug)]
pub struct SceneShape {
  pub textures: usize,
  pub materials: usize,
  pub meshes: usize,
  pub environments: usize,
}

impl SceneShape {
  pub const SMALL: Self = Self {
    textures: 3,
    materials: 2,
    meshes: 2,
    environments: 2,
  };
}

/// Deterministic pixel bytes that still compress a little.
pub fn pixels(len: usize, seed: u8) -> Vec<u8> {
  (0..len)
    .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) & 0xF0)
    .collect()
}

pub fn texture(name: &str, seed: u8) -> Texture {
  Texture {
    name: name.to_owned(),
    image: ImageData::new_2d(8, 8, PixelFormat::Rgba8, pixels(8 * 8 * 4, seed)),
  }
}

pub fn environment(name: &str, seed: u8) -> Environment {
  let cube = |size: u32, seed: u8| {
    ImageData::new_cube(
      size,
      PixelFormat::Rgba16F,
      pixels(6 * (size * size) as usize * 8, seed),
    )
  };
  Environment {
    name: name.to_owned(),
    skybox: cube(4, seed),
    radiance: cube(2, seed.wrapping_add(1)),
    irradiance: cube(1, seed.wrapping_add(2)),
    exposure: 0.5,
    light_direction: Vec3::new(0.3, -1.0, 0.2).normalize(),
    ..Environment::default()
  }
}

/// Two triangles, one material group each.
pub fn quad(name: &str) -> Mesh {
  let vertex = |x: f32, y: f32| Vertex {
    position: [x, y, 0.0],
    normal: [0.0, 0.0, 1.0],
    uv: [x, y],
  };
  Mesh {
    name: name.to_owned(),
    vertices: vec![
      vertex(0.0, 0.0),
      vertex(1.0, 0.0),
      vertex(1.0, 1.0),
      vertex(0.0, 1.0),
    ],
    indices: vec![0, 1, 2, 0, 2, 3],
    groups: vec![
      MeshGroup {
        first_index: 0,
        index_count: 3,
      },
      MeshGroup {
        first_index: 3,
        index_count: 3,
      },
    ],
  }
}

/// Fills `lists` with a scene of the given shape.
///
/// Material `i` uses texture `i % textures` as albedo. Mesh `i` gets one
/// instance whose slots use material `i % materials`.
pub fn populate(registry: &mut Registry, lists: &mut ResourceLists, shape: SceneShape) {
  for i in 0..shape.textures {
    let handle = registry.insert_texture(texture(&format!("texture-{i}"), i as u8));
    lists.push_texture(handle).unwrap();
  }
  for i in 0..shape.materials {
    let mut material = Material {
      name: format!("material-{i}"),
      roughness: 0.1 * i as f32,
      ..Material::default()
    };
    if shape.textures > 0 {
      material.set_texture(TextureSlot::Albedo, Some(lists.textures[i % shape.textures]));
    }
    let handle = registry.insert_material(material);
    lists.push_material(handle).unwrap();
  }
  for i in 0..shape.meshes {
    let mesh = registry.insert_mesh(quad(&format!("mesh-{i}")));
    let material = lists.materials.get(i % shape.materials.max(1)).copied();
    let instance = MeshInstance {
      mesh,
      materials: vec![material; 2],
      transform: InstanceTransform {
        position: Vec3::new(i as f32 * 2.0, 0.0, 0.0),
        ..InstanceTransform::default()
      },
    };
    registry.acquire_instance(&instance);
    // The instance owns its own mesh reference now.
    registry.release_mesh(mesh);
    lists.push_mesh_instance(instance).unwrap();
  }
  for i in 0..shape.environments {
    let handle = registry.insert_environment(environment(&format!("environment-{i}"), i as u8));
    lists.push_environment(handle).unwrap();
  }
}

/// Uploads everything in `lists`, as a renderer would after building them.
pub fn upload_all(registry: &mut Registry, lists: &ResourceLists, gpu: &mut HeadlessGpu) {
  for &texture in &lists.textures {
    registry.upload_texture(texture, gpu);
  }
  for mesh in lists.meshes() {
    registry.upload_mesh(mesh, gpu);
  }
  for &environment in &lists.environments {
    registry.upload_environment(environment, gpu);
  }
}

/// Frame loop around an [`Orchestrator`].
pub struct StudioHarness {
  pub orchestrator: Orchestrator,
  pub session: Session,
  pub registry: Registry,
  pub gpu: HeadlessGpu,
}

impl StudioHarness {
  /// Creates a harness that already finished its startup sequence.
  pub fn new() -> Self {
    Self::with_config(StudioConfig::immediate())
  }

  pub fn with_config(config: StudioConfig) -> Self {
    let mut harness = Self {
      orchestrator: Orchestrator::new(config),
      session: Session::new(),
      registry: Registry::new(),
      gpu: HeadlessGpu::new(),
    };
    for _ in 0..1_000 {
      harness.tick();
      if harness.orchestrator.is_idle(&harness.session) {
        return harness;
      }
    }
    panic!("startup did not finish");
  }

  pub fn tick(&mut self) {
    self
      .orchestrator
      .tick(&mut self.session, &mut self.registry, &mut self.gpu);
  }

  /// Builds a scene into the live lists and uploads it.
  pub fn populate(&mut self, shape: SceneShape) {
    populate(&mut self.registry, self.orchestrator.live_mut(), shape);
    upload_all(&mut self.registry, self.orchestrator.live(), &mut self.gpu);
  }

  /// Ticks until the orchestrator is idle again, returning the frame count.
  pub fn run_until_idle(&mut self) -> usize {
    for frame in 1..=5_000 {
      self.tick();
      if self.orchestrator.is_idle(&self.session) {
        return frame;
      }
      thread::sleep(Duration::from_millis(1));
    }
    panic!("orchestrator did not become idle");
  }
}
