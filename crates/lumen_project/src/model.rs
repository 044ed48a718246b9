//! Resource payloads: images, textures, materials, meshes, environments and
//! the UI settings stored alongside them.

use glam::Vec3;

use crate::registry::{MaterialHandle, MeshHandle, TextureHandle};

/// Pixel layout of an [`ImageData`].
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PixelFormat {
  #[default]
  Rgba8 = 0,
  Rgba16F = 1,
  Rgba32F = 2,
  /// Shared-exponent HDR (RGBE), 4 bytes per pixel.
  Rgbe = 3,
}

impl PixelFormat {
  /// Converts a byte to a pixel format.
  pub fn from_u8(value: u8) -> Option<Self> {
    match value {
      0 => Some(Self::Rgba8),
      1 => Some(Self::Rgba16F),
      2 => Some(Self::Rgba32F),
      3 => Some(Self::Rgbe),
      _ => None,
    }
  }

  pub fn bytes_per_pixel(self) -> usize {
    match self {
      Self::Rgba8 | Self::Rgbe => 4,
      Self::Rgba16F => 8,
      Self::Rgba32F => 16,
    }
  }
}

/// Raw image or cubemap, all faces and mips packed back to back.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ImageData {
  pub width: u32,
  pub height: u32,
  /// 1 for 2D images, 6 for cubemaps.
  pub faces: u8,
  pub mips: u8,
  pub format: PixelFormat,
  pub data: Vec<u8>,
}

impl ImageData {
  /// Creates a single-mip 2D image.
  pub fn new_2d(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
    Self {
      width,
      height,
      faces: 1,
      mips: 1,
      format,
      data,
    }
  }

  /// Creates a single-mip cubemap with square faces of `size`.
  pub fn new_cube(size: u32, format: PixelFormat, data: Vec<u8>) -> Self {
    Self {
      width: size,
      height: size,
      faces: 6,
      mips: 1,
      format,
      data,
    }
  }

  pub fn is_cubemap(&self) -> bool {
    self.faces == 6
  }

  pub fn byte_len(&self) -> usize {
    self.data.len()
  }

  /// Size of `data` implied by the dimensions, format, faces and mips.
  /// Each mip halves both edges, down to 1. `None` on overflow.
  pub fn expected_len(&self) -> Option<usize> {
    let mut total = 0usize;
    for mip in 0..u32::from(self.mips) {
      let width = self.width.checked_shr(mip).unwrap_or(0).max(1) as usize;
      let height = self.height.checked_shr(mip).unwrap_or(0).max(1) as usize;
      let level = width
        .checked_mul(height)?
        .checked_mul(usize::from(self.faces))?
        .checked_mul(self.format.bytes_per_pixel())?;
      total = total.checked_add(level)?;
    }
    Some(total)
  }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Texture {
  pub name: String,
  pub image: ImageData,
}

/// Texture slots of a material.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSlot {
  Albedo = 0,
  Normal = 1,
  /// Roughness in R, metalness in G.
  Surface = 2,
  Reflectivity = 3,
  Occlusion = 4,
  Emissive = 5,
}

/// Number of texture slots per material.
pub const TEXTURE_SLOTS: usize = 6;

impl TextureSlot {
  pub const ALL: [Self; TEXTURE_SLOTS] = [
    Self::Albedo,
    Self::Normal,
    Self::Surface,
    Self::Reflectivity,
    Self::Occlusion,
    Self::Emissive,
  ];
}

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
  pub name: String,
  pub base_color: [f32; 4],
  pub emissive: [f32; 3],
  pub roughness: f32,
  pub metalness: f32,
  pub normal_scale: f32,
  pub textures: [Option<TextureHandle>; TEXTURE_SLOTS],
}

impl Default for Material {
  fn default() -> Self {
    Self {
      name: String::new(),
      base_color: [1.0; 4],
      emissive: [0.0; 3],
      roughness: 0.5,
      metalness: 0.0,
      normal_scale: 1.0,
      textures: [None; TEXTURE_SLOTS],
    }
  }
}

impl Material {
  pub fn texture(&self, slot: TextureSlot) -> Option<TextureHandle> {
    self.textures[slot as usize]
  }

  pub fn set_texture(&mut self, slot: TextureSlot, texture: Option<TextureHandle>) {
    self.textures[slot as usize] = texture;
  }

  /// Referenced textures in slot order.
  pub fn texture_handles(&self) -> impl Iterator<Item = TextureHandle> + '_ {
    self.textures.iter().flatten().copied()
  }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Vertex {
  pub position: [f32; 3],
  pub normal: [f32; 3],
  pub uv: [f32; 2],
}

/// Index range drawn with one material slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct MeshGroup {
  pub first_index: u32,
  pub index_count: u32,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Mesh {
  pub name: String,
  pub vertices: Vec<Vertex>,
  pub indices: Vec<u32>,
  pub groups: Vec<MeshGroup>,
}

impl Mesh {
  /// Number of material slots an instance of this mesh carries.
  pub fn material_slots(&self) -> usize {
    self.groups.len().max(1)
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InstanceTransform {
  pub position: Vec3,
  /// Euler angles in radians.
  pub rotation: Vec3,
  pub scale: f32,
}

impl Default for InstanceTransform {
  fn default() -> Self {
    Self {
      position: Vec3::ZERO,
      rotation: Vec3::ZERO,
      scale: 1.0,
    }
  }
}

/// A placed mesh. Held by value in resource lists; owns one reference to its
/// mesh and to every assigned material.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshInstance {
  pub mesh: MeshHandle,
  pub materials: Vec<Option<MaterialHandle>>,
  pub transform: InstanceTransform,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Environment {
  pub name: String,
  pub skybox: ImageData,
  pub radiance: ImageData,
  pub irradiance: ImageData,
  pub exposure: f32,
  pub gamma: f32,
  pub light_direction: Vec3,
  pub light_color: [f32; 3],
}

impl Default for Environment {
  fn default() -> Self {
    Self {
      name: String::new(),
      skybox: ImageData::default(),
      radiance: ImageData::default(),
      irradiance: ImageData::default(),
      exposure: 0.0,
      gamma: 2.2,
      light_direction: Vec3::NEG_Y,
      light_color: [1.0; 3],
    }
  }
}

/// Which environment image is drawn as background.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Background {
  #[default]
  Skybox = 0,
  Radiance = 1,
  Irradiance = 2,
}

impl Background {
  pub fn from_u8(value: u8) -> Option<Self> {
    match value {
      0 => Some(Self::Skybox),
      1 => Some(Self::Radiance),
      2 => Some(Self::Irradiance),
      _ => None,
    }
  }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tonemap {
  None = 0,
  Reinhard = 1,
  #[default]
  Filmic = 2,
}

impl Tonemap {
  pub fn from_u8(value: u8) -> Option<Self> {
    match value {
      0 => Some(Self::None),
      1 => Some(Self::Reinhard),
      2 => Some(Self::Filmic),
      _ => None,
    }
  }
}

/// UI settings saved with a project.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
  pub background: Background,
  pub background_lod: f32,
  pub exposure: f32,
  pub gamma: f32,
  pub tonemap: Tonemap,
  pub fxaa: bool,
  /// Radians.
  pub camera_yaw: f32,
  /// Radians.
  pub camera_pitch: f32,
  pub camera_distance: f32,
  /// Degrees.
  pub fov: f32,
  /// Radians.
  pub environment_rotation: f32,
  pub selected_environment: u16,
  pub selected_mesh_instance: u16,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      background: Background::Skybox,
      background_lod: 0.0,
      exposure: 0.0,
      gamma: 2.2,
      tonemap: Tonemap::Filmic,
      fxaa: true,
      camera_yaw: 0.0,
      camera_pitch: 0.0,
      camera_distance: 3.0,
      fov: 60.0,
      environment_rotation: 0.0,
      selected_environment: 0,
      selected_mesh_instance: 0,
    }
  }
}

/// Wraps an angle in radians into `[-π, π)`.
pub fn wrap_angle(radians: f32) -> f32 {
  use std::f32::consts::{PI, TAU};
  if !radians.is_finite() {
    return 0.0;
  }
  let wrapped = (radians + PI).rem_euclid(TAU) - PI;
  // rem_euclid can round up to TAU for tiny negative inputs.
  if wrapped >= PI { wrapped - TAU } else { wrapped }
}

impl Settings {
  /// Applies `loaded` over `self`, wrapping rotations into canonical range.
  pub fn apply_loaded(&mut self, loaded: &Settings) {
    *self = loaded.clone();
    self.camera_yaw = wrap_angle(self.camera_yaw);
    self.camera_pitch = wrap_angle(self.camera_pitch);
    self.environment_rotation = wrap_angle(self.environment_rotation);
  }
}
