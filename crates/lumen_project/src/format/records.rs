//! Payload layouts of the individual chunk records.
//!
//! Cross-references between records use dense file-local ids. Textures and
//! meshes carry their id explicitly; materials are numbered by the order of
//! their MAT chunks. Large blobs (pixels, vertex and index buffers) are LZ4
//! compressed inside the payload.

use crate::codec::lz4::{compress_lz4, decoded_len, decompress_lz4, max_decoded_len};
use crate::error::PersistResult;
use crate::format::chunk::{PayloadReader, PayloadWriter};
use crate::model::{
  Background, Environment, ImageData, InstanceTransform, Material, Mesh, MeshGroup, PixelFormat,
  Settings, TEXTURE_SLOTS, Texture, Tonemap, Vertex,
};

/// Serialized size of one [`Vertex`].
const VERTEX_SIZE: usize = 8 * 4;

/// A texture as read from a TEX chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureRecord {
  pub id: u32,
  pub texture: Texture,
}

/// A material as read from a MAT chunk. `material.textures` is empty until
/// the texture ids are resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialRecord {
  pub material: Material,
  pub texture_ids: [Option<u32>; TEXTURE_SLOTS],
}

#[derive(Clone, Debug, PartialEq)]
pub struct MeshRecord {
  pub id: u32,
  pub mesh: Mesh,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MeshInstanceRecord {
  pub mesh_id: Option<u32>,
  pub material_ids: Vec<Option<u32>>,
  pub transform: InstanceTransform,
}

/// Reads an LZ4 blob that must decode to exactly `expected` bytes.
fn read_blob_exact(r: &mut PayloadReader<'_>, expected: usize) -> PersistResult<Vec<u8>> {
  let data = r.bytes()?;
  if decoded_len(data)? != expected || expected > r.blob_limit() {
    return Err(r.corrupt());
  }
  decompress_lz4(data, expected)
}

/// Reads an LZ4 blob of any size up to the reader's blob limit.
fn read_blob(r: &mut PayloadReader<'_>) -> PersistResult<Vec<u8>> {
  let data = r.bytes()?;
  let len = decoded_len(data)?;
  if len > r.blob_limit() || len > max_decoded_len(data) {
    return Err(r.corrupt());
  }
  decompress_lz4(data, len)
}

pub fn write_image(w: &mut PayloadWriter, image: &ImageData) {
  w.u32(image.width);
  w.u32(image.height);
  w.u8(image.faces);
  w.u8(image.mips);
  w.u8(image.format as u8);
  w.bytes(&compress_lz4(&image.data));
}

pub fn read_image(r: &mut PayloadReader<'_>) -> PersistResult<ImageData> {
  let width = r.u32()?;
  let height = r.u32()?;
  let faces = r.u8()?;
  let mips = r.u8()?;
  let format = PixelFormat::from_u8(r.u8()?).ok_or_else(|| r.corrupt())?;
  let mut image = ImageData {
    width,
    height,
    faces,
    mips,
    format,
    data: Vec::new(),
  };
  let expected = image.expected_len().ok_or_else(|| r.corrupt())?;
  image.data = read_blob_exact(r, expected)?;
  Ok(image)
}

pub fn write_texture(w: &mut PayloadWriter, id: u32, texture: &Texture) {
  w.u32(id);
  w.str(&texture.name);
  write_image(w, &texture.image);
}

pub fn read_texture(r: &mut PayloadReader<'_>) -> PersistResult<TextureRecord> {
  let id = r.u32()?;
  let name = r.string()?;
  let image = read_image(r)?;
  Ok(TextureRecord {
    id,
    texture: Texture { name, image },
  })
}

pub fn write_material(
  w: &mut PayloadWriter,
  material: &Material,
  texture_ids: &[Option<u32>; TEXTURE_SLOTS],
) {
  w.str(&material.name);
  w.f32s(&material.base_color);
  w.f32s(&material.emissive);
  w.f32(material.roughness);
  w.f32(material.metalness);
  w.f32(material.normal_scale);
  for &id in texture_ids {
    w.id(id);
  }
}

pub fn read_material(r: &mut PayloadReader<'_>) -> PersistResult<MaterialRecord> {
  let name = r.string()?;
  let base_color = r.f32s::<4>()?;
  let emissive = r.f32s::<3>()?;
  let roughness = r.f32()?;
  let metalness = r.f32()?;
  let normal_scale = r.f32()?;
  let mut texture_ids = [None; TEXTURE_SLOTS];
  for id in &mut texture_ids {
    *id = r.id()?;
  }
  Ok(MaterialRecord {
    material: Material {
      name,
      base_color,
      emissive,
      roughness,
      metalness,
      normal_scale,
      textures: [None; TEXTURE_SLOTS],
    },
    texture_ids,
  })
}

pub fn write_mesh(w: &mut PayloadWriter, id: u32, mesh: &Mesh) {
  w.u32(id);
  w.str(&mesh.name);

  let mut vertex_bytes = Vec::with_capacity(mesh.vertices.len() * VERTEX_SIZE);
  for v in &mesh.vertices {
    for f in v.position.iter().chain(&v.normal).chain(&v.uv) {
      vertex_bytes.extend_from_slice(&f.to_le_bytes());
    }
  }
  w.bytes(&compress_lz4(&vertex_bytes));

  let index_bytes: Vec<u8> = mesh.indices.iter().flat_map(|i| i.to_le_bytes()).collect();
  w.bytes(&compress_lz4(&index_bytes));

  w.u32(mesh.groups.len() as u32);
  for group in &mesh.groups {
    w.u32(group.first_index);
    w.u32(group.index_count);
  }
}

fn le_f32(bytes: &[u8]) -> f32 {
  f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub fn read_mesh(r: &mut PayloadReader<'_>) -> PersistResult<MeshRecord> {
  let id = r.u32()?;
  let name = r.string()?;

  let vertex_bytes = read_blob(r)?;
  if vertex_bytes.len() % VERTEX_SIZE != 0 {
    return Err(r.corrupt());
  }
  let vertices = vertex_bytes
    .chunks_exact(VERTEX_SIZE)
    .map(|v| {
      let f = |i: usize| le_f32(&v[i * 4..]);
      Vertex {
        position: [f(0), f(1), f(2)],
        normal: [f(3), f(4), f(5)],
        uv: [f(6), f(7)],
      }
    })
    .collect();

  let index_bytes = read_blob(r)?;
  if index_bytes.len() % 4 != 0 {
    return Err(r.corrupt());
  }
  let indices = index_bytes
    .chunks_exact(4)
    .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    .collect();

  let group_count = r.u32()? as usize;
  // Each group is 8 bytes; reject counts the payload cannot hold before
  // allocating.
  if group_count > r.remaining() / 8 {
    return Err(r.corrupt());
  }
  let mut groups = Vec::with_capacity(group_count);
  for _ in 0..group_count {
    groups.push(MeshGroup {
      first_index: r.u32()?,
      index_count: r.u32()?,
    });
  }

  Ok(MeshRecord {
    id,
    mesh: Mesh {
      name,
      vertices,
      indices,
      groups,
    },
  })
}

pub fn write_mesh_instance(
  w: &mut PayloadWriter,
  mesh_id: Option<u32>,
  material_ids: &[Option<u32>],
  transform: &InstanceTransform,
) {
  w.id(mesh_id);
  w.u32(material_ids.len() as u32);
  for &id in material_ids {
    w.id(id);
  }
  w.vec3(transform.position);
  w.vec3(transform.rotation);
  w.f32(transform.scale);
}

pub fn read_mesh_instance(r: &mut PayloadReader<'_>) -> PersistResult<MeshInstanceRecord> {
  let mesh_id = r.id()?;
  let count = r.u32()? as usize;
  if count > r.remaining() / 4 {
    return Err(r.corrupt());
  }
  let mut material_ids = Vec::with_capacity(count);
  for _ in 0..count {
    material_ids.push(r.id()?);
  }
  let transform = InstanceTransform {
    position: r.vec3()?,
    rotation: r.vec3()?,
    scale: r.f32()?,
  };
  Ok(MeshInstanceRecord {
    mesh_id,
    material_ids,
    transform,
  })
}

pub fn write_environment(w: &mut PayloadWriter, env: &Environment) {
  w.str(&env.name);
  write_image(w, &env.skybox);
  write_image(w, &env.radiance);
  write_image(w, &env.irradiance);
  w.f32(env.exposure);
  w.f32(env.gamma);
  w.vec3(env.light_direction);
  w.f32s(&env.light_color);
}

pub fn read_environment(r: &mut PayloadReader<'_>) -> PersistResult<Environment> {
  Ok(Environment {
    name: r.string()?,
    skybox: read_image(r)?,
    radiance: read_image(r)?,
    irradiance: read_image(r)?,
    exposure: r.f32()?,
    gamma: r.f32()?,
    light_direction: r.vec3()?,
    light_color: r.f32s::<3>()?,
  })
}

pub fn write_settings(w: &mut PayloadWriter, s: &Settings) {
  w.u8(s.background as u8);
  w.f32(s.background_lod);
  w.f32(s.exposure);
  w.f32(s.gamma);
  w.u8(s.tonemap as u8);
  w.bool(s.fxaa);
  w.f32(s.camera_yaw);
  w.f32(s.camera_pitch);
  w.f32(s.camera_distance);
  w.f32(s.fov);
  w.f32(s.environment_rotation);
  w.u16(s.selected_environment);
  w.u16(s.selected_mesh_instance);
}

pub fn read_settings(r: &mut PayloadReader<'_>) -> PersistResult<Settings> {
  let background = Background::from_u8(r.u8()?).ok_or_else(|| r.corrupt())?;
  let background_lod = r.f32()?;
  let exposure = r.f32()?;
  let gamma = r.f32()?;
  let tonemap = Tonemap::from_u8(r.u8()?).ok_or_else(|| r.corrupt())?;
  Ok(Settings {
    background,
    background_lod,
    exposure,
    gamma,
    tonemap,
    fxaa: r.bool()?,
    camera_yaw: r.f32()?,
    camera_pitch: r.f32()?,
    camera_distance: r.f32()?,
    fov: r.f32()?,
    environment_rotation: r.f32()?,
    selected_environment: r.u16()?,
    selected_mesh_instance: r.u16()?,
  })
}

#[cfg(test)]
mod tests {
  use glam::Vec3;

  use super::*;
  use crate::error::PersistError;

  #[test]
  fn mesh_record_keeps_geometry() {
    let mesh = Mesh {
      name: "quad".into(),
      vertices: vec![
        Vertex {
          position: [0.0, 0.0, 0.0],
          normal: [0.0, 1.0, 0.0],
          uv: [0.0, 0.0],
        },
        Vertex {
          position: [1.0, 0.0, 0.5],
          normal: [0.0, 1.0, 0.0],
          uv: [1.0, 0.25],
        },
      ],
      indices: vec![0, 1, 1, 0, 1, 0],
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
    };
    let mut w = PayloadWriter::new();
    write_mesh(&mut w, 3, &mesh);
    let buf = w.finish().unwrap();

    let record = read_mesh(&mut PayloadReader::new(&buf)).unwrap();
    assert_eq!(record.id, 3);
    assert_eq!(record.mesh, mesh);
  }

  #[test]
  fn material_texture_ids_survive() {
    let material = Material {
      name: "rust".into(),
      roughness: 0.9,
      ..Material::default()
    };
    let ids = [Some(0), None, Some(2), None, None, Some(0)];
    let mut w = PayloadWriter::new();
    write_material(&mut w, &material, &ids);
    let buf = w.finish().unwrap();

    let record = read_material(&mut PayloadReader::new(&buf)).unwrap();
    assert_eq!(record.texture_ids, ids);
    assert_eq!(record.material, material);
  }

  #[test]
  fn environment_with_cubemaps() {
    let env = Environment {
      name: "studio".into(),
      skybox: ImageData::new_cube(2, PixelFormat::Rgba16F, vec![5; 2 * 2 * 6 * 8]),
      radiance: ImageData::new_cube(1, PixelFormat::Rgbe, vec![9; 6 * 4]),
      irradiance: ImageData::default(),
      exposure: 0.5,
      gamma: 2.4,
      light_direction: Vec3::new(0.0, -1.0, 0.25),
      light_color: [1.0, 0.9, 0.8],
    };
    let mut w = PayloadWriter::new();
    write_environment(&mut w, &env);
    let buf = w.finish().unwrap();

    assert_eq!(read_environment(&mut PayloadReader::new(&buf)).unwrap(), env);
  }

  #[test]
  fn unknown_pixel_format_is_corrupt() {
    let mut w = PayloadWriter::new();
    w.u32(1);
    w.u32(1);
    w.u8(1);
    w.u8(1);
    w.u8(42);
    let buf = w.finish().unwrap();
    let err = read_image(&mut PayloadReader::new(&buf)).unwrap_err();
    assert!(matches!(err, PersistError::CorruptChunk { .. }));
  }

  fn texture_chunk(width: u32, height: u32, blob: &[u8]) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.u32(0);
    w.str("forged");
    w.u32(width);
    w.u32(height);
    w.u8(1);
    w.u8(1);
    w.u8(PixelFormat::Rgba8 as u8);
    w.bytes(blob);
    w.finish().unwrap()
  }

  #[test]
  fn huge_pixel_size_prefix_is_corrupt() {
    let mut blob = 0xF000_0000u32.to_le_bytes().to_vec();
    blob.extend_from_slice(&[0x10, 0x00]);
    let buf = texture_chunk(1, 1, &blob);
    let err = read_texture(&mut PayloadReader::new(&buf).with_blob_limit(4096)).unwrap_err();
    assert!(matches!(err, PersistError::CorruptChunk { .. }), "{err}");
  }

  #[test]
  fn pixel_data_must_match_the_dimensions() {
    // 1x1 RGBA8 needs 4 bytes.
    let buf = texture_chunk(1, 1, &compress_lz4(&[0xAB]));
    let err = read_texture(&mut PayloadReader::new(&buf)).unwrap_err();
    assert!(matches!(err, PersistError::CorruptChunk { .. }), "{err}");

    let buf = texture_chunk(1, 1, &compress_lz4(&[0xAB; 4]));
    let record = read_texture(&mut PayloadReader::new(&buf)).unwrap();
    assert_eq!(record.texture.image.data, vec![0xAB; 4]);
  }

  #[test]
  fn image_larger_than_the_blob_limit_is_corrupt() {
    let pixels = vec![0u8; 64 * 64 * 4];
    let buf = texture_chunk(64, 64, &compress_lz4(&pixels));
    let err = read_texture(&mut PayloadReader::new(&buf).with_blob_limit(1024)).unwrap_err();
    assert!(matches!(err, PersistError::CorruptChunk { .. }));
  }

  #[test]
  fn mesh_blobs_are_bounded() {
    let mut w = PayloadWriter::new();
    w.u32(0);
    w.str("forged");
    let mut blob = 0x4000_0000u32.to_le_bytes().to_vec();
    blob.extend_from_slice(&[0x1F, 0x00, 0x01, 0x00]);
    w.bytes(&blob);
    let buf = w.finish().unwrap();
    let err = read_mesh(&mut PayloadReader::new(&buf)).unwrap_err();
    assert!(matches!(err, PersistError::CorruptChunk { .. }));

    let vertices = vec![0u8; 32 * 64];
    let mut w = PayloadWriter::new();
    w.u32(0);
    w.str("big");
    w.bytes(&compress_lz4(&vertices));
    let buf = w.finish().unwrap();
    let err = read_mesh(&mut PayloadReader::new(&buf).with_blob_limit(1024)).unwrap_err();
    assert!(matches!(err, PersistError::CorruptChunk { .. }));
  }
}
