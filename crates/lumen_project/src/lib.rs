//! Lumen Project - asynchronous project persistence for an
//! image-based-lighting studio.
//!
//! A scene of textures, materials, meshes, environment maps and UI settings
//! is written to and read from a single compressed project file on a
//! background thread while the frame loop keeps running. A loaded project is
//! uploaded to the GPU one resource per frame and then swapped into the live
//! scene.
//!
//! The frame loop owns a [`Session`], a [`Registry`] and an
//! [`Orchestrator`], and calls [`Orchestrator::tick`] once per frame.

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod format;
pub mod gpu;
pub mod lists;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod scratch;
pub mod session;
pub mod status;
pub mod task;

pub use codec::{CodecBuffers, CodecStats, CompressionLevel, StreamReader, StreamWriter};
pub use config::{ConfigError, StudioConfig};
pub use coordinator::{AppState, EventQueue, Events, StateRegister};
pub use error::{PersistError, PersistResult};
pub use format::{
  DecodedProject, EncodeStats, ImportReport, PersistObserver, ProjectSnapshot, decode_project,
  encode_project, import_project, load_project, save_project,
};
pub use gpu::{GpuBackend, GpuId, HeadlessGpu};
pub use lists::ResourceLists;
pub use model::{
  Environment, ImageData, InstanceTransform, Material, Mesh, MeshInstance, PixelFormat, Settings,
  Texture, TextureSlot,
};
pub use orchestrator::{JobOutput, Orchestrator, RequestRejected};
pub use registry::{EnvironmentHandle, MaterialHandle, MeshHandle, Registry, TextureHandle};
pub use scratch::ScratchBuffer;
pub use session::Session;
pub use status::{MessageKind, StatusMessages};
pub use task::{TaskKind, TaskRunner, TaskStatus};
