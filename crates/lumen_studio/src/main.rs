//! Headless Lumen Studio: saves a generated scene, loads project files
//! through the frame-driven transition and lists their chunks.

mod logging;
mod scene;
mod studio;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lumen_project::format::inspect_project;
use lumen_project::{CompressionLevel, ScratchBuffer, StreamReader, StudioConfig};

use crate::scene::DemoScene;
use crate::studio::Studio;

#[derive(Parser)]
#[command(name = "lumen_studio", version, about)]
struct Args {
  /// Studio config file; defaults apply when it does not exist
  #[arg(short = 'c', long = "config", global = true, default_value = "studio.toml")]
  config: PathBuf,

  /// Debug logging (RUST_LOG overrides)
  #[arg(short = 'v', long = "verbose", global = true)]
  verbose: bool,

  /// Frames per second of the update loop
  #[arg(long = "fps", global = true, default_value_t = 60)]
  fps: u32,

  /// Skip the splash screen and intro animation
  #[arg(long = "skip-intro", global = true)]
  skip_intro: bool,

  /// Give up after this many seconds
  #[arg(long = "timeout", global = true, default_value_t = 120)]
  timeout: u64,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Generate a demo scene and save it
  Save {
    /// Output file; `<project_dir>/demo.lumen` when omitted
    path: Option<PathBuf>,

    /// Compression level 0-10; the configured level when omitted
    #[arg(short = 'l', long = "level")]
    level: Option<u8>,

    #[arg(long = "textures", default_value_t = 8)]
    textures: usize,
    #[arg(long = "materials", default_value_t = 6)]
    materials: usize,
    #[arg(long = "meshes", default_value_t = 4)]
    meshes: usize,
    #[arg(long = "environments", default_value_t = 2)]
    environments: usize,
    /// Edge length of generated textures
    #[arg(long = "texture-size", default_value_t = 256)]
    texture_size: u32,
  },
  /// Load a project through the upload and transition states
  Load {
    path: PathBuf,

    /// Show a demo scene first, so the load replaces it
    #[arg(long = "replace-demo")]
    replace_demo: bool,
  },
  /// List the chunks of a project file
  Inspect { path: PathBuf },
  /// Write the effective config to a file
  InitConfig { path: Option<PathBuf> },
}

fn main() -> Result<()> {
  let args = Args::parse();
  logging::init_log(args.verbose);
  #[cfg(feature = "tracy")]
  logging::init_tracy();

  let config = StudioConfig::load_or_default(&args.config)?;
  let timeout = Duration::from_secs(args.timeout);

  match args.command {
    Command::Save {
      path,
      level,
      textures,
      materials,
      meshes,
      environments,
      texture_size,
    } => {
      let path = path.unwrap_or_else(|| config.project_dir().join("demo.lumen"));
      if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
      {
        std::fs::create_dir_all(parent)
          .with_context(|| format!("creating {}", parent.display()))?;
      }
      let level = level.map_or(config.persistence.compression_level, CompressionLevel::new);
      let scene = DemoScene {
        textures,
        materials,
        meshes,
        environments,
        texture_size,
      };

      let mut studio = Studio::new(config, args.fps);
      studio.startup(args.skip_intro, timeout)?;
      studio.build_demo(&scene)?;
      let result = studio
        .save(path.clone(), level, timeout)
        .with_context(|| format!("saving {}", path.display()));
      studio.shutdown();
      result
    }
    Command::Load { path, replace_demo } => {
      let mut studio = Studio::new(config, args.fps);
      studio.startup(args.skip_intro, timeout)?;
      if replace_demo {
        studio.build_demo(&DemoScene::default())?;
      }
      let started = studio.frames();
      let result = studio
        .load(path.clone(), timeout)
        .with_context(|| format!("loading {}", path.display()));
      if result.is_ok() {
        report_load(&studio, studio.frames() - started);
      }
      studio.shutdown();
      result
    }
    Command::Inspect { path } => inspect(&path, &config),
    Command::InitConfig { path } => {
      let path = path.unwrap_or(args.config);
      config.save(&path)?;
      println!("wrote {}", path.display());
      Ok(())
    }
  }
}

fn report_load(studio: &Studio, frames: u64) {
  let live = studio.orchestrator.live();
  println!(
    "loaded in {frames} frames: {} textures, {} materials, {} mesh instances, {} environments",
    live.textures.len(),
    live.materials.len(),
    live.mesh_instances.len(),
    live.environments.len()
  );
  let counters = studio.gpu.counters();
  println!(
    "gpu: {} uploads ({} bytes), {} destroyed, {} resident",
    counters.uploads(),
    counters.bytes,
    counters.destroyed,
    studio.gpu.resident()
  );
  if let Some(report) = studio.orchestrator.last_import()
    && (report.unresolved_references > 0 || report.dropped_instances > 0)
  {
    println!(
      "{} unresolved references, {} dropped instances",
      report.unresolved_references, report.dropped_instances
    );
  }
  if let Some(high_water) = studio.orchestrator.scratch_high_water() {
    log::debug!("scratch high water: {high_water} bytes");
  }
}

fn inspect(path: &Path, config: &StudioConfig) -> Result<()> {
  let mut scratch = ScratchBuffer::new(config.persistence.scratch_limit);
  let reader = StreamReader::new(config.persistence.buffers);
  let summary = inspect_project(path, &mut scratch, &reader)
    .with_context(|| format!("inspecting {}", path.display()))?;
  print!("{summary}");
  Ok(())
}
