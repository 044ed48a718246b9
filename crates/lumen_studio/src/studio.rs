//! Fixed-rate headless frame loop.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use lumen_project::{
  AppState, CompressionLevel, HeadlessGpu, MessageKind, Orchestrator, Registry, Session,
  StudioConfig,
};
// WASM compat: std::time::Instant panics on wasm32
use web_time::Instant;

use crate::scene::DemoScene;

/// Everything a frame needs, without a window.
pub struct Studio {
  pub orchestrator: Orchestrator,
  pub session: Session,
  pub registry: Registry,
  pub gpu: HeadlessGpu,
  frame_time: Duration,
  frames: u64,
  /// Expiry of the newest printed message.
  reported: Option<Instant>,
}

impl Studio {
  pub fn new(config: StudioConfig, fps: u32) -> Self {
    Self {
      orchestrator: Orchestrator::new(config),
      session: Session::new(),
      registry: Registry::new(),
      gpu: HeadlessGpu::new(),
      frame_time: Duration::from_secs_f64(1.0 / f64::from(fps.max(1))),
      frames: 0,
      reported: None,
    }
  }

  pub fn frames(&self) -> u64 {
    self.frames
  }

  /// Runs one frame and sleeps for the rest of its time slice.
  fn frame(&mut self) {
    let start = Instant::now();
    let state = self.session.state.current();
    self
      .orchestrator
      .tick(&mut self.session, &mut self.registry, &mut self.gpu);
    self.frames += 1;

    if self.session.state.current() != state {
      log::debug!(
        "frame {}: {state:?} -> {:?}",
        self.frames,
        self.session.state.current()
      );
    }
    if self.session.state.on_state(AppState::SendResourcesToGpu) {
      log::debug!(
        "frame {}: {} uploads left",
        self.frames,
        self.orchestrator.uploads().len()
      );
    }
    self.report_messages();

    if let Some(rest) = self.frame_time.checked_sub(start.elapsed()) {
      std::thread::sleep(rest);
    }
  }

  /// Prints messages that appeared since the last call.
  fn report_messages(&mut self) {
    for message in self.orchestrator.messages().iter() {
      if self.reported.is_some_and(|seen| message.expires_at <= seen) {
        continue;
      }
      match message.kind {
        MessageKind::Info => println!("{}", message.text),
        MessageKind::Error => eprintln!("error: {}", message.text),
      }
      self.reported = Some(message.expires_at);
    }
  }

  /// Runs the splash screen and intro. `skip` ends each as soon as it starts.
  pub fn startup(&mut self, skip: bool, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while !self.session.state.on_state(AppState::MainState) {
      if skip {
        self.orchestrator.skip_startup(&mut self.session);
      }
      self.frame();
      if Instant::now() >= deadline {
        bail!("startup did not finish after {} frames", self.frames);
      }
    }
    Ok(())
  }

  /// Ticks until the orchestrator is idle. Fails after `timeout`.
  pub fn run_until_idle(&mut self, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
      self.frame();
      if self.orchestrator.is_idle(&self.session) {
        return Ok(());
      }
      if Instant::now() >= deadline {
        bail!(
          "still busy after {} frames ({:?})",
          self.frames,
          self.session.state.current()
        );
      }
    }
  }

  /// Fails if the orchestrator posted any error message.
  pub fn check_errors(&self) -> Result<()> {
    let errors: Vec<&str> = self
      .orchestrator
      .messages()
      .iter()
      .filter(|m| m.kind == MessageKind::Error)
      .map(|m| m.text.as_str())
      .collect();
    if errors.is_empty() {
      Ok(())
    } else {
      bail!(errors.join("; "))
    }
  }

  /// Builds the demo scene into the live lists and uploads it.
  pub fn build_demo(&mut self, scene: &DemoScene) -> Result<()> {
    scene.build(&mut self.registry, self.orchestrator.live_mut())?;
    let live = self.orchestrator.live();
    for &texture in &live.textures {
      self.registry.upload_texture(texture, &mut self.gpu);
    }
    for mesh in live.meshes() {
      self.registry.upload_mesh(mesh, &mut self.gpu);
    }
    for &environment in &live.environments {
      self.registry.upload_environment(environment, &mut self.gpu);
    }
    Ok(())
  }

  pub fn save(&mut self, path: PathBuf, level: CompressionLevel, timeout: Duration) -> Result<()> {
    if let Err(e) =
      self
        .orchestrator
        .request_save(&mut self.session, &mut self.registry, path, level)
    {
      bail!(e);
    }
    self.run_until_idle(timeout)?;
    self.check_errors()
  }

  pub fn load(&mut self, path: PathBuf, timeout: Duration) -> Result<()> {
    if let Err(e) = self.orchestrator.request_load(&mut self.session, path) {
      bail!(e);
    }
    self.run_until_idle(timeout)?;
    self.check_errors()
  }

  /// Releases the scene and destroys what is left on the GPU.
  pub fn shutdown(&mut self) {
    self.orchestrator.release_all(&mut self.registry);
    self.registry.flush_retired(&mut self.gpu);
    if !self.registry.is_empty() {
      log::warn!("resources still referenced at shutdown");
    }
  }
}
