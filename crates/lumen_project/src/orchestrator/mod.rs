//! Main-loop side of project persistence.
//!
//! The [`Orchestrator`] owns the live scene (resource lists plus settings),
//! the private lists a load is imported into, and the scratch buffer that is
//! lent to the worker. It is driven once per frame through
//! [`Orchestrator::update`] and sequences a load like this:
//!
//! 1. [`Orchestrator::request_load`] starts the decode on the worker.
//! 2. Header validated: `PROJECT_IS_LOADING`, host copies of live GPU
//!    resources are freed.
//! 3. Decode finished: the project is imported into the private lists and
//!    `PROJECT_LOADED` fires. The displayed environment and mesh instance are
//!    held, everything else live is released, and the state becomes
//!    `SendResourcesToGpu`.
//! 4. One resource is uploaded per frame. When nothing is left,
//!    `BEGIN_LOAD_TRANSITION` swaps the private lists in and the state becomes
//!    `ProjectLoadTransition` until `LOAD_TRANSITION_COMPLETE`.
//!
//! Any failure leaves the live scene as it was and posts an error message.
//!
//! - [`load`]: load requests and their completion
//! - [`save`]: save requests and their completion
//! - [`transition`]: upload queue and the swap
//! - [`startup`]: splash and intro sequence

mod load;
mod save;
mod startup;
mod transition;

use std::path::{Path, PathBuf};

use thiserror::Error;
// WASM compat: std::time::Instant panics on wasm32
use web_time::Instant;

use crate::codec::StreamReader;
use crate::config::StudioConfig;
use crate::coordinator::{AppState, Events};
use crate::error::{PersistError, PersistResult};
use crate::format::{DecodedProject, EncodeStats, ImportReport, PersistObserver};
use crate::gpu::GpuBackend;
use crate::lists::ResourceLists;
use crate::model::{MeshInstance, Settings};
use crate::registry::{EnvironmentHandle, Registry};
use crate::scratch::ScratchBuffer;
use crate::session::Session;
use crate::status::StatusMessages;
use crate::task::{TaskContext, TaskError, TaskKind, TaskPoll, TaskProgress};

pub use transition::UploadQueue;

/// Value a persistence job hands back to the main thread.
#[derive(Debug)]
pub enum JobOutput {
  /// The scratch buffer always comes back, whether the decode worked or not.
  Loaded {
    scratch: ScratchBuffer,
    project: PersistResult<DecodedProject>,
  },
  Saved(EncodeStats),
}

/// Why a load or save request was not started.
#[derive(Debug, Error)]
pub enum RequestRejected {
  #[error("a {0} task is still running")]
  Busy(TaskKind),
  #[error("a project transition is in progress")]
  TransitionInProgress,
  #[error("not ready ({0:?})")]
  NotReady(AppState),
  #[error(transparent)]
  Task(#[from] TaskError),
  #[error("cannot capture the scene: {0}")]
  Snapshot(#[from] PersistError),
}

/// Reports file progress from inside a job.
struct ProgressObserver<'a> {
  ctx: &'a TaskContext,
}

impl PersistObserver for ProgressObserver<'_> {
  fn on_file_opened(&mut self, _path: &Path) {
    self.ctx.report(TaskProgress::FileOpened);
  }

  fn on_opened(&mut self, _path: &Path) {
    self.ctx.report(TaskProgress::FileValidated);
  }
}

/// Job in flight, as seen from the main thread.
#[derive(Debug)]
enum PendingJob {
  Load { path: PathBuf },
  /// `handles` keeps the saved resources alive until the save completed.
  Save { path: PathBuf, handles: ResourceLists },
}

/// References kept alive while the live lists are being replaced.
#[derive(Debug, Default)]
struct Held {
  environment: Option<EnvironmentHandle>,
  instance: Option<MeshInstance>,
}

pub struct Orchestrator {
  config: StudioConfig,
  live: ResourceLists,
  incoming: ResourceLists,
  settings: Settings,
  /// Loaded settings waiting for the swap.
  pending_settings: Option<Settings>,
  /// `None` while lent to a load job.
  scratch: Option<ScratchBuffer>,
  reader: StreamReader,
  job: Option<PendingJob>,
  held: Held,
  uploads: UploadQueue,
  transition_started: Option<Instant>,
  last_import: Option<ImportReport>,
  messages: StatusMessages,
}

impl Orchestrator {
  pub fn new(config: StudioConfig) -> Self {
    Self {
      scratch: Some(ScratchBuffer::new(config.persistence.scratch_limit)),
      reader: StreamReader::new(config.persistence.buffers),
      messages: StatusMessages::new(config.message_lifetime()),
      config,
      live: ResourceLists::new(),
      incoming: ResourceLists::new(),
      settings: Settings::default(),
      pending_settings: None,
      job: None,
      held: Held::default(),
      uploads: UploadQueue::default(),
      transition_started: None,
      last_import: None,
    }
  }

  pub fn config(&self) -> &StudioConfig {
    &self.config
  }

  /// Resources currently displayed.
  pub fn live(&self) -> &ResourceLists {
    &self.live
  }

  /// Mutable live lists, for building a scene by hand.
  pub fn live_mut(&mut self) -> &mut ResourceLists {
    &mut self.live
  }

  pub fn settings(&self) -> &Settings {
    &self.settings
  }

  pub fn settings_mut(&mut self) -> &mut Settings {
    &mut self.settings
  }

  pub fn messages(&self) -> &StatusMessages {
    &self.messages
  }

  pub fn messages_mut(&mut self) -> &mut StatusMessages {
    &mut self.messages
  }

  /// Uploads still queued for the running transition.
  pub fn uploads(&self) -> &UploadQueue {
    &self.uploads
  }

  /// What the last successful import repaired.
  pub fn last_import(&self) -> Option<&ImportReport> {
    self.last_import.as_ref()
  }

  /// Environment kept on screen while the incoming project uploads.
  pub fn held_environment(&self) -> Option<EnvironmentHandle> {
    self.held.environment
  }

  /// Mesh instance kept on screen while the incoming project uploads.
  pub fn held_instance(&self) -> Option<&MeshInstance> {
    self.held.instance.as_ref()
  }

  /// Peak size of the scratch buffer, `None` while a load holds it.
  pub fn scratch_high_water(&self) -> Option<usize> {
    self.scratch.as_ref().map(ScratchBuffer::high_water)
  }

  /// True while a load is anywhere between its request and the end of the
  /// transition.
  pub fn is_loading(&self, session: &Session) -> bool {
    matches!(self.job, Some(PendingJob::Load { .. }))
      || matches!(
        session.state.current(),
        AppState::SendResourcesToGpu | AppState::ProjectLoadTransition
      )
  }

  /// True when no job is in flight and the scene is in its steady state.
  pub fn is_idle(&self, session: &Session) -> bool {
    self.job.is_none() && !session.tasks.is_busy() && session.state.on_state(AppState::MainState)
  }

  /// Fade progress in `[0, 1]` during `ProjectLoadTransition`.
  pub fn transition_progress(&self, session: &Session) -> Option<f32> {
    if !session.state.on_state(AppState::ProjectLoadTransition) {
      return None;
    }
    let started = self.transition_started?;
    let total = self.config.transition_duration().as_secs_f32();
    if total <= 0.0 {
      return Some(1.0);
    }
    Some((started.elapsed().as_secs_f32() / total).min(1.0))
  }

  /// Checks that a new job may start now.
  fn check_ready(&self, session: &Session) -> Result<(), RequestRejected> {
    match session.state.current() {
      AppState::MainState => {}
      AppState::SendResourcesToGpu | AppState::ProjectLoadTransition => {
        return Err(RequestRejected::TransitionInProgress);
      }
      other => return Err(RequestRejected::NotReady(other)),
    }
    if session.tasks.is_busy() || self.job.is_some() {
      let kind = session.tasks.kind().unwrap_or(TaskKind::Load);
      return Err(RequestRejected::Busy(kind));
    }
    Ok(())
  }

  /// Runs one frame of coordination. Call between
  /// [`Session::begin_frame`] and [`Session::end_frame`].
  #[cfg_attr(feature = "tracy", tracing::instrument(skip_all))]
  pub fn update(&mut self, session: &mut Session, registry: &mut Registry, gpu: &mut dyn GpuBackend) {
    self.update_startup(session);
    self.poll_job(session, registry);

    if session.events.handle(Events::PROJECT_IS_LOADING) {
      self.free_live_host_copies(registry);
    }
    if session.events.handle(Events::PROJECT_LOADED) {
      self.begin_uploads(session, registry);
    }
    if session.state.on_state(AppState::SendResourcesToGpu) {
      self.upload_step(session, registry, gpu);
    }
    if session.events.handle(Events::BEGIN_LOAD_TRANSITION) {
      self.swap_in(session, registry);
    }
    if session.events.handle(Events::LOAD_TRANSITION_COMPLETE) {
      self.transition_started = None;
      session.state.enter(AppState::MainState);
    }

    self.messages.expire(Instant::now());
  }

  /// One complete frame: event promotion, [`Self::update`], deferred GPU
  /// destruction and the state snapshot.
  pub fn tick(&mut self, session: &mut Session, registry: &mut Registry, gpu: &mut dyn GpuBackend) {
    session.begin_frame();
    self.update(session, registry, gpu);
    registry.flush_retired(gpu);
    session.end_frame();
  }

  /// Drains job progress and consumes a finished job's outcome.
  fn poll_job(&mut self, session: &mut Session, registry: &mut Registry) {
    while let Some(progress) = session.tasks.try_recv_progress() {
      log::debug!("{:?} task progress: {progress:?}", session.tasks.kind());
      if progress == TaskProgress::FileValidated && matches!(self.job, Some(PendingJob::Load { .. }))
      {
        session.events.trigger(Events::PROJECT_IS_LOADING);
      }
    }

    let TaskPoll::Finished(outcome) = session.tasks.poll() else {
      return;
    };
    session.tasks.shutdown();

    match self.job.take() {
      Some(PendingJob::Load { path }) => self.finish_load(session, registry, &path, outcome),
      Some(PendingJob::Save { path, handles }) => {
        self.finish_save(registry, &path, handles, outcome)
      }
      None => log::warn!("task finished without a pending job"),
    }
  }

  /// Releases every reference the orchestrator owns. Call at exit, once
  /// [`Self::is_idle`] holds.
  pub fn release_all(&mut self, registry: &mut Registry) {
    self.release_held(registry);
    self.live.release_all(registry);
    self.incoming.release_all(registry);
    if let Some(PendingJob::Save { mut handles, .. }) = self.job.take() {
      handles.release_all(registry);
    }
    self.uploads.clear();
  }
}
