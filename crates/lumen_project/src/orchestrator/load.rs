//! Load requests and their completion.

use std::path::{Path, PathBuf};

use super::{JobOutput, Orchestrator, PendingJob, ProgressObserver, RequestRejected};
use crate::coordinator::Events;
use crate::error::{PersistError, PersistResult};
use crate::format::{import_project, load_project};
use crate::registry::Registry;
use crate::scratch::ScratchBuffer;
use crate::session::Session;
use crate::task::TaskKind;

impl Orchestrator {
  /// Starts decoding `path` on the worker.
  ///
  /// Rejected (with a status message) while a job runs, during a transition,
  /// or before the startup sequence finished. The live scene keeps
  /// rendering; nothing is replaced until the upload phase is over.
  pub fn request_load(
    &mut self,
    session: &mut Session,
    path: impl Into<PathBuf>,
  ) -> Result<(), RequestRejected> {
    let path = path.into();
    if let Err(e) = self.check_ready(session) {
      self
        .messages
        .error(format!("cannot load {}: {e}", path.display()));
      return Err(e);
    }

    let limit = self.config.persistence.scratch_limit;
    let mut scratch = self
      .scratch
      .take()
      .unwrap_or_else(|| ScratchBuffer::new(limit));
    let reader = self.reader;
    let job_path = path.clone();

    let started = session.tasks.start(TaskKind::Load, move |ctx| {
      let mut observer = ProgressObserver { ctx };
      let project = load_project(&job_path, &mut scratch, &reader, &mut observer);
      Ok(JobOutput::Loaded { scratch, project })
    });

    if let Err(e) = started {
      // The job (and the scratch buffer with it) was dropped.
      self.scratch = Some(ScratchBuffer::new(limit));
      self
        .messages
        .error(format!("cannot load {}: {e}", path.display()));
      return Err(e.into());
    }

    log::info!("loading project {}", path.display());
    self.job = Some(PendingJob::Load { path });
    Ok(())
  }

  /// Drops the host copies of every live resource that is on the GPU.
  pub(super) fn free_live_host_copies(&mut self, registry: &mut Registry) {
    if !self.config.persistence.free_host_copies {
      return;
    }
    let mut freed = 0usize;
    for &texture in &self.live.textures {
      freed += usize::from(registry.textures.free_host_copy(texture));
    }
    for mesh in self.live.meshes() {
      freed += usize::from(registry.meshes.free_host_copy(mesh));
    }
    for &environment in &self.live.environments {
      freed += usize::from(registry.environments.free_host_copy(environment));
    }
    log::debug!("freed {freed} host copies ahead of the incoming project");
  }

  /// Consumes the outcome of a load job.
  pub(super) fn finish_load(
    &mut self,
    session: &mut Session,
    registry: &mut Registry,
    path: &Path,
    outcome: PersistResult<JobOutput>,
  ) {
    let project = match outcome {
      Ok(JobOutput::Loaded { scratch, project }) => {
        self.scratch = Some(scratch);
        project
      }
      Ok(JobOutput::Saved(_)) => Err(PersistError::TaskPanicked(
        "load task returned a save result".to_owned(),
      )),
      Err(e) => Err(e),
    };
    if self.scratch.is_none() {
      log::warn!("scratch buffer was lost with the load task, allocating a new one");
      self.scratch = Some(ScratchBuffer::new(self.config.persistence.scratch_limit));
    }

    let imported = project.and_then(|project| {
      log::debug!(
        "decoded {} ({} -> {} bytes)",
        path.display(),
        project.codec.total_compressed,
        project.codec.total
      );
      import_project(project, registry, &mut self.incoming)
    });

    match imported {
      Ok(report) => {
        self.pending_settings = report.settings.clone();
        self.last_import = Some(report);
        session.events.trigger(Events::PROJECT_LOADED);
      }
      Err(e) => self.fail_load(registry, path, &e),
    }
  }

  /// Abandons a load. The live scene is left as it was.
  fn fail_load(&mut self, registry: &mut Registry, path: &Path, error: &PersistError) {
    self.incoming.release_all(registry);
    self.pending_settings = None;
    if let Some(scratch) = self.scratch.as_mut() {
      scratch.reset();
    }
    self
      .messages
      .error(format!("failed to load {}: {error}", path.display()));
  }
}
