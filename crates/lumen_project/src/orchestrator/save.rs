//! Save requests and their completion.

use std::path::{Path, PathBuf};

use super::{JobOutput, Orchestrator, PendingJob, ProgressObserver, RequestRejected};
use crate::codec::CompressionLevel;
use crate::error::PersistResult;
use crate::format::{ProjectSnapshot, save_project};
use crate::lists::ResourceLists;
use crate::registry::Registry;
use crate::session::Session;
use crate::task::TaskKind;

impl Orchestrator {
  /// Writes the live scene to `path` on the worker.
  ///
  /// Every live resource gets an extra reference for the duration of the
  /// save, so the scene may change (or be replaced) while the file is
  /// written.
  pub fn request_save(
    &mut self,
    session: &mut Session,
    registry: &mut Registry,
    path: impl Into<PathBuf>,
    level: CompressionLevel,
  ) -> Result<(), RequestRejected> {
    let path = path.into();
    if let Err(e) = self.check_ready(session) {
      self
        .messages
        .error(format!("cannot save {}: {e}", path.display()));
      return Err(e);
    }

    let snapshot = match ProjectSnapshot::capture(&self.live, registry, &self.settings) {
      Ok(snapshot) => snapshot,
      Err(e) => {
        self
          .messages
          .error(format!("cannot save {}: {e}", path.display()));
        return Err(e.into());
      }
    };
    let mut handles = self.live.acquire_copy(registry);

    let buffers = self.config.persistence.buffers;
    let job_path = path.clone();
    let started = session.tasks.start(TaskKind::Save, move |ctx| {
      let mut observer = ProgressObserver { ctx };
      save_project(&job_path, &snapshot, level, buffers, &mut observer).map(JobOutput::Saved)
    });

    if let Err(e) = started {
      handles.release_all(registry);
      self
        .messages
        .error(format!("cannot save {}: {e}", path.display()));
      return Err(e.into());
    }

    log::info!(
      "saving project {} at level {}",
      path.display(),
      level.get()
    );
    self.job = Some(PendingJob::Save { path, handles });
    Ok(())
  }

  /// [`Self::request_save`] at the configured compression level.
  pub fn request_save_default(
    &mut self,
    session: &mut Session,
    registry: &mut Registry,
    path: impl Into<PathBuf>,
  ) -> Result<(), RequestRejected> {
    let level = self.config.persistence.compression_level;
    self.request_save(session, registry, path, level)
  }

  /// Consumes the outcome of a save job and drops its references.
  pub(super) fn finish_save(
    &mut self,
    registry: &mut Registry,
    path: &Path,
    mut handles: ResourceLists,
    outcome: PersistResult<JobOutput>,
  ) {
    handles.release_all(registry);
    match outcome {
      Ok(JobOutput::Saved(stats)) => {
        self.messages.info(format!(
          "saved {} ({} bytes, ratio {:.2})",
          path.display(),
          stats.codec.total_compressed,
          stats.codec.ratio()
        ));
      }
      Ok(JobOutput::Loaded { scratch, .. }) => {
        self.scratch.get_or_insert(scratch);
        log::warn!("save task for {} returned a load result", path.display());
      }
      Err(e) => {
        self
          .messages
          .error(format!("failed to save {}: {e}", path.display()));
      }
    }
  }
}
