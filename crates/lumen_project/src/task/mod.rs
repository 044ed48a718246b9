//! Background task runner.
//!
//! Runs one job at a time on a dedicated OS thread. The main thread never
//! blocks on it: it polls once per frame, receives the job's outcome exactly
//! once through a single-slot channel, and only joins the thread after that
//! outcome was consumed.
//!
//! Status moves `Idle → Started` when a job is started, `Started →
//! Completed` once the worker has sent its outcome, `Completed → Halted`
//! when [`TaskRunner::poll`] delivered it, and `Halted → Idle` on
//! [`TaskRunner::shutdown`].

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};

use async_channel::{Receiver, Sender, TryRecvError};
use thiserror::Error;

use crate::error::{PersistError, PersistResult};

/// Kinds of background work sharing the single task slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
  Save,
  Load,
  /// Environment map filtering.
  Filter,
  /// Mesh import conversion.
  MeshConvert,
}

impl TaskKind {
  fn thread_name(self) -> &'static str {
    match self {
      Self::Save => "lumen-save",
      Self::Load => "lumen-load",
      Self::Filter => "lumen-filter",
      Self::MeshConvert => "lumen-mesh-convert",
    }
  }
}

impl fmt::Display for TaskKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Save => "save",
      Self::Load => "load",
      Self::Filter => "filter",
      Self::MeshConvert => "mesh conversion",
    };
    f.write_str(name)
  }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
  Idle = 0,
  Started = 1,
  Completed = 2,
  Halted = 3,
}

impl TaskStatus {
  fn from_u8(value: u8) -> Self {
    match value {
      1 => Self::Started,
      2 => Self::Completed,
      3 => Self::Halted,
      _ => Self::Idle,
    }
  }
}

/// Coarse progress reported by a running job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskProgress {
  FileOpened,
  FileValidated,
}

/// Result of a [`TaskRunner::poll`].
#[derive(Debug)]
pub enum TaskPoll<T> {
  /// No job, or its outcome was already delivered.
  Idle,
  Running,
  Finished(PersistResult<T>),
}

#[derive(Debug, Error)]
pub enum TaskError {
  #[error("a {0} task is already running")]
  Busy(TaskKind),
  #[error("failed to spawn worker thread: {0}")]
  Spawn(#[from] std::io::Error),
}

/// Handed to the job for progress reporting.
pub struct TaskContext {
  progress: Sender<TaskProgress>,
}

impl TaskContext {
  pub fn report(&self, progress: TaskProgress) {
    // The receiver only goes away with the runner; nothing to do then.
    let _ = self.progress.try_send(progress);
  }
}

/// Single-slot runner for background jobs returning `T`.
pub struct TaskRunner<T> {
  status: Arc<AtomicU8>,
  kind: Option<TaskKind>,
  outcome_rx: Option<Receiver<PersistResult<T>>>,
  progress_rx: Option<Receiver<TaskProgress>>,
  handle: Option<JoinHandle<()>>,
}

impl<T> Default for TaskRunner<T> {
  fn default() -> Self {
    Self {
      status: Arc::new(AtomicU8::new(TaskStatus::Idle as u8)),
      kind: None,
      outcome_rx: None,
      progress_rx: None,
      handle: None,
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_owned()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic payload".to_owned()
  }
}

impl<T: Send + 'static> TaskRunner<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn status(&self) -> TaskStatus {
    TaskStatus::from_u8(self.status.load(Ordering::Acquire))
  }

  /// Kind of the job currently occupying the slot.
  pub fn kind(&self) -> Option<TaskKind> {
    self.kind
  }

  /// True from [`Self::start`] until the worker returned.
  pub fn is_running(&self) -> bool {
    self.status() == TaskStatus::Started
  }

  /// True while a job is running or its outcome has not been polled yet.
  pub fn is_busy(&self) -> bool {
    matches!(self.status(), TaskStatus::Started | TaskStatus::Completed)
  }

  /// Starts `job` on a new worker thread.
  ///
  /// Fails with [`TaskError::Busy`] while another job is running or its
  /// outcome is unconsumed. A halted previous job is joined first.
  pub fn start<F>(&mut self, kind: TaskKind, job: F) -> Result<(), TaskError>
  where
    F: FnOnce(&TaskContext) -> PersistResult<T> + Send + 'static,
  {
    if self.is_busy() {
      return Err(TaskError::Busy(self.kind.unwrap_or(kind)));
    }
    self.shutdown();

    let (outcome_tx, outcome_rx) = async_channel::bounded(1);
    let (progress_tx, progress_rx) = async_channel::unbounded();
    let status = Arc::clone(&self.status);
    status.store(TaskStatus::Started as u8, Ordering::Release);

    let spawned = thread::Builder::new()
      .name(kind.thread_name().to_owned())
      .spawn(move || {
        let ctx = TaskContext {
          progress: progress_tx,
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&ctx))).unwrap_or_else(|p| {
          let message = panic_message(p.as_ref());
          log::error!("{kind} task panicked: {message}");
          Err(PersistError::TaskPanicked(message))
        });
        // Outcome first, then status: a poll observing Completed always
        // finds the outcome.
        let _ = outcome_tx.send_blocking(outcome);
        status.store(TaskStatus::Completed as u8, Ordering::Release);
      });

    match spawned {
      Ok(handle) => {
        log::debug!("started {kind} task");
        self.kind = Some(kind);
        self.outcome_rx = Some(outcome_rx);
        self.progress_rx = Some(progress_rx);
        self.handle = Some(handle);
        Ok(())
      }
      Err(e) => {
        self.status.store(TaskStatus::Idle as u8, Ordering::Release);
        Err(TaskError::Spawn(e))
      }
    }
  }

  /// Next progress message of the current job, if any.
  pub fn try_recv_progress(&self) -> Option<TaskProgress> {
    self.progress_rx.as_ref()?.try_recv().ok()
  }

  /// Delivers the outcome of a completed job exactly once.
  pub fn poll(&mut self) -> TaskPoll<T> {
    match self.status() {
      TaskStatus::Idle | TaskStatus::Halted => TaskPoll::Idle,
      TaskStatus::Started => TaskPoll::Running,
      TaskStatus::Completed => {
        let Some(rx) = self.outcome_rx.as_ref() else {
          return TaskPoll::Idle;
        };
        match rx.try_recv() {
          Ok(outcome) => {
            self
              .status
              .store(TaskStatus::Halted as u8, Ordering::Release);
            TaskPoll::Finished(outcome)
          }
          Err(TryRecvError::Empty) => TaskPoll::Running,
          Err(TryRecvError::Closed) => {
            self
              .status
              .store(TaskStatus::Halted as u8, Ordering::Release);
            TaskPoll::Finished(Err(PersistError::TaskPanicked(
              "worker exited without an outcome".to_owned(),
            )))
          }
        }
      }
    }
  }

  /// Joins a finished worker and returns the runner to `Idle`.
  ///
  /// Does nothing (and returns false) while the job is running or its
  /// outcome is still unconsumed; never blocks on a running job.
  pub fn shutdown(&mut self) -> bool {
    match self.status() {
      TaskStatus::Started | TaskStatus::Completed => false,
      TaskStatus::Idle | TaskStatus::Halted => {
        if let Some(handle) = self.handle.take()
          && handle.join().is_err()
        {
          log::warn!("worker thread panicked outside its job");
        }
        self.kind = None;
        self.outcome_rx = None;
        self.progress_rx = None;
        self
          .status
          .store(TaskStatus::Idle as u8, Ordering::Release);
        true
      }
    }
  }
}
