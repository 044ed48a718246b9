//! Per-application coordination state.

use crate::coordinator::{EventQueue, StateRegister};
use crate::orchestrator::JobOutput;
use crate::task::TaskRunner;

/// Owns the event queue, the state register and the task slot.
///
/// One `Session` is created at startup and passed to whatever needs to
/// trigger events, change state or run background work.
#[derive(Default)]
pub struct Session {
  pub events: EventQueue,
  pub state: StateRegister,
  pub tasks: TaskRunner<JobOutput>,
}

impl Session {
  pub fn new() -> Self {
    Self::default()
  }

  /// Promotes due delayed triggers. Call at the start of every tick.
  pub fn begin_frame(&mut self) {
    self.events.frame();
  }

  /// [`Self::begin_frame`] with an explicit clock reading.
  pub fn begin_frame_at(&mut self, now: web_time::Instant) {
    self.events.frame_at(now);
  }

  /// Captures the state snapshot. Call after all transition logic ran.
  pub fn end_frame(&mut self) {
    self.state.frame();
  }
}
