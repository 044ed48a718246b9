//! Frame-synchronous event flags with delayed triggers.

use std::time::Duration;

use bitflags::bitflags;
use thiserror::Error;
// WASM compat: std::time::Instant panics on wasm32
use web_time::Instant;

bitflags! {
  /// Application events.
  #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
  pub struct Events: u8 {
    /// A project file passed validation and is being decoded.
    const PROJECT_IS_LOADING = 1 << 0;
    /// The decoded project was imported into the private lists.
    const PROJECT_LOADED = 1 << 1;
    /// All uploads are done; swap the private lists in.
    const BEGIN_LOAD_TRANSITION = 1 << 2;
    const LOAD_TRANSITION_COMPLETE = 1 << 3;
    const SPLASH_FINISHED = 1 << 4;
    const INTRO_FINISHED = 1 << 5;
  }
}

/// Capacity of each pending-trigger table.
pub const PENDING_CAPACITY: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
  #[error("pending trigger table is full ({PENDING_CAPACITY} entries), cannot schedule {0:?}")]
  TableFull(Events),
}

#[derive(Clone, Copy, Debug)]
struct FrameTrigger {
  events: Events,
  frames_left: u32,
}

#[derive(Clone, Copy, Debug)]
struct TimeTrigger {
  events: Events,
  deadline: Instant,
}

/// Triggered events plus the pending delayed triggers.
///
/// A triggered event stays set until it is handled.
#[derive(Debug, Default)]
pub struct EventQueue {
  active: Events,
  frame_pending: [Option<FrameTrigger>; PENDING_CAPACITY],
  time_pending: [Option<TimeTrigger>; PENDING_CAPACITY],
}

fn insert<T>(table: &mut [Option<T>], entry: T, events: Events) -> Result<(), ScheduleError> {
  match table.iter_mut().find(|slot| slot.is_none()) {
    Some(slot) => {
      *slot = Some(entry);
      Ok(())
    }
    None => Err(ScheduleError::TableFull(events)),
  }
}

impl EventQueue {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets `events` immediately.
  pub fn trigger(&mut self, events: Events) {
    self.active |= events;
  }

  /// Sets `events` on the `frames`-th call to [`Self::frame`] from now.
  /// Zero frames triggers immediately.
  pub fn trigger_after_frames(&mut self, frames: u32, events: Events) -> Result<(), ScheduleError> {
    if frames == 0 {
      self.trigger(events);
      return Ok(());
    }
    insert(
      &mut self.frame_pending,
      FrameTrigger {
        events,
        frames_left: frames,
      },
      events,
    )
  }

  /// Sets `events` on the first frame at or after `delay` from now. A zero
  /// delay triggers immediately.
  pub fn trigger_after(&mut self, delay: Duration, events: Events) -> Result<(), ScheduleError> {
    self.trigger_after_at(Instant::now(), delay, events)
  }

  /// [`Self::trigger_after`] with an explicit clock reading.
  pub fn trigger_after_at(
    &mut self,
    now: Instant,
    delay: Duration,
    events: Events,
  ) -> Result<(), ScheduleError> {
    if delay.is_zero() {
      self.trigger(events);
      return Ok(());
    }
    insert(
      &mut self.time_pending,
      TimeTrigger {
        events,
        deadline: now + delay,
      },
      events,
    )
  }

  /// True while any of `events` is set.
  pub fn check(&self, events: Events) -> bool {
    self.active.intersects(events)
  }

  /// Clears `events`, returning whether any of them was set.
  pub fn handle(&mut self, events: Events) -> bool {
    let was_set = self.check(events);
    self.active.remove(events);
    was_set
  }

  /// Number of delayed triggers not yet promoted.
  pub fn pending(&self) -> usize {
    self.frame_pending.iter().flatten().count() + self.time_pending.iter().flatten().count()
  }

  /// Advances frame counters and promotes due triggers. Call once per frame,
  /// before any handler runs.
  pub fn frame(&mut self) {
    self.frame_at(Instant::now());
  }

  /// [`Self::frame`] with an explicit clock reading.
  pub fn frame_at(&mut self, now: Instant) {
    for slot in &mut self.frame_pending {
      if let Some(trigger) = slot {
        trigger.frames_left -= 1;
        if trigger.frames_left == 0 {
          self.active |= trigger.events;
          *slot = None;
        }
      }
    }
    for slot in &mut self.time_pending {
      if let Some(trigger) = slot
        && trigger.deadline <= now
      {
        self.active |= trigger.events;
        *slot = None;
      }
    }
  }
}
