//! Application state with one-frame-delayed edge detection.

/// Top-level application states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AppState {
  #[default]
  None,
  SplashScreen,
  IntroAnimation,
  MainState,
  /// Uploading the incoming project, one resource per frame.
  SendResourcesToGpu,
  /// The incoming project is live and fading in.
  ProjectLoadTransition,
}

/// Current and previous state plus the snapshot edges are derived from.
///
/// `enter` changes the state immediately. Edges (`on_state_enter`,
/// `on_state_leave`) compare the states captured by the last two
/// [`StateRegister::frame`] calls, so an edge is visible for exactly one
/// frame after the frame in which it happened.
#[derive(Clone, Copy, Debug, Default)]
pub struct StateRegister {
  current: AppState,
  previous: AppState,
  snapshot_current: AppState,
  snapshot_previous: AppState,
}

impl StateRegister {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn enter(&mut self, state: AppState) {
    if state != self.current {
      log::debug!("state {:?} -> {state:?}", self.current);
    }
    self.previous = self.current;
    self.current = state;
  }

  pub fn current(&self) -> AppState {
    self.current
  }

  pub fn previous(&self) -> AppState {
    self.previous
  }

  pub fn on_state(&self, state: AppState) -> bool {
    self.current == state
  }

  /// True during the frame after `state` was entered.
  pub fn on_state_enter(&self, state: AppState) -> bool {
    self.snapshot_current == state && self.snapshot_previous != state
  }

  /// True during the frame after `state` was left.
  pub fn on_state_leave(&self, state: AppState) -> bool {
    self.snapshot_previous == state && self.snapshot_current != state
  }

  /// Captures the snapshot. Call once per frame, after all state changes.
  pub fn frame(&mut self) {
    self.snapshot_previous = self.snapshot_current;
    self.snapshot_current = self.current;
  }
}
