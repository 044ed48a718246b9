//! Splash screen and intro animation ahead of the main state.

use std::time::Duration;

use super::Orchestrator;
use crate::coordinator::{AppState, Events};
use crate::session::Session;

fn schedule_frames(session: &mut Session, frames: u32, events: Events) {
  if let Err(e) = session.events.trigger_after_frames(frames, events) {
    log::warn!("{e}, triggering now");
    session.events.trigger(events);
  }
}

fn schedule_after(session: &mut Session, delay: Duration, events: Events) {
  if let Err(e) = session.events.trigger_after(delay, events) {
    log::warn!("{e}, triggering now");
    session.events.trigger(events);
  }
}

impl Orchestrator {
  /// `None → SplashScreen → IntroAnimation → MainState`.
  pub(super) fn update_startup(&mut self, session: &mut Session) {
    if session.state.on_state(AppState::None) {
      session.state.enter(AppState::SplashScreen);
      schedule_frames(session, self.config.startup.splash_frames, Events::SPLASH_FINISHED);
    }
    if session.events.handle(Events::SPLASH_FINISHED) {
      session.state.enter(AppState::IntroAnimation);
      schedule_after(session, self.config.intro_duration(), Events::INTRO_FINISHED);
    }
    if session.events.handle(Events::INTRO_FINISHED) {
      session.state.enter(AppState::MainState);
      log::info!("ready");
    }
  }

  /// Ends the splash screen or the intro on the next frame.
  pub fn skip_startup(&mut self, session: &mut Session) {
    match session.state.current() {
      AppState::SplashScreen => session.events.trigger(Events::SPLASH_FINISHED),
      AppState::IntroAnimation => session.events.trigger(Events::INTRO_FINISHED),
      _ => {}
    }
  }
}
