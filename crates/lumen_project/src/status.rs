//! User-visible status messages.

use std::collections::VecDeque;
use std::time::Duration;

// WASM compat: std::time::Instant panics on wasm32
use web_time::Instant;

/// Maximum number of messages kept; the oldest is dropped beyond this.
pub const MAX_MESSAGES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
  Info,
  Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StatusMessage {
  pub kind: MessageKind,
  pub text: String,
  pub expires_at: Instant,
}

/// Bounded queue of dismissable messages, oldest first.
#[derive(Debug)]
pub struct StatusMessages {
  messages: VecDeque<StatusMessage>,
  lifetime: Duration,
}

impl Default for StatusMessages {
  fn default() -> Self {
    Self::new(Duration::from_secs(5))
  }
}

impl StatusMessages {
  pub fn new(lifetime: Duration) -> Self {
    Self {
      messages: VecDeque::with_capacity(MAX_MESSAGES),
      lifetime,
    }
  }

  fn push(&mut self, kind: MessageKind, text: String) {
    if self.messages.len() == MAX_MESSAGES {
      self.messages.pop_front();
    }
    self.messages.push_back(StatusMessage {
      kind,
      text,
      expires_at: Instant::now() + self.lifetime,
    });
  }

  pub fn info(&mut self, text: impl Into<String>) {
    let text = text.into();
    log::info!("{text}");
    self.push(MessageKind::Info, text);
  }

  pub fn error(&mut self, text: impl Into<String>) {
    let text = text.into();
    log::error!("{text}");
    self.push(MessageKind::Error, text);
  }

  /// Removes the message at `index`.
  pub fn dismiss(&mut self, index: usize) -> Option<StatusMessage> {
    self.messages.remove(index)
  }

  /// Drops every message that expired by `now`.
  pub fn expire(&mut self, now: Instant) {
    self.messages.retain(|m| m.expires_at > now);
  }

  pub fn iter(&self) -> impl Iterator<Item = &StatusMessage> {
    self.messages.iter()
  }

  pub fn last(&self) -> Option<&StatusMessage> {
    self.messages.back()
  }

  pub fn has_errors(&self) -> bool {
    self.messages.iter().any(|m| m.kind == MessageKind::Error)
  }

  pub fn len(&self) -> usize {
    self.messages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.messages.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bounded_and_dismissable() {
    let mut messages = StatusMessages::default();
    for i in 0..MAX_MESSAGES + 3 {
      messages.info(format!("message {i}"));
    }
    assert_eq!(messages.len(), MAX_MESSAGES);
    assert_eq!(messages.iter().next().unwrap().text, "message 3");

    messages.error("broken");
    assert!(messages.has_errors());
    let last = messages.len() - 1;
    assert_eq!(messages.dismiss(last).unwrap().kind, MessageKind::Error);
    assert!(!messages.has_errors());
  }

  #[test]
  fn messages_expire() {
    let mut messages = StatusMessages::new(Duration::from_millis(100));
    messages.info("saved");
    messages.expire(Instant::now());
    assert_eq!(messages.len(), 1);
    messages.expire(Instant::now() + Duration::from_millis(200));
    assert!(messages.is_empty());
  }
}
