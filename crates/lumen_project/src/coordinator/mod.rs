//! Event and state coordination between the frame loop and background work.
//!
//! - [`events`]: event flags, immediate and delayed triggers
//! - [`state`]: application state with frame-delayed edges

pub mod events;
pub mod state;

pub use events::{EventQueue, Events, PENDING_CAPACITY, ScheduleError};
pub use state::{AppState, StateRegister};
