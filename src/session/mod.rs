//! Simulation session lifecycle.
//!
//! `machine` holds the pure state machine; `controller` drives it from the
//! channel and from UI commands and forwards effects to presentation layers.

mod controller;
mod machine;

pub use controller::{run_controller, UiCommand};
pub use machine::{Effect, Session, SessionInput, SessionState};
