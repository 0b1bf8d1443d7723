//! Client controller for a remote Monte-Carlo tennis match simulator.
//!
//! The core (`form`, `progress`, `results`, `session`) is pure and
//! presentation-agnostic; `channel`, `roster`, `cli` and `tui` are adapters.

pub mod channel;
pub mod cli;
pub mod config;
pub mod error;
pub mod form;
pub mod logging;
pub mod model;
pub mod progress;
pub mod results;
pub mod roster;
pub mod session;
pub mod text_summary;
#[cfg(feature = "tui")]
pub mod tui;
